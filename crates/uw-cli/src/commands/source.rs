use anyhow::Context;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::SourceCommands;
use crate::commands::shared::parse::content_type_for;
use crate::context::AppContext;
use crate::output::output;

/// Handle `uw source`.
pub async fn handle(action: &SourceCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        SourceCommands::Add {
            deal_id,
            file,
            content_type,
        } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{} has no usable file name", file.display()))?;
            let content_type = content_type
                .as_deref()
                .unwrap_or_else(|| content_type_for(file));
            let doc = ctx
                .pipeline
                .add_source(&ctx.caller, deal_id, filename, content_type, bytes)
                .await?;
            output(&doc, flags.format)
        }
        SourceCommands::List { deal_id } => {
            let docs = ctx.pipeline.list_sources(&ctx.caller, deal_id).await?;
            output(&docs, flags.format)
        }
    }
}
