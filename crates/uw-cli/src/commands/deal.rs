use serde_json::json;
use uw_core::enums::{DealStatus, Program};
use uw_db::updates::deal::DealUpdateBuilder;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::DealCommands;
use crate::commands::shared::limit::effective_limit;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

/// Handle `uw deal`.
pub async fn handle(action: &DealCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let pipeline = &ctx.pipeline;
    let caller = &ctx.caller;
    match action {
        DealCommands::Create {
            name,
            program,
            jurisdiction,
        } => {
            let program = parse_enum::<Program>(program, "program")?;
            let deal = pipeline
                .create_deal(caller, name, program, jurisdiction)
                .await?;
            output(&deal, flags.format)
        }
        DealCommands::Get { id } => output(&pipeline.get_deal(caller, id).await?, flags.format),
        DealCommands::List { status, limit } => {
            let status = status
                .as_deref()
                .map(|s| parse_enum::<DealStatus>(s, "status"))
                .transpose()?;
            let limit = effective_limit(*limit, flags.limit, 50);
            output(&pipeline.list_deals(caller, status, limit).await?, flags.format)
        }
        DealCommands::Edit {
            id,
            name,
            program,
            jurisdiction,
        } => {
            let mut builder = DealUpdateBuilder::new();
            if let Some(name) = name {
                builder = builder.name(name);
            }
            if let Some(program) = program {
                builder = builder.program(parse_enum(program, "program")?);
            }
            if let Some(jurisdiction) = jurisdiction {
                builder = builder.jurisdiction(jurisdiction);
            }
            let deal = pipeline.edit_deal(caller, id, &builder.build()).await?;
            output(&deal, flags.format)
        }
        DealCommands::Delete { id } => {
            pipeline.delete_deal(caller, id).await?;
            output(&json!({ "id": id, "deleted": true }), flags.format)
        }
    }
}
