use std::path::PathBuf;

use anyhow::Context;
use uw_core::enums::DocumentStatus;
use uw_core::responses::DownloadResponse;
use uw_pipeline::{Download, DownloadBody};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{DealArgs, DocumentArgs, DownloadArgs, RegenerateArgs, ReviewArgs};
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;
use crate::progress::Progress;

/// Handle `uw documents`.
pub async fn handle_list(args: &DealArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let docs = ctx
        .pipeline
        .list_documents(&ctx.caller, &args.deal_id)
        .await?;
    output(&docs, flags.format)
}

/// Handle `uw versions`.
pub async fn handle_versions(
    args: &DocumentArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let versions = ctx
        .pipeline
        .list_versions(&ctx.caller, &args.document_id)
        .await?;
    output(&versions, flags.format)
}

/// Handle `uw review`.
pub async fn handle_review(args: &ReviewArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let next = parse_enum::<DocumentStatus>(&args.status, "status")?;
    let doc = ctx
        .pipeline
        .review_document(&ctx.caller, &args.document_id, next)
        .await?;
    output(&doc, flags.format)
}

/// Handle `uw regenerate`.
pub async fn handle_regenerate(
    args: &RegenerateArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let progress = Progress::spinner(&format!("regenerating {}", args.document_id));
    let result = ctx
        .pipeline
        .regenerate(
            &ctx.caller,
            &args.document_id,
            args.expected_version,
            args.notes.clone(),
        )
        .await;
    match result {
        Ok(response) => {
            progress.finish_ok(&format!("v{}", response.document.version));
            output(&response, flags.format)
        }
        Err(error) => {
            progress.finish_err("failed");
            Err(error.into())
        }
    }
}

/// Handle `uw download`.
pub async fn handle_download(
    args: &DownloadArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let download = ctx
        .pipeline
        .download(&ctx.caller, &args.document_id, args.version)
        .await?;
    let response = save(download, args.out.clone()).await?;
    output(&response, flags.format)
}

/// Turn a download into its response, writing bytes to `out` (or
/// `{document_id}-v{version}.md` in the working directory).
async fn save(download: Download, out: Option<PathBuf>) -> anyhow::Result<DownloadResponse> {
    let Download {
        document_id,
        version,
        storage_key,
        body,
    } = download;
    let (url, path) = match body {
        DownloadBody::Url(url) => (Some(url), None),
        DownloadBody::Bytes(bytes) => {
            let path = out.unwrap_or_else(|| PathBuf::from(format!("{document_id}-v{version}.md")));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            (None, Some(path.display().to_string()))
        }
    };
    Ok(DownloadResponse {
        document_id,
        version,
        storage_key,
        url,
        path,
    })
}
