use uw_core::enums::ResolutionStatus;
use uw_db::repos::verification_issue::Resolution;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{IssuesArgs, ResolveArgs};
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

/// Handle `uw issues`.
pub async fn handle_list(args: &IssuesArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let status = args
        .status
        .as_deref()
        .map(|s| parse_enum::<ResolutionStatus>(s, "status"))
        .transpose()?;
    let issues = ctx
        .pipeline
        .list_issues(&ctx.caller, &args.deal_id, status)
        .await?;
    output(&issues, flags.format)
}

/// Handle `uw resolve`.
pub async fn handle_resolve(args: &ResolveArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let resolution = Resolution {
        status: parse_enum(&args.status, "status")?,
        corrected_value: args.value.clone(),
        note: args.note.clone(),
    };
    let issue = ctx
        .pipeline
        .resolve_issue(&ctx.caller, &args.issue_id, &resolution)
        .await?;
    output(&issue, flags.format)
}
