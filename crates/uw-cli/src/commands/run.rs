use uw_core::responses::PipelineRunResponse;
use uw_pipeline::PipelineError;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::DealArgs;
use crate::context::AppContext;
use crate::output::output;
use crate::progress::Progress;

/// Handle `uw run`.
pub async fn handle_run(args: &DealArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let progress = Progress::spinner(&format!("running {}", args.deal_id));
    let result = ctx.pipeline.run(&ctx.caller, &args.deal_id).await;
    finish(&progress, result, flags)
}

/// Handle `uw restart`.
pub async fn handle_restart(args: &DealArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let progress = Progress::spinner(&format!("restarting {}", args.deal_id));
    let result = ctx.pipeline.restart(&ctx.caller, &args.deal_id).await;
    finish(&progress, result, flags)
}

fn finish(
    progress: &Progress,
    result: Result<PipelineRunResponse, PipelineError>,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match result {
        Ok(response) => {
            progress.finish_ok(&summary(&response));
            output(&response, flags.format)
        }
        Err(error) => {
            progress.finish_err("failed");
            Err(error.into())
        }
    }
}

fn summary(response: &PipelineRunResponse) -> String {
    let pending = response.pending_issues.len();
    if pending > 0 {
        format!("{}: {pending} issue(s) to resolve", response.deal.status)
    } else {
        format!(
            "{}: {} document(s)",
            response.deal.status,
            response.documents.len()
        )
    }
}
