use uw_core::enums::{AuditAction, EntityType};
use uw_db::repos::audit::AuditFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::AuditArgs;
use crate::commands::shared::limit::effective_limit;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

/// Handle `uw audit`.
pub async fn handle(args: &AuditArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let filter = AuditFilter {
        entity_type: args
            .entity_type
            .as_deref()
            .map(|v| parse_enum::<EntityType>(v, "entity_type"))
            .transpose()?,
        entity_id: args.entity_id.clone(),
        action: args
            .action
            .as_deref()
            .map(|v| parse_enum::<AuditAction>(v, "action"))
            .transpose()?,
        actor_id: args.by.clone(),
        limit: Some(effective_limit(args.limit, flags.limit, 100)),
    };
    let entries = ctx.pipeline.audit_log(&ctx.caller, &filter).await?;
    output(&entries, flags.format)
}
