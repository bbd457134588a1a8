use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Deal { action } => commands::deal::handle(&action, ctx, flags).await,
        Commands::Source { action } => commands::source::handle(&action, ctx, flags).await,
        Commands::Run(args) => commands::run::handle_run(&args, ctx, flags).await,
        Commands::Restart(args) => commands::run::handle_restart(&args, ctx, flags).await,
        Commands::Issues(args) => commands::issue::handle_list(&args, ctx, flags).await,
        Commands::Resolve(args) => commands::issue::handle_resolve(&args, ctx, flags).await,
        Commands::Documents(args) => commands::document::handle_list(&args, ctx, flags).await,
        Commands::Versions(args) => commands::document::handle_versions(&args, ctx, flags).await,
        Commands::Review(args) => commands::document::handle_review(&args, ctx, flags).await,
        Commands::Regenerate(args) => commands::document::handle_regenerate(&args, ctx, flags).await,
        Commands::Download(args) => commands::document::handle_download(&args, ctx, flags).await,
        Commands::Audit(args) => commands::audit::handle(&args, ctx, flags).await,
        Commands::Init(_) => unreachable!("init is pre-dispatched in main"),
    }
}
