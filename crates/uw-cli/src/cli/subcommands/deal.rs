use clap::Subcommand;

/// Deal commands.
#[derive(Clone, Debug, Subcommand)]
pub enum DealCommands {
    /// Create a deal.
    Create {
        #[arg(long)]
        name: String,
        /// conventional, bridge, sba7a or syndication
        #[arg(long)]
        program: String,
        /// Two-letter state code, e.g. NY
        #[arg(long)]
        jurisdiction: String,
    },
    /// Get a deal by ID.
    Get { id: String },
    /// List deals, newest first.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Edit a deal's name, program or jurisdiction.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        jurisdiction: Option<String>,
    },
    /// Delete a deal.
    Delete { id: String },
}
