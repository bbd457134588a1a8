use std::path::PathBuf;

use clap::Subcommand;

/// Source document commands.
#[derive(Clone, Debug, Subcommand)]
pub enum SourceCommands {
    /// Upload a file to a deal.
    Add {
        deal_id: String,
        file: PathBuf,
        /// Defaults to a guess from the file extension.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// List a deal's uploads.
    List { deal_id: String },
}
