use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::subcommands::{DealCommands, SourceCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Create `.underwrite/` with a default config and database.
    Init(InitArgs),
    /// Deals.
    Deal {
        #[command(subcommand)]
        action: DealCommands,
    },
    /// Uploaded source documents.
    Source {
        #[command(subcommand)]
        action: SourceCommands,
    },
    /// Drive a deal until it pauses or completes.
    Run(DealArgs),
    /// Resume a failed deal from the step that failed.
    Restart(DealArgs),
    /// List a deal's verification issues.
    Issues(IssuesArgs),
    /// Resolve a pending verification issue.
    Resolve(ResolveArgs),
    /// List a deal's generated documents.
    Documents(DealArgs),
    /// Version history of a generated document.
    Versions(DocumentArgs),
    /// Record a review decision on a generated document.
    Review(ReviewArgs),
    /// Regenerate a document, optionally with reviewer notes.
    Regenerate(RegenerateArgs),
    /// Download a generated document version.
    Download(DownloadArgs),
    /// Query the audit trail.
    Audit(AuditArgs),
}

#[derive(Clone, Debug, Args)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Clone, Debug, Args)]
pub struct DealArgs {
    pub deal_id: String,
}

#[derive(Clone, Debug, Args)]
pub struct DocumentArgs {
    pub document_id: String,
}

#[derive(Clone, Debug, Args)]
pub struct IssuesArgs {
    pub deal_id: String,
    /// pending, confirmed, corrected or noted
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct ResolveArgs {
    pub issue_id: String,
    /// confirmed, corrected or noted
    #[arg(long)]
    pub status: String,
    /// Replacement value, required for `corrected`.
    #[arg(long)]
    pub value: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct ReviewArgs {
    pub document_id: String,
    /// reviewed, approved or needs_review
    #[arg(long)]
    pub status: String,
}

#[derive(Clone, Debug, Args)]
pub struct RegenerateArgs {
    pub document_id: String,
    /// Version the caller last saw; stale tokens are refused.
    #[arg(long)]
    pub expected_version: Option<i64>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct DownloadArgs {
    pub document_id: String,
    #[arg(long)]
    pub version: Option<i64>,
    /// Where to write the bytes when no presigned URL is available.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
pub struct AuditArgs {
    #[arg(long)]
    pub entity_type: Option<String>,
    #[arg(long)]
    pub entity_id: Option<String>,
    #[arg(long)]
    pub action: Option<String>,
    /// Only entries recorded by this actor.
    #[arg(long)]
    pub by: Option<String>,
    #[arg(long)]
    pub limit: Option<u32>,
}
