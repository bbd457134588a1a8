mod deal;
mod source;

pub use deal::DealCommands;
pub use source::SourceCommands;
