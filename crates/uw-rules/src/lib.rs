//! # uw-rules
//!
//! Deterministic deal terms for Underwrite.
//!
//! [`compute`] turns verified inputs, a [`Program`](uw_core::enums::Program)
//! and a jurisdiction code into [`Terms`]: rate, fee, LTV, DSCR, maximum
//! loan, withholding and (for syndications) the equity waterfall. It is a
//! pure function. Generated documents never state a figure of their own;
//! they quote [`Terms::figures`].

mod compute;
mod error;
pub mod format;
mod input;
mod jurisdiction;
mod program;
mod terms;

pub use compute::{annual_constant, compute};
pub use error::RulesError;
pub use input::RulesInput;
pub use jurisdiction::{Adjustment, AdjustmentKind, CappedRate, Jurisdiction, apply_usury_cap};
pub use program::{LtvTier, ProgramTable, WaterfallTable};
pub use terms::{Terms, WaterfallSplit};
