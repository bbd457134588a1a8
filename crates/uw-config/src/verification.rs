//! Tolerances for reconciliation and verification.
//!
//! Values are fixed-point decimals. In TOML they may be written either as
//! numbers or as strings (`currency_tolerance = "0.01"`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const fn default_currency_tolerance() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 2)
}

const fn default_ratio_tolerance() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 3)
}

const fn default_cross_doc_warn_pct() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 0)
}

const fn default_cross_doc_fail_pct() -> Decimal {
    Decimal::from_parts(10, 0, 0, false, 0)
}

const fn default_reconcile_abs_tolerance() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 2)
}

const fn default_reconcile_pct_tolerance() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 1)
}

const fn default_reconcile_fail_pct() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 0)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationConfig {
    /// Allowed absolute difference for currency totals.
    #[serde(default = "default_currency_tolerance")]
    pub currency_tolerance: Decimal,

    /// Allowed absolute difference for ratios.
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: Decimal,

    /// Cross-document divergence (percent) above which a WARN issue is raised.
    #[serde(default = "default_cross_doc_warn_pct")]
    pub cross_doc_warn_pct: Decimal,

    /// Cross-document divergence (percent) above which the issue is FAIL.
    #[serde(default = "default_cross_doc_fail_pct")]
    pub cross_doc_fail_pct: Decimal,

    /// Two extractions agree when within this absolute difference...
    #[serde(default = "default_reconcile_abs_tolerance")]
    pub reconcile_abs_tolerance: Decimal,

    /// ...or within this percentage of each other.
    #[serde(default = "default_reconcile_pct_tolerance")]
    pub reconcile_pct_tolerance: Decimal,

    /// Extraction disagreement (percent) above which the issue is FAIL.
    #[serde(default = "default_reconcile_fail_pct")]
    pub reconcile_fail_pct: Decimal,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            currency_tolerance: default_currency_tolerance(),
            ratio_tolerance: default_ratio_tolerance(),
            cross_doc_warn_pct: default_cross_doc_warn_pct(),
            cross_doc_fail_pct: default_cross_doc_fail_pct(),
            reconcile_abs_tolerance: default_reconcile_abs_tolerance(),
            reconcile_pct_tolerance: default_reconcile_pct_tolerance(),
            reconcile_fail_pct: default_reconcile_fail_pct(),
        }
    }
}
