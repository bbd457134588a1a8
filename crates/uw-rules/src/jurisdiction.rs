//! Jurisdiction tables: usury ceilings and withholding.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;

use crate::error::RulesError;

/// Rates are in percent with two decimal places (`1000` is 10.00%).
const fn pct(hundredths: u32) -> Decimal {
    Decimal::from_parts(hundredths, 0, 0, false, 2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jurisdiction {
    pub code: &'static str,
    pub name: &'static str,
    /// Maximum contract interest rate in percent. `None` means no ceiling
    /// applies to commercial loans.
    pub usury_cap: Option<Decimal>,
    /// Withholding on payments to non-resident lenders and investors, in
    /// percent.
    pub withholding_rate: Decimal,
}

const TABLE: &[Jurisdiction] = &[
    Jurisdiction {
        code: "CA",
        name: "California",
        usury_cap: Some(pct(1000)),
        withholding_rate: pct(700),
    },
    Jurisdiction {
        code: "DE",
        name: "Delaware",
        usury_cap: None,
        withholding_rate: pct(0),
    },
    Jurisdiction {
        code: "FL",
        name: "Florida",
        usury_cap: Some(pct(1800)),
        withholding_rate: pct(0),
    },
    Jurisdiction {
        code: "NV",
        name: "Nevada",
        usury_cap: None,
        withholding_rate: pct(0),
    },
    Jurisdiction {
        code: "NY",
        name: "New York",
        usury_cap: Some(pct(1600)),
        withholding_rate: pct(0),
    },
    Jurisdiction {
        code: "TX",
        name: "Texas",
        usury_cap: Some(pct(1800)),
        withholding_rate: pct(0),
    },
    Jurisdiction {
        code: "WA",
        name: "Washington",
        usury_cap: Some(pct(1200)),
        withholding_rate: pct(0),
    },
];

impl Jurisdiction {
    /// Look up a jurisdiction by its two-letter code, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::UnknownJurisdiction`] if no table exists.
    pub fn lookup(code: &str) -> Result<&'static Self, RulesError> {
        let code = code.trim();
        TABLE
            .iter()
            .find(|j| j.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| RulesError::UnknownJurisdiction(code.to_string()))
    }

    #[must_use]
    pub const fn all() -> &'static [Self] {
        TABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// The computed rate exceeded the jurisdiction ceiling and was capped.
    RateAdjustment,
    /// The requested amount exceeded the program maximum and was reduced.
    LoanSizing,
}

/// A figure the engine changed from its raw computation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Adjustment {
    pub kind: AdjustmentKind,
    pub field: String,
    pub from: Decimal,
    pub to: Decimal,
    pub reason: String,
}

/// A rate after the ceiling check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CappedRate {
    pub rate: Decimal,
    pub adjustment: Option<Adjustment>,
}

/// Hold `rate` to the jurisdiction's usury ceiling.
///
/// A compliant rate passes through untouched with no adjustment. A rate
/// above the ceiling comes back equal to the ceiling, flagged.
#[must_use]
pub fn apply_usury_cap(rate: Decimal, jurisdiction: &Jurisdiction) -> CappedRate {
    match jurisdiction.usury_cap {
        Some(cap) if rate > cap => {
            tracing::info!(jurisdiction = jurisdiction.code, %rate, %cap, "rate capped at usury ceiling");
            CappedRate {
                rate: cap,
                adjustment: Some(Adjustment {
                    kind: AdjustmentKind::RateAdjustment,
                    field: "interest_rate".to_string(),
                    from: rate,
                    to: cap,
                    reason: format!("{} usury ceiling is {cap}%", jurisdiction.name),
                }),
            }
        }
        _ => CappedRate {
            rate,
            adjustment: None,
        },
    }
}
