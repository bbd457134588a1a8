use std::collections::BTreeMap;

use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uw_core::enums::Program;

use crate::format::{money, multiple, percent};
use crate::jurisdiction::{Adjustment, AdjustmentKind};

/// Equity distribution for one year of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WaterfallSplit {
    pub preferred_return_rate: Decimal,
    pub equity: Decimal,
    /// NOI after debt service, floored at zero.
    pub distributable_cash: Decimal,
    pub preferred_distribution: Decimal,
    pub investor_distribution: Decimal,
    pub sponsor_distribution: Decimal,
}

/// Every number a generated document may state. Rates and ratios are in
/// percent; money is rounded to the cent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Terms {
    pub program: Program,
    pub jurisdiction: String,
    pub index_rate: Decimal,
    pub spread: Decimal,
    pub ltv_adjustment: Decimal,
    pub interest_rate: Decimal,
    pub requested_amount: Decimal,
    pub max_loan_amount: Decimal,
    pub loan_amount: Decimal,
    pub property_value: Decimal,
    pub ltv: Decimal,
    pub origination_fee_pct: Decimal,
    pub origination_fee: Decimal,
    pub term_months: u32,
    /// Zero for interest-only loans.
    pub amortization_months: u32,
    pub annual_debt_service: Decimal,
    pub net_operating_income: Decimal,
    /// `None` when there is no debt service to cover.
    pub dscr: Option<Decimal>,
    pub withholding_rate: Decimal,
    pub withholding_amount: Decimal,
    pub waterfall: Option<WaterfallSplit>,
    pub adjustments: Vec<Adjustment>,
}

impl Terms {
    /// Whether the usury ceiling changed the rate.
    #[must_use]
    pub fn rate_capped(&self) -> bool {
        self.adjustments
            .iter()
            .any(|a| a.kind == AdjustmentKind::RateAdjustment)
    }

    /// Canonical text of each figure, keyed by placeholder name.
    ///
    /// Generated documents carry `{{name}}` tokens that are replaced with
    /// these strings, and regulatory checks look for them verbatim.
    #[must_use]
    pub fn figures(&self) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::from([
            ("interest_rate", percent(self.interest_rate, 3)),
            ("index_rate", percent(self.index_rate, 3)),
            ("spread", percent(self.spread, 3)),
            ("loan_amount", money(self.loan_amount)),
            ("max_loan_amount", money(self.max_loan_amount)),
            ("property_value", money(self.property_value)),
            ("ltv", percent(self.ltv, 2)),
            ("origination_fee_pct", percent(self.origination_fee_pct, 2)),
            ("origination_fee", money(self.origination_fee)),
            ("term_months", self.term_months.to_string()),
            ("annual_debt_service", money(self.annual_debt_service)),
            ("net_operating_income", money(self.net_operating_income)),
            (
                "dscr",
                self.dscr.map_or_else(|| "n/a".to_string(), multiple),
            ),
            ("withholding_rate", percent(self.withholding_rate, 2)),
            ("withholding_amount", money(self.withholding_amount)),
            ("jurisdiction", self.jurisdiction.clone()),
        ]);
        if let Some(w) = &self.waterfall {
            out.insert("preferred_return_rate", percent(w.preferred_return_rate, 2));
            out.insert("equity", money(w.equity));
            out.insert("distributable_cash", money(w.distributable_cash));
            out.insert("investor_distribution", money(w.investor_distribution));
            out.insert("sponsor_distribution", money(w.sponsor_distribution));
        }
        out
    }

    /// Serialize for storage on the deal.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for this type.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// # Errors
    ///
    /// Returns an error if `value` is not stored terms.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}
