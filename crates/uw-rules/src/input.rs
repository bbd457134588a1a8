//! Figures the engine reads from a verified dataset.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uw_verify::VerifiedDataset;

use crate::error::RulesError;

pub const REQUESTED_AMOUNT: &str = "loan_application.requested_amount";
/// Appraised value wins over the borrower's stated value.
pub const PROPERTY_VALUE: [&str; 2] = ["appraisal.appraised_value", "loan_application.property_value"];
pub const NET_OPERATING_INCOME: &str = "operating_statement.net_operating_income";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesInput {
    pub requested_amount: Decimal,
    pub property_value: Decimal,
    /// May be zero or negative; sizing then allows no debt-serviced loan.
    pub net_operating_income: Decimal,
}

impl RulesInput {
    /// Read the inputs from `dataset`.
    ///
    /// # Errors
    ///
    /// [`RulesError::MissingInput`] when a figure is absent and
    /// [`RulesError::InvalidInput`] when an amount is not positive.
    pub fn from_dataset(dataset: &VerifiedDataset) -> Result<Self, RulesError> {
        let requested_amount = dataset
            .decimal(REQUESTED_AMOUNT)
            .ok_or_else(|| RulesError::MissingInput(REQUESTED_AMOUNT.to_string()))?;
        let property_value = PROPERTY_VALUE
            .iter()
            .find_map(|key| dataset.decimal(key))
            .ok_or_else(|| RulesError::MissingInput(PROPERTY_VALUE.join(" or ")))?;
        let net_operating_income = dataset
            .decimal(NET_OPERATING_INCOME)
            .ok_or_else(|| RulesError::MissingInput(NET_OPERATING_INCOME.to_string()))?;

        let input = Self {
            requested_amount,
            property_value,
            net_operating_income,
        };
        input.validate()?;
        Ok(input)
    }

    /// # Errors
    ///
    /// [`RulesError::InvalidInput`] when an amount is not positive.
    pub fn validate(&self) -> Result<(), RulesError> {
        for (field, value) in [
            ("requested_amount", self.requested_amount),
            ("property_value", self.property_value),
        ] {
            if value <= Decimal::ZERO {
                return Err(RulesError::InvalidInput {
                    field: field.to_string(),
                    reason: format!("must be positive, got {value}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(pairs: &[(&str, serde_json::Value)]) -> VerifiedDataset {
        let mut d = VerifiedDataset::default();
        for (k, v) in pairs {
            d.insert(*k, v.clone());
        }
        d
    }

    #[test]
    fn appraisal_preferred_over_stated_value() {
        let input = RulesInput::from_dataset(&data(&[
            (REQUESTED_AMOUNT, json!("$600,000")),
            ("loan_application.property_value", json!(1_100_000)),
            ("appraisal.appraised_value", json!(1_000_000)),
            (NET_OPERATING_INCOME, json!(90_000)),
        ]))
        .unwrap();
        assert_eq!(input.property_value, Decimal::from(1_000_000));
        assert_eq!(input.requested_amount, Decimal::from(600_000));
    }

    #[test]
    fn missing_noi_is_reported() {
        let err = RulesInput::from_dataset(&data(&[
            (REQUESTED_AMOUNT, json!(1)),
            ("loan_application.property_value", json!(2)),
        ]))
        .unwrap_err();
        assert_eq!(err, RulesError::MissingInput(NET_OPERATING_INCOME.into()));
    }

    #[test]
    fn non_positive_value_rejected() {
        let err = RulesInput::from_dataset(&data(&[
            (REQUESTED_AMOUNT, json!(100)),
            ("appraisal.appraised_value", json!(0)),
            (NET_OPERATING_INCOME, json!(10)),
        ]))
        .unwrap_err();
        assert!(matches!(err, RulesError::InvalidInput { ref field, .. } if field == "property_value"));
    }
}
