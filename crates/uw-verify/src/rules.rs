//! Declarative math and cross-document check sets.
//!
//! Paths are dataset keys (`"<source_doc_type>.<field.path>"`). A component
//! path may contain `*` segments, in which case every matching field is
//! summed (e.g. every unit's rent on a rent roll).

use uw_core::enums::SourceDocType;

/// Which tolerance a math check is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceKind {
    /// Money, checked to the cent.
    Currency,
    /// Ratios and rates, checked to 0.001.
    Ratio,
}

/// A signed addend of a derived total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub path: &'static str,
    pub negate: bool,
}

#[must_use]
pub const fn plus(path: &'static str) -> Component {
    Component {
        path,
        negate: false,
    }
}

#[must_use]
pub const fn minus(path: &'static str) -> Component {
    Component { path, negate: true }
}

/// How the declared value is recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    /// Signed sum of components.
    Sum(Vec<Component>),
    /// `numerator / denominator`.
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
    },
}

impl Formula {
    /// Human form, recorded on failed checks.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Sum(parts) => {
                let mut out = String::new();
                for (i, c) in parts.iter().enumerate() {
                    match (i, c.negate) {
                        (0, false) => {}
                        (0, true) => out.push('-'),
                        (_, false) => out.push_str(" + "),
                        (_, true) => out.push_str(" - "),
                    }
                    out.push_str(c.path);
                }
                out
            }
            Self::Ratio {
                numerator,
                denominator,
            } => format!("{numerator} / {denominator}"),
        }
    }
}

/// A declared total that must equal its recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathRule {
    pub name: &'static str,
    pub total: &'static str,
    pub formula: Formula,
    pub tolerance: ToleranceKind,
}

/// Two independently sourced values that should agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossDocRule {
    pub name: &'static str,
    /// The value under test. Used as the issue's field path.
    pub subject: &'static str,
    /// Independent value from another document class.
    pub reference: &'static str,
}

impl CrossDocRule {
    /// Document classes the rule compares.
    #[must_use]
    pub fn doc_types(&self) -> (Option<SourceDocType>, Option<SourceDocType>) {
        (doc_type_of(self.subject), doc_type_of(self.reference))
    }
}

fn doc_type_of(path: &str) -> Option<SourceDocType> {
    let head = path.split('.').next()?;
    serde_json::from_value(serde_json::Value::String(head.to_string())).ok()
}

/// The checks run during verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub math: Vec<MathRule>,
    pub cross_doc: Vec<CrossDocRule>,
}

impl RuleSet {
    /// Checks over the standard borrower and property documents.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            math: vec![
                MathRule {
                    name: "effective_gross_income",
                    total: "operating_statement.effective_gross_income",
                    formula: Formula::Sum(vec![
                        plus("operating_statement.gross_potential_rent"),
                        minus("operating_statement.vacancy_loss"),
                        plus("operating_statement.other_income"),
                    ]),
                    tolerance: ToleranceKind::Currency,
                },
                MathRule {
                    name: "net_operating_income",
                    total: "operating_statement.net_operating_income",
                    formula: Formula::Sum(vec![
                        plus("operating_statement.effective_gross_income"),
                        minus("operating_statement.total_operating_expenses"),
                    ]),
                    tolerance: ToleranceKind::Currency,
                },
                MathRule {
                    name: "expense_ratio",
                    total: "operating_statement.expense_ratio",
                    formula: Formula::Ratio {
                        numerator: "operating_statement.total_operating_expenses",
                        denominator: "operating_statement.effective_gross_income",
                    },
                    tolerance: ToleranceKind::Ratio,
                },
                MathRule {
                    name: "balance_sheet_balances",
                    total: "balance_sheet.total_assets",
                    formula: Formula::Sum(vec![
                        plus("balance_sheet.total_liabilities"),
                        plus("balance_sheet.total_equity"),
                    ]),
                    tolerance: ToleranceKind::Currency,
                },
                MathRule {
                    name: "rent_roll_total",
                    total: "rent_roll.total_monthly_rent",
                    formula: Formula::Sum(vec![plus("rent_roll.units.*.monthly_rent")]),
                    tolerance: ToleranceKind::Currency,
                },
                MathRule {
                    name: "tax_return_total_income",
                    total: "tax_return.total_income",
                    formula: Formula::Sum(vec![
                        plus("tax_return.wages"),
                        plus("tax_return.business_income"),
                        plus("tax_return.rental_income"),
                        plus("tax_return.other_income"),
                    ]),
                    tolerance: ToleranceKind::Currency,
                },
                MathRule {
                    name: "bank_statement_balance",
                    total: "bank_statement.ending_balance",
                    formula: Formula::Sum(vec![
                        plus("bank_statement.beginning_balance"),
                        plus("bank_statement.total_deposits"),
                        minus("bank_statement.total_withdrawals"),
                    ]),
                    tolerance: ToleranceKind::Currency,
                },
            ],
            cross_doc: vec![
                CrossDocRule {
                    name: "stated_income_vs_tax_return",
                    subject: "loan_application.annual_income",
                    reference: "tax_return.total_income",
                },
                CrossDocRule {
                    name: "stated_value_vs_appraisal",
                    subject: "loan_application.property_value",
                    reference: "appraisal.appraised_value",
                },
                CrossDocRule {
                    name: "rental_income_vs_operating_statement",
                    subject: "tax_return.rental_income",
                    reference: "operating_statement.net_operating_income",
                },
                CrossDocRule {
                    name: "cash_vs_bank_statement",
                    subject: "balance_sheet.cash",
                    reference: "bank_statement.ending_balance",
                },
                CrossDocRule {
                    name: "fund_nav_vs_balance_sheet",
                    subject: "fund_statement.net_asset_value",
                    reference: "balance_sheet.total_equity",
                },
            ],
        }
    }
}
