//! Deterministic regulatory checks on a generated document body.
//!
//! Three kinds of check, all text-level: every required section appears as a
//! Markdown heading, no `{{placeholder}}` token is left unresolved, and every
//! required rules-engine figure is quoted exactly as [`Terms::figures`]
//! renders it.
//!
//! [`Terms::figures`]: uw_rules::Terms::figures

use std::collections::BTreeMap;

use uw_core::entities::RegulatoryCheck;
use uw_core::enums::GeneratedDocType;

/// Headings a document of `doc_type` must carry.
#[must_use]
pub const fn required_sections(doc_type: GeneratedDocType) -> &'static [&'static str] {
    match doc_type {
        GeneratedDocType::TermSheet => &["Parties", "Loan Terms", "Interest Rate", "Fees", "Conditions"],
        GeneratedDocType::LoanAgreement => &[
            "Definitions",
            "Loan Amount",
            "Interest",
            "Repayment",
            "Events of Default",
            "Governing Law",
        ],
        GeneratedDocType::PromissoryNote => {
            &["Promise to Pay", "Interest", "Payments", "Default", "Governing Law"]
        }
        GeneratedDocType::PrivatePlacementMemorandum => &[
            "Offering Summary",
            "Risk Factors",
            "Use of Proceeds",
            "Distribution Waterfall",
            "Investor Suitability",
        ],
        GeneratedDocType::SubscriptionAgreement => {
            &["Subscription", "Representations", "Tax Withholding", "Governing Law"]
        }
        GeneratedDocType::ComplianceReport => {
            &["Usury Review", "Verification Summary", "Regulatory Findings"]
        }
        GeneratedDocType::CreditMemo => &[
            "Executive Summary",
            "Collateral",
            "Cash Flow",
            "Risk Rating",
            "Recommendation",
        ],
    }
}

/// Figure names a document of `doc_type` must quote.
#[must_use]
pub const fn required_figures(doc_type: GeneratedDocType) -> &'static [&'static str] {
    match doc_type {
        GeneratedDocType::TermSheet => &[
            "loan_amount",
            "interest_rate",
            "origination_fee",
            "ltv",
            "term_months",
        ],
        GeneratedDocType::LoanAgreement => {
            &["loan_amount", "interest_rate", "term_months", "jurisdiction"]
        }
        GeneratedDocType::PromissoryNote => &["loan_amount", "interest_rate", "annual_debt_service"],
        GeneratedDocType::PrivatePlacementMemorandum => &[
            "equity",
            "preferred_return_rate",
            "investor_distribution",
            "sponsor_distribution",
        ],
        GeneratedDocType::SubscriptionAgreement => &["equity", "withholding_rate"],
        GeneratedDocType::ComplianceReport => &["interest_rate", "jurisdiction", "withholding_rate"],
        GeneratedDocType::CreditMemo => &["loan_amount", "ltv", "dscr", "net_operating_income"],
    }
}

/// Placeholder names still present in `body`, in order of appearance.
#[must_use]
pub fn unresolved_placeholders(body: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            names.push(after.chars().take(32).collect());
            break;
        };
        names.push(after[..end].trim().to_string());
        rest = &after[end + 2..];
    }
    names
}

fn has_heading(body: &str, section: &str) -> bool {
    let wanted = section.to_ascii_lowercase();
    body.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with('#')
            && line
                .trim_start_matches('#')
                .to_ascii_lowercase()
                .contains(&wanted)
    })
}

fn slug(section: &str) -> String {
    section.to_ascii_lowercase().replace(' ', "_")
}

/// Run every check for `doc_type` against `body`.
#[must_use]
pub fn run_checks(
    doc_type: GeneratedDocType,
    body: &str,
    figures: &BTreeMap<&'static str, String>,
) -> Vec<RegulatoryCheck> {
    let mut checks = Vec::new();

    for section in required_sections(doc_type) {
        let passed = has_heading(body, section);
        checks.push(RegulatoryCheck {
            name: format!("section:{}", slug(section)),
            passed,
            detail: if passed {
                format!("'{section}' present")
            } else {
                format!("required section '{section}' is missing")
            },
        });
    }

    let unresolved = unresolved_placeholders(body);
    checks.push(RegulatoryCheck {
        name: "placeholders_resolved".into(),
        passed: unresolved.is_empty(),
        detail: if unresolved.is_empty() {
            "no unresolved placeholders".into()
        } else {
            format!("unresolved placeholders: {}", unresolved.join(", "))
        },
    });

    for name in required_figures(doc_type) {
        let (passed, detail) = match figures.get(name) {
            Some(text) if body.contains(text.as_str()) => (true, format!("{name} cited as {text}")),
            Some(text) => (false, format!("{name} must be cited verbatim as {text}")),
            None => (false, format!("{name} was not computed for this deal")),
        };
        checks.push(RegulatoryCheck {
            name: format!("figure:{name}"),
            passed,
            detail,
        });
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn figures() -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("loan_amount", "$1,000,000.00".to_string()),
            ("interest_rate", "7.250%".to_string()),
            ("annual_debt_service", "$81,862.56".to_string()),
        ])
    }

    const NOTE: &str = "# Promissory Note\n\n## Promise to Pay\nBorrower promises to pay $1,000,000.00.\n\n\
## Interest\nInterest accrues at 7.250% per annum.\n\n## Payments\nAnnual debt service of $81,862.56.\n\n\
## Default\nStandard.\n\n## Governing Law\nNew York.\n";

    #[test]
    fn complete_note_passes() {
        let checks = run_checks(GeneratedDocType::PromissoryNote, NOTE, &figures());
        let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
        assert!(failed.is_empty(), "{failed:?}");
        assert_eq!(checks.len(), 5 + 1 + 3);
    }

    #[test]
    fn missing_section_and_altered_figure_fail() {
        let body = NOTE
            .replace("## Default\nStandard.\n\n", "")
            .replace("7.250%", "7.25%");
        let checks = run_checks(GeneratedDocType::PromissoryNote, &body, &figures());
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(failed, vec!["section:default", "figure:interest_rate"]);
    }

    #[test]
    fn section_name_in_prose_is_not_a_heading() {
        assert!(!has_heading("The Governing Law is New York.", "Governing Law"));
        assert!(has_heading("### 7. GOVERNING LAW", "Governing Law"));
    }

    #[test]
    fn placeholders_are_reported() {
        assert_eq!(
            unresolved_placeholders("rate {{ interest_rate }} and {{ltv}} and {{broken"),
            vec!["interest_rate", "ltv", "broken"]
        );
        let checks = run_checks(GeneratedDocType::PromissoryNote, "{{loan_amount}}", &figures());
        let placeholder = checks
            .iter()
            .find(|c| c.name == "placeholders_resolved")
            .unwrap();
        assert!(!placeholder.passed);
        assert_eq!(placeholder.detail, "unresolved placeholders: loan_amount");
    }

    #[test]
    fn uncomputed_figure_fails() {
        let checks = run_checks(GeneratedDocType::SubscriptionAgreement, "", &figures());
        let equity = checks.iter().find(|c| c.name == "figure:equity").unwrap();
        assert!(!equity.passed);
        assert!(equity.detail.contains("not computed"));
    }

    #[test]
    fn every_document_type_has_sections_and_figures() {
        for doc_type in [
            GeneratedDocType::TermSheet,
            GeneratedDocType::LoanAgreement,
            GeneratedDocType::PromissoryNote,
            GeneratedDocType::PrivatePlacementMemorandum,
            GeneratedDocType::SubscriptionAgreement,
            GeneratedDocType::ComplianceReport,
            GeneratedDocType::CreditMemo,
        ] {
            assert!(!required_sections(doc_type).is_empty());
            assert!(!required_figures(doc_type).is_empty());
        }
    }
}
