//! Deterministic verification over a [`VerifiedDataset`].
//!
//! Produces issues in a fixed order: math checks, then cross-document checks
//! (both in rule order), then extraction disagreements in upload order.

use rust_decimal::Decimal;
use serde::Serialize;

use uw_config::VerificationConfig;
use uw_core::entities::{NewVerificationIssue, VerificationIssue};
use uw_core::enums::{CheckType, Severity, SourceDocType, VerificationStatus};

use crate::dataset::VerifiedDataset;
use crate::reconcile::ReconciledRecord;
use crate::rules::{CrossDocRule, Formula, MathRule, RuleSet, ToleranceKind};
use crate::value::{format_decimal, parse_decimal, pct_difference};

/// Whether `|declared - Σ components| <= tolerance`.
///
/// Arithmetic overflow counts as a failure.
#[must_use]
pub fn math_check(declared: Decimal, components: &[Decimal], tolerance: Decimal) -> bool {
    let Some(recomputed) = components
        .iter()
        .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(*c))
    else {
        return false;
    };
    within(declared, recomputed, tolerance)
}

fn within(declared: Decimal, recomputed: Decimal, tolerance: Decimal) -> bool {
    declared
        .checked_sub(recomputed)
        .is_some_and(|d| d.abs() <= tolerance)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Warned,
    Failed,
    /// Inputs missing from the dataset.
    Skipped,
}

/// Evidence for one executed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub check_type: CheckType,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub checks: Vec<CheckOutcome>,
    pub issues: Vec<NewVerificationIssue>,
}

impl VerificationReport {
    /// Overall verdict, from the worst issue severity.
    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        match self.issues.iter().map(|i| i.severity).max() {
            Some(Severity::Fail) => VerificationStatus::Failed,
            Some(Severity::Warn) => VerificationStatus::Warnings,
            Some(Severity::Info) | None => VerificationStatus::Passed,
        }
    }

    #[must_use]
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

/// Pending issues that keep a deal in verification.
#[must_use]
pub fn blocking_issues(
    issues: &[VerificationIssue],
    require_warn_resolution: bool,
) -> Vec<&VerificationIssue> {
    issues
        .iter()
        .filter(|i| i.is_blocking(require_warn_resolution))
        .collect()
}

/// Whether a deal with `issues` may move on to analysis.
#[must_use]
pub fn can_leave_verification(issues: &[VerificationIssue], require_warn_resolution: bool) -> bool {
    !issues.iter().any(|i| i.is_blocking(require_warn_resolution))
}

#[derive(Debug, Clone)]
pub struct VerificationEngine {
    rules: RuleSet,
    currency_tolerance: Decimal,
    ratio_tolerance: Decimal,
    cross_doc_warn_pct: Decimal,
    cross_doc_fail_pct: Decimal,
}

impl VerificationEngine {
    /// Engine running [`RuleSet::standard`].
    #[must_use]
    pub fn from_config(config: &VerificationConfig) -> Self {
        Self::with_rules(config, RuleSet::standard())
    }

    #[must_use]
    pub fn with_rules(config: &VerificationConfig, rules: RuleSet) -> Self {
        Self {
            rules,
            currency_tolerance: config.currency_tolerance,
            ratio_tolerance: config.ratio_tolerance,
            cross_doc_warn_pct: config.cross_doc_warn_pct,
            cross_doc_fail_pct: config.cross_doc_fail_pct,
        }
    }

    /// Run every rule against `dataset` and collect extraction disagreements
    /// from `records`.
    #[must_use]
    pub fn verify(
        &self,
        dataset: &VerifiedDataset,
        records: &[(SourceDocType, ReconciledRecord)],
    ) -> VerificationReport {
        let mut report = VerificationReport::default();

        for rule in &self.rules.math {
            let (outcome, issue) = self.run_math(dataset, rule);
            report.checks.push(outcome);
            report.issues.extend(issue);
        }
        for rule in &self.rules.cross_doc {
            let (outcome, issue) = self.run_cross_doc(dataset, rule);
            report.checks.push(outcome);
            report.issues.extend(issue);
        }
        for (doc_type, record) in records {
            report.issues.extend(record.issues(*doc_type));
        }

        tracing::debug!(
            checks = report.checks.len(),
            failed = report.count(CheckStatus::Failed),
            skipped = report.count(CheckStatus::Skipped),
            issues = report.issues.len(),
            "verification complete"
        );
        report
    }

    fn tolerance(&self, kind: ToleranceKind) -> Decimal {
        match kind {
            ToleranceKind::Currency => self.currency_tolerance,
            ToleranceKind::Ratio => self.ratio_tolerance,
        }
    }

    fn run_math(
        &self,
        dataset: &VerifiedDataset,
        rule: &MathRule,
    ) -> (CheckOutcome, Option<NewVerificationIssue>) {
        let formula = rule.formula.describe();
        let outcome = |status, detail: String| CheckOutcome {
            name: rule.name.to_string(),
            check_type: CheckType::Math,
            status,
            detail,
        };

        let Some(declared) = dataset.decimal(rule.total) else {
            return (outcome(CheckStatus::Skipped, format!("{} not extracted", rule.total)), None);
        };
        let recomputed = match recompute(dataset, &rule.formula) {
            Ok(value) => value,
            Err(reason) => return (outcome(CheckStatus::Skipped, reason), None),
        };

        let tolerance = self.tolerance(rule.tolerance);
        if within(declared, recomputed, tolerance) {
            return (outcome(CheckStatus::Passed, format!("{} = {formula}", rule.total)), None);
        }

        let difference = declared
            .checked_sub(recomputed)
            .map_or_else(|| "overflow".to_string(), |d| format_decimal(d.abs()));
        let detail = format!(
            "{} = {formula}; off by {difference} (tolerance {})",
            rule.total,
            format_decimal(tolerance)
        );
        let issue = NewVerificationIssue {
            check_type: CheckType::Math,
            field_path: rule.total.to_string(),
            expected: format_decimal(recomputed),
            actual: format_decimal(declared),
            severity: Severity::Fail,
            detail: detail.clone(),
        };
        (outcome(CheckStatus::Failed, detail), Some(issue))
    }

    fn run_cross_doc(
        &self,
        dataset: &VerifiedDataset,
        rule: &CrossDocRule,
    ) -> (CheckOutcome, Option<NewVerificationIssue>) {
        let outcome = |status, detail: String| CheckOutcome {
            name: rule.name.to_string(),
            check_type: CheckType::CrossDoc,
            status,
            detail,
        };

        let (Some(subject), Some(reference)) =
            (dataset.decimal(rule.subject), dataset.decimal(rule.reference))
        else {
            return (
                outcome(
                    CheckStatus::Skipped,
                    format!("needs both {} and {}", rule.subject, rule.reference),
                ),
                None,
            );
        };

        // Overflow is treated as unbounded divergence.
        let pct = pct_difference(subject, reference);
        let severity = match pct {
            Some(p) if p <= self.cross_doc_warn_pct => {
                let detail = format!(
                    "{} agrees with {} within {}%",
                    rule.subject,
                    rule.reference,
                    format_decimal(p.round_dp(2))
                );
                return (outcome(CheckStatus::Passed, detail), None);
            }
            Some(p) if p <= self.cross_doc_fail_pct => Severity::Warn,
            _ => Severity::Fail,
        };

        let shown = pct.map_or_else(|| "overflow".to_string(), |p| format_decimal(p.round_dp(2)));
        let detail = format!("{} differs from {} by {shown}%", rule.subject, rule.reference);
        let status = if severity == Severity::Fail {
            CheckStatus::Failed
        } else {
            CheckStatus::Warned
        };
        let issue = NewVerificationIssue {
            check_type: CheckType::CrossDoc,
            field_path: rule.subject.to_string(),
            expected: format_decimal(reference),
            actual: format_decimal(subject),
            severity,
            detail: detail.clone(),
        };
        (outcome(status, detail), Some(issue))
    }
}

/// Recompute a formula. Missing sum components count as zero as long as at
/// least one is present.
fn recompute(dataset: &VerifiedDataset, formula: &Formula) -> Result<Decimal, String> {
    match formula {
        Formula::Sum(parts) => {
            let mut total = Decimal::ZERO;
            let mut found = false;
            for part in parts {
                for value in component_values(dataset, part.path) {
                    found = true;
                    let signed = if part.negate { -value } else { value };
                    total = total
                        .checked_add(signed)
                        .ok_or_else(|| format!("overflow summing {}", part.path))?;
                }
            }
            if found {
                Ok(total)
            } else {
                Err("no components extracted".to_string())
            }
        }
        Formula::Ratio {
            numerator,
            denominator,
        } => {
            let n = dataset
                .decimal(numerator)
                .ok_or_else(|| format!("{numerator} not extracted"))?;
            let d = dataset
                .decimal(denominator)
                .ok_or_else(|| format!("{denominator} not extracted"))?;
            if d.is_zero() {
                return Err(format!("{denominator} is zero"));
            }
            n.checked_div(d)
                .ok_or_else(|| format!("overflow dividing by {denominator}"))
        }
    }
}

fn component_values(dataset: &VerifiedDataset, path: &str) -> Vec<Decimal> {
    if path.split('.').any(|s| s == "*") {
        dataset
            .matching(path)
            .filter_map(|(_, v)| parse_decimal(v))
            .collect()
    } else {
        dataset.decimal(path).into_iter().collect()
    }
}
