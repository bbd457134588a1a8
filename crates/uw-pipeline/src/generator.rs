//! Draft, check, review, repeat.
//!
//! One call to [`Generator::produce`] runs up to `max_cycles` rounds of:
//! draft prose through the generative service with every rules-owned figure
//! requested as a `{{placeholder}}`, substitute the figures from [`Terms`],
//! run the deterministic regulatory checks and the compliance reviewer. A
//! round that passes both ends the loop. Otherwise the new findings are
//! folded into the feedback for the next draft. Running out of cycles is a
//! needs-review outcome, not an error.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;
use uw_core::entities::{
    ComplianceIssue, DocumentVersion, GeneratedDocument, RegulatoryCheck, VerificationIssue,
};
use uw_core::enums::{
    ComplianceStatus, DocumentStatus, GeneratedDocType, Program, ResolutionStatus, Severity,
    VerificationStatus,
};
use uw_db::repos::generated_document::DocumentRevision;
use uw_llm::{Generative, LlmError};
use uw_rules::{Jurisdiction, Terms};
use uw_verify::VerifiedDataset;

use crate::compliance::ComplianceReviewer;
use crate::regulatory::{required_sections, run_checks};

const NOTES_HEADER: &str = "Reviewer notes:\n";

/// Accumulated review history handed to the next draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feedback {
    pub compliance: Vec<ComplianceIssue>,
    /// Failed checks only.
    pub regulatory: Vec<RegulatoryCheck>,
    pub verification: Vec<VerificationIssue>,
    pub notes: Option<String>,
}

impl Feedback {
    /// Seed from every version of a document being regenerated, oldest
    /// first, so findings and reviewer notes from earlier rounds carry
    /// forward. `notes` are the reviewer's notes for this round.
    #[must_use]
    pub fn from_history(
        doc: &GeneratedDocument,
        versions: &[DocumentVersion],
        notes: Option<String>,
    ) -> Self {
        let mut feedback = Self::default();
        for version in versions {
            feedback.absorb(&version.compliance_issues, &version.regulatory_checks);
        }
        feedback.absorb(&doc.compliance_issues, &doc.regulatory_checks);
        feedback.verification = doc
            .verification_issues
            .iter()
            .filter(|i| i.severity != Severity::Info)
            .cloned()
            .collect();

        let earlier = versions
            .iter()
            .filter_map(|v| v.feedback.as_deref())
            .filter_map(|f| f.split_once(NOTES_HEADER).map(|(_, n)| n));
        let mut lines: Vec<&str> = Vec::new();
        for line in earlier
            .chain(notes.as_deref())
            .flat_map(str::lines)
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        feedback.notes = (!lines.is_empty()).then(|| lines.join("\n"));
        feedback
    }

    /// Append findings not already present. Passed checks are ignored.
    pub fn absorb(&mut self, issues: &[ComplianceIssue], checks: &[RegulatoryCheck]) {
        for issue in issues {
            if !self.compliance.contains(issue) {
                self.compliance.push(issue.clone());
            }
        }
        for check in checks.iter().filter(|c| !c.passed) {
            if !self.regulatory.iter().any(|c| c.name == check.name) {
                self.regulatory.push(check.clone());
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compliance.is_empty()
            && self.regulatory.is_empty()
            && self.verification.is_empty()
            && self.notes.is_none()
    }

    /// Structured text for the draft prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.compliance.is_empty() {
            out.push_str("Compliance issues:\n");
            for i in &self.compliance {
                let _ = write!(out, "- [{}] {}: {}", i.severity, i.section, i.description);
                if let Some(rec) = &i.recommendation {
                    let _ = write!(out, " (recommendation: {rec})");
                }
                out.push('\n');
            }
        }
        if !self.regulatory.is_empty() {
            out.push_str("Failed regulatory checks:\n");
            for c in &self.regulatory {
                let _ = writeln!(out, "- {}: {}", c.name, c.detail);
            }
        }
        if !self.verification.is_empty() {
            out.push_str("Verification issues:\n");
            for v in &self.verification {
                let _ = writeln!(
                    out,
                    "- [{} {}] {} expected {} got {} ({})",
                    v.severity, v.status, v.field_path, v.expected, v.actual, v.detail
                );
            }
        }
        if let Some(notes) = &self.notes {
            let _ = writeln!(out, "{NOTES_HEADER}{notes}");
        }
        out
    }
}

/// Replace each `{{name}}` with its figure. Unknown names are left in place
/// for the placeholder check to catch.
#[must_use]
pub fn substitute(text: &str, figures: &BTreeMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        match figures.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Aggregate verdict of the issues still awaiting a human.
#[must_use]
pub fn verification_status(issues: &[VerificationIssue]) -> VerificationStatus {
    let worst = issues
        .iter()
        .filter(|i| i.status == ResolutionStatus::Pending)
        .map(|i| i.severity)
        .max();
    match worst {
        Some(Severity::Fail) => VerificationStatus::Failed,
        Some(Severity::Warn) => VerificationStatus::Warnings,
        Some(Severity::Info) | None => VerificationStatus::Passed,
    }
}

/// Everything a draft is written from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub doc_type: GeneratedDocType,
    pub deal_name: &'a str,
    pub program: Program,
    pub jurisdiction: &'a Jurisdiction,
    pub dataset: &'a VerifiedDataset,
    pub terms: &'a Terms,
    pub verification_issues: &'a [VerificationIssue],
}

/// A finished document body and the record to persist with it.
#[derive(Debug, Clone)]
pub struct Generated {
    pub body: String,
    pub revision: DocumentRevision,
}

impl Generated {
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.revision.status == DocumentStatus::NeedsReview
    }
}

pub struct Generator {
    generative: Arc<dyn Generative>,
    reviewer: ComplianceReviewer,
    max_cycles: u32,
    draft_max_tokens: u32,
}

impl Generator {
    #[must_use]
    pub fn new(
        generative: Arc<dyn Generative>,
        max_cycles: u32,
        draft_max_tokens: u32,
        review_max_tokens: u32,
    ) -> Self {
        Self {
            reviewer: ComplianceReviewer::new(Arc::clone(&generative), review_max_tokens),
            generative,
            max_cycles: max_cycles.max(1),
            draft_max_tokens,
        }
    }

    /// Run the draft/review loop for one document.
    ///
    /// # Errors
    ///
    /// Returns the provider error if a draft cannot be produced after the
    /// retry policy of the injected client gives up. Review failures are
    /// findings, not errors.
    pub async fn produce(
        &self,
        ctx: GenerationContext<'_>,
        mut feedback: Feedback,
    ) -> Result<Generated, LlmError> {
        let figures = ctx.terms.figures();
        if feedback.verification.is_empty() {
            feedback.verification = ctx
                .verification_issues
                .iter()
                .filter(|i| i.severity != Severity::Info)
                .cloned()
                .collect();
        }

        let mut cycle = 0;
        loop {
            cycle += 1;
            let prompt = draft_prompt(&ctx, &figures, &feedback);
            let draft = self.generative.complete(&prompt, self.draft_max_tokens).await?;
            let body = substitute(&draft, &figures);

            let checks = run_checks(ctx.doc_type, &body, &figures);
            let issues = self
                .reviewer
                .review(ctx.doc_type, ctx.program, ctx.jurisdiction, &body)
                .await;
            let blocking = issues.iter().any(|i| i.severity.is_blocking());
            let passed = !blocking && checks.iter().all(|c| c.passed);

            tracing::debug!(
                doc_type = %ctx.doc_type,
                cycle,
                passed,
                issues = issues.len(),
                failed_checks = checks.iter().filter(|c| !c.passed).count(),
                "review cycle finished"
            );

            if passed || cycle >= self.max_cycles {
                if !passed {
                    tracing::info!(doc_type = %ctx.doc_type, cycle, "review cycles exhausted; needs review");
                }
                let compliance_status = if passed {
                    ComplianceStatus::Passed
                } else if blocking {
                    ComplianceStatus::Failed
                } else {
                    ComplianceStatus::NeedsReview
                };
                let revision = DocumentRevision {
                    status: if passed {
                        DocumentStatus::Generated
                    } else {
                        DocumentStatus::NeedsReview
                    },
                    compliance_status,
                    compliance_issues: issues,
                    regulatory_checks: checks,
                    verification_status: verification_status(ctx.verification_issues),
                    verification_issues: ctx.verification_issues.to_vec(),
                    review_cycles: cycle,
                    feedback: (!feedback.is_empty()).then(|| feedback.render()),
                };
                return Ok(Generated { body, revision });
            }

            feedback.absorb(&issues, &checks);
        }
    }
}

fn draft_prompt(
    ctx: &GenerationContext<'_>,
    figures: &BTreeMap<&'static str, String>,
    feedback: &Feedback,
) -> String {
    let mut prompt = String::from("Task: draft\n");
    let _ = writeln!(prompt, "Document: {}", ctx.doc_type.title());
    let _ = writeln!(prompt, "Deal: {}", ctx.deal_name);
    let _ = writeln!(prompt, "Program: {}", ctx.program);
    let _ = writeln!(
        prompt,
        "Jurisdiction: {} ({})",
        ctx.jurisdiction.name, ctx.jurisdiction.code
    );
    prompt.push_str(
        "\nWrite the document in Markdown with a level-2 heading for each required section. \
         Never write a number for a figure listed below; write its placeholder token exactly.\n",
    );

    prompt.push_str("\nRequired sections:\n");
    for section in required_sections(ctx.doc_type) {
        let _ = writeln!(prompt, "- {section}");
    }

    prompt.push_str("\nFigures:\n");
    for name in figures.keys() {
        let _ = writeln!(prompt, "- {{{{{name}}}}}");
    }

    if let Value::Object(map) = ctx.dataset.to_json() {
        if !map.is_empty() {
            prompt.push_str("\nVerified data:\n");
            for (key, value) in &map {
                match value {
                    Value::String(s) => {
                        let _ = writeln!(prompt, "- {key}: {s}");
                    }
                    other => {
                        let _ = writeln!(prompt, "- {key}: {other}");
                    }
                }
            }
        }
    }

    if !feedback.is_empty() {
        prompt.push_str("\nFeedback from prior review:\n");
        prompt.push_str(&feedback.render());
    }
    prompt
}
