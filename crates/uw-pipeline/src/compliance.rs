//! Model-backed compliance review.
//!
//! The reviewer is a second, independent model call that reads a finished
//! draft against the regulations that apply to its document type, program
//! and jurisdiction. It never fails the pipeline: a provider error or an
//! unreadable verdict becomes a single high-severity issue so the document
//! goes back for another cycle or to a human.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use uw_core::entities::ComplianceIssue;
use uw_core::enums::{ComplianceSeverity, GeneratedDocType, Program};
use uw_llm::Generative;
use uw_rules::Jurisdiction;
use uw_rules::format::percent;

use crate::json::parse_json_object;

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    issues: Vec<ComplianceIssue>,
}

/// Rules the reviewer is asked to hold a document to.
#[must_use]
pub fn regulations(
    doc_type: GeneratedDocType,
    program: Program,
    jurisdiction: &Jurisdiction,
) -> Vec<String> {
    let mut rules = Vec::new();
    match doc_type {
        GeneratedDocType::TermSheet
        | GeneratedDocType::LoanAgreement
        | GeneratedDocType::PromissoryNote => {
            rules.push("Truth in Lending: the interest rate, fees and repayment schedule are disclosed clearly and consistently".to_string());
            rules.push("Commercial purpose: the loan is stated to be for business or investment purposes".to_string());
        }
        GeneratedDocType::PrivatePlacementMemorandum | GeneratedDocType::SubscriptionAgreement => {
            rules.push("Regulation D Rule 506(b): offering limited to accredited investors, no general solicitation".to_string());
            rules.push("Anti-fraud: material risks are disclosed and projections are labelled as such".to_string());
        }
        GeneratedDocType::ComplianceReport | GeneratedDocType::CreditMemo => {
            rules.push("Findings are supported by the verified figures and cite their source".to_string());
        }
    }
    if program == Program::Sba7a {
        rules.push("SBA 7(a): guaranty, eligible use of proceeds and personal guarantees are described".to_string());
    }
    match jurisdiction.usury_cap {
        Some(cap) => rules.push(format!(
            "{} usury law: the stated rate must not exceed {}",
            jurisdiction.name,
            percent(cap, 3)
        )),
        None => rules.push(format!(
            "{} has no statutory usury ceiling for this loan class; do not cite one",
            jurisdiction.name
        )),
    }
    rules.push(format!(
        "{} withholding at {} is disclosed where distributions or interest are paid",
        jurisdiction.name,
        percent(jurisdiction.withholding_rate, 2)
    ));
    rules
}

pub struct ComplianceReviewer {
    generative: Arc<dyn Generative>,
    max_tokens: u32,
}

impl ComplianceReviewer {
    #[must_use]
    pub fn new(generative: Arc<dyn Generative>, max_tokens: u32) -> Self {
        Self {
            generative,
            max_tokens,
        }
    }

    /// Review `body`. Always returns; see the module docs.
    pub async fn review(
        &self,
        doc_type: GeneratedDocType,
        program: Program,
        jurisdiction: &Jurisdiction,
        body: &str,
    ) -> Vec<ComplianceIssue> {
        let prompt = review_prompt(doc_type, &regulations(doc_type, program, jurisdiction), body);
        match self.generative.complete(&prompt, self.max_tokens).await {
            Ok(reply) => parse_verdict(&reply).unwrap_or_else(|reason| {
                tracing::warn!(%doc_type, %reason, "unreadable compliance verdict");
                vec![reviewer_issue(format!("compliance verdict could not be read: {reason}"))]
            }),
            Err(e) => {
                tracing::warn!(%doc_type, error = %e, "compliance review unavailable");
                vec![reviewer_issue(format!("compliance review unavailable: {e}"))]
            }
        }
    }
}

fn reviewer_issue(description: String) -> ComplianceIssue {
    ComplianceIssue {
        severity: ComplianceSeverity::High,
        section: "review".into(),
        description,
        recommendation: Some("review this document manually".into()),
    }
}

fn review_prompt(doc_type: GeneratedDocType, regulations: &[String], body: &str) -> String {
    let mut prompt = String::from("Task: compliance_review\n");
    let _ = writeln!(prompt, "Document: {}", doc_type.title());
    prompt.push_str("Review the document against each rule below.\n");
    for rule in regulations {
        let _ = writeln!(prompt, "- {rule}");
    }
    prompt.push_str(
        "Respond with JSON only: {\"issues\": [{\"severity\": \"low|medium|high|critical\", \
         \"section\": \"...\", \"description\": \"...\", \"recommendation\": \"...\"}]}. \
         Use an empty list when the document complies.\n\nDocument:\n",
    );
    prompt.push_str(body);
    prompt
}

fn parse_verdict(reply: &str) -> Result<Vec<ComplianceIssue>, String> {
    let map = parse_json_object(reply)?;
    let verdict: Verdict = serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| format!("unexpected verdict shape: {e}"))?;
    Ok(verdict.issues)
}
