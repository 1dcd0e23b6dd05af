//! Core data models used throughout the auditor agent.
//!
//! These types represent the jobs, transactions, findings, and per-run
//! state that flow through the audit pipeline.

use serde::{Deserialize, Serialize};

/// A single financial line item inferred from document text.
///
/// Created once per run by the extractor (or supplied directly by a
/// caller), immutable afterwards, and consumed read-only by every audit
/// rule. Only derived [`Finding`]s are persisted; transactions are
/// discarded at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Txn {
    /// Unique within a run, assigned in extraction order (`txn_0`, `txn_1`, ...).
    pub id: String,
    /// Signed amount, currency-agnostic. Always finite; candidates with
    /// unparseable amounts are dropped at extraction time.
    pub amount: f64,
    /// Free-form date string as captured from the source text. Not
    /// normalized; rules that need calendar semantics parse on demand.
    pub date: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

/// Severity of a finding. Fixed per rule, not computed dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lowercase label matching the serialized form (`"low"`, `"medium"`, `"high"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// An anomaly detected by an audit rule.
///
/// The serialized shape is consumed by the downstream report renderer
/// and persistence stage and must stay exactly:
///
/// ```json
/// { "code": "...", "severity": "low", "title": "...",
///   "detail": "...", "transaction_ids": ["txn_0"] }
/// ```
///
/// `detail` is a fully rendered human-readable explanation embedding the
/// evidentiary values (amounts, dates, vendors, transaction ids) — it is
/// the artifact surfaced in the final report. Findings are never mutated
/// after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    /// Ids of the transactions that triggered the finding, in the order
    /// the records appear in the input sequence.
    pub transaction_ids: Vec<String>,
}

/// A job pulled from the edge queue.
///
/// Field names on the wire are camelCase (`runId`, `tenantId`, `r2Key`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub run_id: String,
    pub tenant_id: String,
    pub r2_key: String,
    #[serde(default)]
    pub attempts: u32,
}

/// Mutable state for a single audit run, threaded through the pipeline.
///
/// Each stage reads the fields produced by earlier stages and writes its
/// own. A stage that fails records `error` instead of aborting the
/// process; later stages (except persist) skip their work once `error`
/// is set.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub run_id: String,
    pub tenant_id: String,
    /// Key of the uploaded document in the blob store.
    pub object_key: String,
    pub mime_type: Option<String>,
    pub file_bytes: Option<Vec<u8>>,
    pub raw_text: Option<String>,
    pub chunks: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub vector_ids: Vec<String>,
    pub txns: Vec<Txn>,
    pub findings: Vec<Finding>,
    /// LLM-generated audit report (JSON string on the happy path).
    pub summary: Option<String>,
    /// Blob store key of the rendered Markdown report.
    pub report_key: Option<String>,
    pub error: Option<String>,
}

impl RunState {
    /// Initial state for a job pulled from the queue.
    pub fn from_job(job: &Job) -> Self {
        Self {
            run_id: job.run_id.clone(),
            tenant_id: job.tenant_id.clone(),
            object_key: job.r2_key.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_serializes_exact_shape() {
        let finding = Finding {
            code: "ROUND_NUMBER".to_string(),
            severity: Severity::Low,
            title: "Suspiciously Round Amount".to_string(),
            detail: "Transaction txn_0 has a round amount of $1000.00.".to_string(),
            transaction_ids: vec!["txn_0".to_string()],
        };

        let value = serde_json::to_value(&finding).unwrap();
        assert_eq!(value["code"], "ROUND_NUMBER");
        assert_eq!(value["severity"], "low");
        assert_eq!(value["transaction_ids"], serde_json::json!(["txn_0"]));
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_job_parses_camel_case() {
        let job: Job = serde_json::from_str(
            r#"{"id":"job-1","runId":"run-1","tenantId":"t-1","r2Key":"uploads/a.pdf"}"#,
        )
        .unwrap();
        assert_eq!(job.run_id, "run-1");
        assert_eq!(job.r2_key, "uploads/a.pdf");
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::Medium.as_str(), "medium");
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
    }
}
