//! Audit pipeline orchestration.
//!
//! Runs the linear stage sequence for one document:
//!
//! ```text
//! ingest → extract → chunk → embed → index → checks → analyze → report → persist
//! ```
//!
//! Every stage except `checks` is a thin call into an external service
//! (blob store, LLM gateway, edge worker); `checks` is the in-process
//! deterministic core. A failing stage records its error on the
//! [`RunState`] and emits an error event; subsequent stages skip their
//! work, and `persist` always runs so the run's terminal status lands in
//! the relational store either way.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::blobstore::{detect_content_type, BlobStore};
use crate::checks::{run_all_checks, CheckParams};
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::edge::EdgeClient;
use crate::extract::extract_transactions;
use crate::gateway::GatewayClient;
use crate::models::RunState;
use crate::report::generate_markdown_report;

/// Pipeline with its external clients, built once and reused across jobs.
pub struct Pipeline {
    blob: BlobStore,
    gateway: GatewayClient,
    edge: EdgeClient,
    check_params: CheckParams,
    chunk_chars: usize,
    overlap_chars: usize,
}

impl Pipeline {
    /// Initialize all clients from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            blob: BlobStore::new(&config.storage)?,
            gateway: GatewayClient::new(&config.gateway)?,
            edge: EdgeClient::new(&config.edge)?,
            check_params: CheckParams {
                round_threshold: config.checks.round_threshold,
                round_min_amount: config.checks.round_min_amount,
            },
            chunk_chars: config.chunking.chunk_chars,
            overlap_chars: config.chunking.overlap_chars,
        })
    }

    /// Run the full pipeline for one job, returning the final state.
    pub async fn run(&self, mut state: RunState) -> RunState {
        info!(run_id = %state.run_id, "starting pipeline");

        self.ingest(&mut state).await;
        self.extract(&mut state).await;
        self.chunk(&mut state).await;
        self.embed(&mut state).await;
        self.index(&mut state).await;
        self.checks(&mut state).await;
        self.analyze(&mut state).await;
        self.report(&mut state).await;
        self.persist(&mut state).await;

        match &state.error {
            None => info!(run_id = %state.run_id, "pipeline completed"),
            Some(e) => error!(run_id = %state.run_id, error = %e, "pipeline failed"),
        }
        state
    }

    /// Record a stage failure on the state and emit an error event.
    async fn fail(&self, state: &mut RunState, message: String) {
        error!(run_id = %state.run_id, "{}", message);
        self.edge.emit_event(&state.run_id, "error", &message, None).await;
        state.error = Some(message);
    }

    /// Download the document from the blob store and resolve its MIME type.
    async fn ingest(&self, state: &mut RunState) {
        info!(run_id = %state.run_id, "starting ingest phase");
        self.edge
            .emit_event(&state.run_id, "info", "Downloading file from storage", None)
            .await;

        let bytes = match self.blob.get_object(&state.object_key).await {
            Ok(b) => b,
            Err(e) => return self.fail(state, format!("Ingest failed: {e}")).await,
        };

        // MIME type from object metadata, falling back to the extension.
        let mime_type = match self.blob.head_object(&state.object_key).await {
            Ok(meta) => meta
                .content_type
                .unwrap_or_else(|| detect_content_type(&state.object_key)),
            Err(_) => detect_content_type(&state.object_key),
        };

        info!(run_id = %state.run_id, bytes = bytes.len(), mime_type = %mime_type, "downloaded document");
        self.edge
            .emit_event(
                &state.run_id,
                "info",
                &format!("File downloaded: {} bytes", bytes.len()),
                Some(json!({ "mime_type": mime_type })),
            )
            .await;

        state.mime_type = Some(mime_type);
        state.file_bytes = Some(bytes);
    }

    /// Extract text from the document via the multimodal model.
    async fn extract(&self, state: &mut RunState) {
        if state.error.is_some() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Extracting text from document", None)
            .await;

        if state.file_bytes.is_none() {
            return self
                .fail(state, "Text extraction failed: no file bytes available".to_string())
                .await;
        }
        let file_bytes = state.file_bytes.as_deref().unwrap_or_default();
        let mime_type = state.mime_type.as_deref().unwrap_or("application/pdf");

        match self.gateway.extract_text(file_bytes, mime_type).await {
            Ok(text) => {
                self.edge
                    .emit_event(
                        &state.run_id,
                        "info",
                        &format!("Text extracted: {} characters", text.len()),
                        None,
                    )
                    .await;
                state.raw_text = Some(text);
                // Raw bytes are no longer needed; free them.
                state.file_bytes = None;
            }
            Err(e) => self.fail(state, format!("Text extraction failed: {e}")).await,
        }
    }

    /// Split the extracted text into overlapping chunks for embedding.
    async fn chunk(&self, state: &mut RunState) {
        if state.error.is_some() || state.raw_text.is_none() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Chunking text", None)
            .await;

        let text = state.raw_text.as_deref().unwrap_or_default();
        state.chunks = chunk_text(text, self.chunk_chars, self.overlap_chars);

        info!(run_id = %state.run_id, chunks = state.chunks.len(), "chunking complete");
        self.edge
            .emit_event(
                &state.run_id,
                "info",
                &format!("Created {} text chunks", state.chunks.len()),
                None,
            )
            .await;
    }

    /// Generate embeddings for all chunks.
    async fn embed(&self, state: &mut RunState) {
        if state.error.is_some() || state.chunks.is_empty() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Generating embeddings", None)
            .await;

        match self.gateway.embed_texts(&state.chunks).await {
            Ok(embeddings) => {
                state.vector_ids = (0..state.chunks.len())
                    .map(|i| format!("run:{}:ch:{}", state.run_id, i))
                    .collect();
                self.edge
                    .emit_event(
                        &state.run_id,
                        "info",
                        &format!("Generated {} embeddings", embeddings.len()),
                        None,
                    )
                    .await;
                state.embeddings = embeddings;
            }
            Err(e) => self.fail(state, format!("Embedding failed: {e}")).await,
        }
    }

    /// Upsert chunk vectors into the index with per-chunk metadata.
    async fn index(&self, state: &mut RunState) {
        if state.error.is_some() || state.embeddings.is_empty() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Indexing vectors", None)
            .await;

        let metadatas: Vec<Value> = state
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                json!({
                    "run_id": state.run_id,
                    "tenant_id": state.tenant_id,
                    "chunk_index": i,
                    "text_preview": chunk.chars().take(100).collect::<String>(),
                })
            })
            .collect();

        match self
            .edge
            .vector_upsert(&state.vector_ids, &state.embeddings, &metadatas)
            .await
        {
            Ok(()) => {
                self.edge
                    .emit_event(
                        &state.run_id,
                        "info",
                        &format!("Indexed {} vectors", state.vector_ids.len()),
                        None,
                    )
                    .await;
            }
            Err(e) => self.fail(state, format!("Indexing failed: {e}")).await,
        }
    }

    /// Extract transactions from the raw text and run the deterministic
    /// audit checks over them.
    async fn checks(&self, state: &mut RunState) {
        if state.error.is_some() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Running audit checks", None)
            .await;

        state.txns = extract_transactions(state.raw_text.as_deref().unwrap_or_default());
        state.findings = run_all_checks(&state.txns, &self.check_params);

        info!(
            run_id = %state.run_id,
            txns = state.txns.len(),
            findings = state.findings.len(),
            "audit checks complete"
        );
        self.edge
            .emit_event(
                &state.run_id,
                "info",
                &format!("Audit checks complete: {} findings", state.findings.len()),
                None,
            )
            .await;
    }

    /// Ask the model to synthesize a structured audit report from the
    /// findings.
    async fn analyze(&self, state: &mut RunState) {
        if state.error.is_some() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Analyzing findings", None)
            .await;

        let prompt = build_analysis_prompt(state);
        match self.gateway.chat(&prompt).await {
            Ok(summary) => {
                self.edge
                    .emit_event(&state.run_id, "info", "Analysis complete", None)
                    .await;
                state.summary = Some(summary);
            }
            Err(e) => self.fail(state, format!("Analysis failed: {e}")).await,
        }
    }

    /// Render the Markdown report and upload it to the blob store.
    async fn report(&self, state: &mut RunState) {
        if state.error.is_some() {
            return;
        }
        self.edge
            .emit_event(&state.run_id, "info", "Generating report", None)
            .await;

        let report_md = generate_markdown_report(state);
        let report_key = format!("reports/{}/{}/report.md", state.tenant_id, state.run_id);

        match self
            .blob
            .put_object(&report_key, report_md.into_bytes(), "text/markdown")
            .await
        {
            Ok(()) => {
                self.edge
                    .emit_event(
                        &state.run_id,
                        "info",
                        &format!("Report uploaded: {report_key}"),
                        None,
                    )
                    .await;
                state.report_key = Some(report_key);
            }
            Err(e) => self.fail(state, format!("Report generation failed: {e}")).await,
        }
    }

    /// Persist findings and the run's terminal status. Always runs, even
    /// after an earlier stage failure, so the run never stays in-flight.
    async fn persist(&self, state: &mut RunState) {
        self.edge
            .emit_event(&state.run_id, "info", "Saving results", None)
            .await;

        let now = chrono::Utc::now().timestamp();
        for i in 0..state.findings.len() {
            let finding = state.findings[i].clone();
            let finding_id = format!("finding_{}_{}_{}", state.run_id, i, now);
            if let Err(e) = self
                .edge
                .insert_finding(
                    &finding_id,
                    &state.run_id,
                    &finding.code,
                    finding.severity.as_str(),
                    &finding.title,
                    &finding.detail,
                    None,
                )
                .await
            {
                // Record the failure but keep going: the status update
                // below still runs so the run reaches a terminal state.
                self.fail(state, format!("Persist failed: {e}")).await;
                break;
            }
        }

        let final_status = terminal_status(&state.error);
        if let Err(e) = self.edge.update_run_status(&state.run_id, final_status).await {
            return self.fail(state, format!("Persist failed: {e}")).await;
        }

        self.edge
            .emit_event(
                &state.run_id,
                "info",
                "Audit complete",
                Some(json!({
                    "summary": state.summary,
                    "report_key": state.report_key,
                    "findings_count": state.findings.len(),
                })),
            )
            .await;

        info!(run_id = %state.run_id, status = final_status, "results persisted");
    }
}

/// Terminal run status recorded by the persist stage.
fn terminal_status(error: &Option<String>) -> &'static str {
    if error.is_none() {
        "done"
    } else {
        "error"
    }
}

/// Build the report-synthesis prompt: audit engagement context plus the
/// deterministic findings, with instructions to return a single JSON
/// object describing a professional audit report.
fn build_analysis_prompt(state: &RunState) -> String {
    let findings_text = if state.findings.is_empty() {
        "No significant findings detected.".to_string()
    } else {
        state
            .findings
            .iter()
            .map(|f| {
                format!(
                    "- {}: {} - {}",
                    f.severity.as_str().to_uppercase(),
                    f.title,
                    f.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let has_high = state.findings.iter().any(|f| f.severity.as_str() == "high");
    let misstatements = if state.findings.is_empty() {
        "none"
    } else if state.findings.len() < 3 {
        "material_not_pervasive"
    } else {
        "material_pervasive"
    };
    let going_concern = state
        .findings
        .iter()
        .any(|f| f.title.to_lowercase().contains("going concern"));
    let key_audit_matters: Vec<Value> = state
        .findings
        .iter()
        .filter(|f| f.severity.as_str() == "high")
        .map(|f| {
            json!({
                "title": f.title,
                "why_significant": f.detail,
                "how_addressed": "Document review and analysis procedures",
            })
        })
        .collect();

    let audit_context = json!({
        "company_name": "Document Entity",
        "jurisdiction": "United States",
        "entity_type": "Private",
        "listing_status": "Non-issuer",
        "industry": "General Business",
        "financial_reporting_framework": "U.S. GAAP",
        "engagement_type": "External financial statement audit",
        "period_end": "2024-12-31",
        "scope_limitations": has_high,
        "identified_misstatements": misstatements,
        "going_concern_uncertainty": going_concern,
        "key_audit_matters_input": key_audit_matters,
        "other_information_present": false,
        "legal_regulatory_requirements": [],
        "auditor_firm_name": "Auditor Agent",
        "auditor_city_state": "San Francisco, CA",
        "auditor_partner_name": "AI Auditor",
        "report_date": chrono::Utc::now().format("%Y-%m-%d").to_string(),
    });

    format!(
        "SYSTEM:\n\
You are an expert independent auditor. Your job is to (A) determine the proper auditing \
STANDARD and OPINION TYPE from the inputs, then (B) return ONE JSON object that fully \
represents a professional audit report.\n\n\
Follow these rules:\n\
1) Determine FIRST:\n\
   - If the entity is a U.S. public company (issuer), use PCAOB standards.\n\
   - If the entity is a U.S. private company (non-issuer), use U.S. GAAS (AICPA AU-C).\n\
   - If the engagement is international (non-U.S.), use ISA (IAASB).\n\n\
2) Determine OPINION TYPE:\n\
   - Unmodified/Clean: sufficient appropriate evidence; no material misstatement.\n\
   - Qualified: material but not pervasive misstatement OR scope limitation.\n\
   - Adverse: pervasive material misstatement.\n\
   - Disclaimer: pervasive scope limitation / insufficient evidence to opine.\n\n\
3) Output ONLY valid JSON (UTF-8). No extra text. No markdown. No commentary.\n\n\
4) The JSON MUST include: determination (what standard/opinion you chose and why), \
report (full report body), and machine_readable_summary_for_automation (flags).\n\n\
5) Use the following section structure in the report: Title & Addressee, Opinion, \
Basis for Opinion, (optional) Key Audit Matters, Responsibilities of Management & \
Governance, Auditor's Responsibilities, (conditional) Emphasis of Matter, (conditional) \
Other Matter, Signature/Sign-off.\n\n\
6) Keep wording professional and compliant with GAAS / PCAOB / ISA conventions. Use the \
reporting framework exactly as provided.\n\n\
USER INPUT (JSON):\n{}\n\n\
AUDIT FINDINGS FROM DOCUMENT ANALYSIS:\n{}\n\n\
Document analyzed: {} sections, {} transactions reviewed.\n\n\
OUTPUT ONLY THE JSON OBJECT (fill all applicable fields; omit arrays if empty):",
        serde_json::to_string_pretty(&audit_context).unwrap_or_default(),
        findings_text,
        state.chunks.len(),
        state.txns.len()
    )
}
