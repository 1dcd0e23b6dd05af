//! Markdown audit report rendering.
//!
//! The analyze stage asks the model for a structured audit-report JSON.
//! When that JSON parses and carries the expected report body, a
//! professional report is rendered from it; otherwise the renderer falls
//! back to a simple layout listing the deterministic findings directly.
//! Either way the output is a self-contained Markdown document uploaded
//! next to the source document.

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::models::RunState;

/// Render the Markdown report for a completed run.
pub fn generate_markdown_report(state: &RunState) -> String {
    if let Some(summary) = state.summary.as_deref() {
        if summary.trim_start().starts_with('{') {
            match serde_json::from_str::<Value>(summary) {
                Ok(audit) => {
                    if let Some(report) = render_professional_report(&audit, state) {
                        return report;
                    }
                    warn!(run_id = %state.run_id, "audit JSON missing report fields, using simple format");
                }
                Err(e) => {
                    warn!(run_id = %state.run_id, error = %e, "failed to parse audit JSON, using simple format");
                }
            }
        }
    }

    render_simple_report(state)
}

/// Render the professional layout from the model's audit JSON.
///
/// Returns `None` when a required section is absent, so the caller can
/// fall back to the simple layout.
fn render_professional_report(audit: &Value, state: &RunState) -> Option<String> {
    let report = &audit["report"];
    let title = report["title"].as_str()?;
    let addressee = report["addressee"].as_str()?;
    let opinion = report["opinion_section"]["opinion_text"].as_str()?;

    let standards = report["basis_for_opinion"]["standards_referenced"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let company = report["entity_information"]["company_name"]
        .as_str()
        .unwrap_or("the entity");

    let mut out = format!(
        "# {title}\n\n{addressee}\n\n## Opinion\n\n{opinion}\n\n## Basis for Opinion\n\n\
         We conducted our audit in accordance with {standards}. Our responsibilities under \
         those standards are further described in the Auditor's Responsibilities section of \
         our report. We are required to be independent of {company} and to meet our other \
         ethical responsibilities, in accordance with the relevant ethical requirements.\n\n\
         We believe that the audit evidence we have obtained is sufficient and appropriate \
         to provide a basis for our opinion.\n\n"
    );

    if report["key_audit_matters"]["is_applicable"].as_bool() == Some(true) {
        out.push_str("## Key Audit Matters\n\n");
        if let Some(matters) = report["key_audit_matters"]["matters"].as_array() {
            for matter in matters {
                let matter_title = matter["title"].as_str().unwrap_or("Matter");
                out.push_str(&format!("### {}\n\n", matter_title));
                if let Some(why) = matter["why_significant"].as_str() {
                    out.push_str(&format!("**Why significant:** {}\n\n", why));
                }
                if let Some(how) = matter["how_addressed"].as_str() {
                    out.push_str(&format!("**How we addressed it:** {}\n\n", how));
                }
            }
        }
    }

    let responsibilities =
        &report["responsibilities_of_management_and_those_charged_with_governance"];
    out.push_str("## Responsibilities of Management and Those Charged with Governance\n\n");
    for field in ["management_responsibilities", "governance_responsibilities"] {
        if let Some(text) = responsibilities[field].as_str() {
            out.push_str(text);
            out.push_str("\n\n");
        }
    }

    out.push_str("## Auditor's Responsibilities\n\n");
    if let Some(sections) = report["auditor_responsibilities"].as_object() {
        for text in sections.values().filter_map(|v| v.as_str()) {
            out.push_str(text);
            out.push_str("\n\n");
        }
    }

    for (section, heading) in [
        ("emphasis_of_matter", "## Emphasis of Matter"),
        ("other_matter", "## Other Matter"),
    ] {
        if report[section]["present"].as_bool() == Some(true) {
            out.push_str(heading);
            out.push_str("\n\n");
            if let Some(paragraphs) = report[section]["paragraphs"].as_array() {
                for paragraph in paragraphs.iter().filter_map(|p| p.as_str()) {
                    out.push_str(paragraph);
                    out.push_str("\n\n");
                }
            }
        }
    }

    let signoff = &report["signoff"];
    out.push_str(&format!(
        "---\n\n**{}**  \n{}  \n{}\n\n{}\n\n",
        signoff["auditor_firm_name"].as_str().unwrap_or("Auditor Agent"),
        signoff["city_state"].as_str().unwrap_or(""),
        signoff["report_date"].as_str().unwrap_or(""),
        signoff["partner_signature_block"].as_str().unwrap_or("")
    ));

    out.push_str(&technical_details(state));
    Some(out)
}

/// Simple fallback layout: run header, executive summary, and the raw
/// findings list.
fn render_simple_report(state: &RunState) -> String {
    let mut out = format!(
        "# Audit Report\n\n**Run ID:** {}  \n**Tenant ID:** {}  \n**Source:** {}  \n\
         **Generated:** {}\n\n---\n\n## Executive Summary\n\n{}\n\n---\n\n## Findings ({})\n\n",
        state.run_id,
        state.tenant_id,
        state.object_key,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        state.summary.as_deref().unwrap_or("No summary available."),
        state.findings.len()
    );

    if state.findings.is_empty() {
        out.push_str("_No significant findings detected._\n\n");
    } else {
        for (i, finding) in state.findings.iter().enumerate() {
            out.push_str(&format!(
                "### {}. {} [{}]\n\n**Code:** {}  \n**Details:** {}\n\n",
                i + 1,
                finding.title,
                finding.severity.as_str().to_uppercase(),
                finding.code,
                finding.detail
            ));
        }
    }

    out.push_str("---\n\n");
    out.push_str(&technical_details(state));
    out
}

fn technical_details(state: &RunState) -> String {
    format!(
        "## Analysis Metadata\n\n- **Text Chunks:** {}\n- **Vectors Indexed:** {}\n\
         - **Transactions Reviewed:** {}\n- **MIME Type:** {}\n\n---\n\n\
         _Generated by Auditor Agent_\n",
        state.chunks.len(),
        state.vector_ids.len(),
        state.txns.len(),
        state.mime_type.as_deref().unwrap_or("unknown")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Finding, Severity};

    fn base_state() -> RunState {
        RunState {
            run_id: "run-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            object_key: "uploads/ledger.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_report_without_findings() {
        let report = generate_markdown_report(&base_state());
        assert!(report.starts_with("# Audit Report"));
        assert!(report.contains("No significant findings detected."));
        assert!(report.contains("**Run ID:** run-1"));
        assert!(report.contains("Generated by Auditor Agent"));
    }

    #[test]
    fn test_simple_report_lists_findings() {
        let mut state = base_state();
        state.findings.push(Finding {
            code: "ROUND_NUMBER".to_string(),
            severity: Severity::Low,
            title: "Suspiciously Round Amount".to_string(),
            detail: "Transaction txn_0 has a round amount of $1000.00.".to_string(),
            transaction_ids: vec!["txn_0".to_string()],
        });

        let report = generate_markdown_report(&state);
        assert!(report.contains("## Findings (1)"));
        assert!(report.contains("### 1. Suspiciously Round Amount [LOW]"));
        assert!(report.contains("$1000.00"));
    }

    #[test]
    fn test_unparseable_summary_falls_back_to_simple() {
        let mut state = base_state();
        state.summary = Some("{not valid json".to_string());
        let report = generate_markdown_report(&state);
        assert!(report.starts_with("# Audit Report"));
    }

    #[test]
    fn test_plain_text_summary_embedded_in_simple_report() {
        let mut state = base_state();
        state.summary = Some("Everything looks fine.".to_string());
        let report = generate_markdown_report(&state);
        assert!(report.contains("Everything looks fine."));
    }

    #[test]
    fn test_professional_report_rendered_from_audit_json() {
        let mut state = base_state();
        state.summary = Some(
            serde_json::json!({
                "report": {
                    "title": "Independent Auditor's Report",
                    "addressee": "To the Board of Directors",
                    "opinion_section": { "opinion_text": "In our opinion, the statements present fairly." },
                    "basis_for_opinion": { "standards_referenced": ["U.S. GAAS"] },
                    "entity_information": { "company_name": "Document Entity" },
                    "key_audit_matters": { "is_applicable": false },
                    "signoff": {
                        "auditor_firm_name": "Auditor Agent",
                        "city_state": "San Francisco, CA",
                        "report_date": "2024-12-31",
                        "partner_signature_block": "AI Auditor"
                    }
                }
            })
            .to_string(),
        );

        let report = generate_markdown_report(&state);
        assert!(report.starts_with("# Independent Auditor's Report"));
        assert!(report.contains("## Opinion"));
        assert!(report.contains("U.S. GAAS"));
        assert!(!report.contains("## Key Audit Matters"));
        assert!(report.contains("Analysis Metadata"));
    }

    #[test]
    fn test_audit_json_missing_fields_falls_back() {
        let mut state = base_state();
        state.summary = Some(r#"{"report": {"title": "Only a title"}}"#.to_string());
        let report = generate_markdown_report(&state);
        assert!(report.starts_with("# Audit Report"));
    }
}
