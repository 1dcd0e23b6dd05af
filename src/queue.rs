//! Edge job queue client.
//!
//! Pulls audit jobs with a visibility-timeout lease and acknowledges
//! them as `done` or `failed`. At-least-once delivery and lease renewal
//! are owned by the remote queue; this client only speaks the pull/ack
//! protocol.
//!
//! Requests authenticate with `Authorization: Bearer <token>`; the token
//! is read from the `AUDITOR_EDGE_TOKEN` environment variable.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::EdgeConfig;
use crate::models::Job;

/// Terminal acknowledgement status for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Done,
    Failed,
}

impl AckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Done => "done",
            AckStatus::Failed => "failed",
        }
    }
}

/// Client for the edge queue's pull/ack API.
pub struct JobClient {
    base_url: String,
    token: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl JobClient {
    /// Create a client from configuration, reading the auth token from
    /// the environment.
    pub fn new(config: &EdgeConfig) -> Result<Self> {
        let token = std::env::var("AUDITOR_EDGE_TOKEN")
            .context("AUDITOR_EDGE_TOKEN environment variable not set")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            max_retries: config.max_retries,
            client,
        })
    }

    /// Pull up to `max` jobs, leased for `visibility_secs`.
    ///
    /// Malformed entries in the response are logged and skipped rather
    /// than failing the whole batch.
    pub async fn pull(&self, max: usize, visibility_secs: u64) -> Result<Vec<Job>> {
        let payload = json!({ "max": max, "visibilitySeconds": visibility_secs });

        debug!(max, "pulling jobs from edge queue");
        let response = self.post_with_retry("/jobs/pull", &payload).await?;

        let mut jobs = Vec::new();
        if let Some(entries) = response["jobs"].as_array() {
            for entry in entries {
                match serde_json::from_value::<Job>(entry.clone()) {
                    Ok(job) => jobs.push(job),
                    Err(e) => {
                        warn!(job = %entry["id"], error = %e, "failed to parse job");
                    }
                }
            }
        }

        info!(count = jobs.len(), "pulled jobs from edge queue");
        Ok(jobs)
    }

    /// Acknowledge jobs as done or failed. A response without
    /// `"success": true` is treated as an error.
    pub async fn ack(&self, ids: &[String], status: AckStatus) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let payload = json!({ "ids": ids, "status": status.as_str() });

        debug!(count = ids.len(), status = status.as_str(), "acknowledging jobs");
        let response = self.post_with_retry("/jobs/ack", &payload).await?;

        if response["success"].as_bool() != Some(true) {
            bail!("ack failed: {}", response);
        }

        info!(count = ids.len(), status = status.as_str(), "acknowledged jobs");
        Ok(())
    }

    async fn post_with_retry(&self, path: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(3));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.context("invalid queue response");
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("queue error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("queue error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("queue request failed: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("queue retries exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_status_labels() {
        assert_eq!(AckStatus::Done.as_str(), "done");
        assert_eq!(AckStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_malformed_jobs_are_skipped() {
        let response = json!({
            "jobs": [
                { "id": "j1", "runId": "r1", "tenantId": "t1", "r2Key": "a.pdf" },
                { "id": "j2" },
                { "id": "j3", "runId": "r3", "tenantId": "t3", "r2Key": "b.pdf", "attempts": 2 },
            ]
        });

        let jobs: Vec<Job> = response["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| serde_json::from_value(e.clone()).ok())
            .collect();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].run_id, "r1");
        assert_eq!(jobs[1].attempts, 2);
    }
}
