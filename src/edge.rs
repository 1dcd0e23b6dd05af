//! Edge worker API client (data plane).
//!
//! The edge worker fronts the vector index and the relational store
//! behind a small authenticated HTTP API. This client covers the calls
//! the pipeline makes per run:
//!
//! | Method | Endpoint | Purpose |
//! |--------|----------|---------|
//! | `vector_upsert` | `POST /vector/upsert` | Index chunk embeddings |
//! | `d1_query` | `POST /d1/query` | Whitelisted relational queries |
//! | `emit_event` | (via `d1_query`) | Append a run event row |
//! | `insert_finding` | (via `d1_query`) | Persist one finding |
//! | `update_run_status` | (via `d1_query`) | Mark a run done/error |
//!
//! Requests authenticate with an `X-Server-Auth` header; the token is
//! read from the `AUDITOR_EDGE_TOKEN` environment variable. Transient
//! failures (429/5xx/network) are retried with exponential backoff.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EdgeConfig;

/// Client for the edge worker's vector and relational endpoints.
pub struct EdgeClient {
    base_url: String,
    token: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl EdgeClient {
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

    /// Upsert chunk vectors into the index, with one metadata object per
    /// vector.
    pub async fn vector_upsert(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Value],
    ) -> Result<()> {
        let payload = json!({
            "ids": ids,
            "vectors": vectors,
            "metadatas": metadatas,
        });

        debug!(count = ids.len(), "upserting vectors");
        self.post_with_retry("/vector/upsert", &payload).await?;
        info!(count = ids.len(), "upserted vectors");
        Ok(())
    }

    /// Execute a whitelisted relational query by name.
    pub async fn d1_query(&self, name: &str, params: Vec<Value>) -> Result<Value> {
        let payload = json!({ "name": name, "params": params });

        debug!(query = name, "executing d1 query");
        self.post_with_retry("/d1/query", &payload).await
    }

    /// Append a run event row. Event emission is telemetry: failures are
    /// logged and swallowed so they never fail the run.
    pub async fn emit_event(&self, run_id: &str, level: &str, message: &str, data: Option<Value>) {
        let event_id = format!(
            "evt_{}_{}",
            chrono::Utc::now().timestamp(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let data_json = data.unwrap_or_else(|| json!({})).to_string();

        let result = self
            .d1_query(
                "insert_event",
                vec![
                    json!(event_id),
                    json!(run_id),
                    json!(level),
                    json!(message),
                    json!(data_json),
                ],
            )
            .await;

        match result {
            Ok(_) => debug!(run_id, message, "emitted event"),
            Err(e) => warn!(run_id, error = %e, "failed to emit event"),
        }
    }

    /// Persist one finding row for a run.
    pub async fn insert_finding(
        &self,
        finding_id: &str,
        run_id: &str,
        code: &str,
        severity: &str,
        title: &str,
        detail: &str,
        evidence_key: Option<&str>,
    ) -> Result<()> {
        self.d1_query(
            "insert_finding",
            vec![
                json!(finding_id),
                json!(run_id),
                json!(code),
                json!(severity),
                json!(title),
                json!(detail),
                json!(evidence_key.unwrap_or("")),
            ],
        )
        .await?;

        info!(finding_id, run_id, "inserted finding");
        Ok(())
    }

    /// Update a run's status (`done` or `error`).
    pub async fn update_run_status(&self, run_id: &str, status: &str) -> Result<()> {
        self.d1_query("update_status", vec![json!(run_id), json!(status)])
            .await?;
        info!(run_id, status, "updated run status");
        Ok(())
    }

    /// POST a JSON payload with exponential-backoff retry for transient
    /// failures (429/5xx/network); other client errors fail immediately.
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
                .header("X-Server-Auth", &self.token)
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.context("invalid edge response");
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("edge error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("edge error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("edge request failed: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("edge retries exhausted")))
    }
}
