//! # Auditor Agent
//!
//! A document-audit worker. It pulls jobs referencing uploaded documents,
//! extracts their text through a multimodal model, indexes the content
//! for retrieval, extracts transaction-like records, runs deterministic
//! fraud/anomaly checks over them, synthesizes a narrative audit report,
//! and persists findings and the report artifact.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────────────────────────────────────┐
//! │ Edge Queue │──▶│ ingest → extract → chunk → embed → index   │
//! │ pull / ack │   │   → checks → analyze → report → persist    │
//! └───────────┘   └──────┬──────────────┬──────────────┬───────┘
//!                        ▼              ▼              ▼
//!                  ┌──────────┐   ┌──────────┐   ┌──────────┐
//!                  │ Blob     │   │ LLM      │   │ Edge API │
//!                  │ Store    │   │ Gateway  │   │ (vec+db) │
//!                  └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! Every pipeline stage except `checks` is a thin HTTP call with
//! retry-on-transient wrapping. The `checks` stage — regex transaction
//! extraction plus the deterministic rule battery — is the only
//! in-process algorithmic core, and is pure and synchronous.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types (transactions, findings, run state) |
//! | [`extract`] | Regex-based transaction extraction |
//! | [`checks`] | Deterministic audit rules |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`blobstore`] | S3-compatible object storage client |
//! | [`gateway`] | LLM gateway client (extraction, embeddings, chat) |
//! | [`edge`] | Edge worker data-plane client |
//! | [`queue`] | Job queue pull/ack client |
//! | [`pipeline`] | Stage orchestration |
//! | [`report`] | Markdown report rendering |
//! | [`server`] | Health check HTTP endpoint |
//! | [`worker`] | Pull loop and shutdown handling |

pub mod blobstore;
pub mod checks;
pub mod chunk;
pub mod config;
pub mod edge;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod server;
pub mod worker;
