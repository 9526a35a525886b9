//! GitHub Billing Exporter
//!
//! A Prometheus exporter for GitHub organization billing. Every scrape fans
//! out over a set of named collectors, each of which queries one billing
//! subsystem for every configured organization concurrently.
//!
//! # Architecture
//!
//! ```text
//! CollectorRegistry ──instantiate──▶ BillingCollector ──collect──▶ Snapshot
//!                                        │                          │
//!                                        ▼                          ▼
//!                                  BillingApi (GitHub)        /metrics (hyper)
//! ```
//!
//! # Modules
//!
//! - [`collector`] - Collector trait, built-in collectors and the aggregator
//! - [`config`] - Command line and environment configuration
//! - [`error`] - Error types
//! - [`github`] - GitHub billing API port and reqwest client
//! - [`server`] - HTTP exposition server

pub mod collector;
pub mod config;
pub mod error;
pub mod github;
pub mod server;

// Re-export commonly used types
pub use collector::{BillingCollector, Collector, CollectorConfig, CollectorRegistry, Snapshot};
pub use config::Args;
pub use error::{Error, Result};
pub use github::{BillingApi, GitHubClient, GitHubConfig};
pub use server::MetricsServer;
