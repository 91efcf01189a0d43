//! # mltrack
//!
//! Rust client SDK for the MLTrack experiment-tracking service.
//!
//! The SDK lets applications create or resume a run ("experiment"), stream
//! measurements to the backend without blocking the training loop, and read
//! the recorded data back later.
//!
//! ## Overview
//!
//! All logging calls funnel through a single [`Connection`] that owns the
//! HTTP client, authenticates every request, retries critical writes, and
//! tracks in-flight fire-and-forget uploads so a run can be drained and
//! closed without losing data.
//!
//! ## Core Philosophy
//!
//! - **Non-blocking by default**: metric/parameter/asset uploads return
//!   immediately; completion is observable via the returned handle
//! - **Deterministic shutdown**: every connection owns its HTTP client and is
//!   closed exactly once, after an explicit drain if requested
//! - **Explicit failure tolerance**: synchronous writes choose per call site
//!   whether a failure is an error or an empty result
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mltrack::{ExperimentBuilder, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let experiment = ExperimentBuilder::new()
//!         .api_key("your-api-key")
//!         .project_name("mnist")
//!         .build()
//!         .await?;
//!
//!     for step in 0..100u64 {
//!         experiment.set_step(step);
//!         experiment.log_metric("loss", 1.0 / (step + 1) as f64)?;
//!     }
//!
//!     // Drain pending uploads, then release the connection.
//!     experiment.end().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | HTTP dispatch core: auth, retry, async uploads, drain |
//! | [`experiment`] | Write façade: metrics, parameters, assets, heartbeat |
//! | [`api`] | Synchronous read client for recorded experiment data |
//! | [`types`] | Wire DTOs and REST endpoint constants |
//! | [`config`] | Resolved configuration (key, URL, retry and drain knobs) |

pub mod api;
pub mod config;
pub mod connection;
pub mod experiment;
pub mod types;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::Error;

// Re-export main types for convenience
pub use api::ApiClient;
pub use config::TrackerConfig;
pub use connection::{AsyncPostHandle, Connection, Payload, QueryParams};
pub use experiment::{Experiment, ExperimentBuilder};
