//! # tabfact-runtime
//!
//! Streaming inference runtime for table fact checking.
//!
//! This crate connects the deterministic pieces in `tabfact-core` to a live
//! model server. It provides:
//! - Inference backends (Ollama, the fact-check web service) behind one trait
//! - A session driver that turns a byte stream into live reasoning/answer
//!   deltas and one final verdict
//! - A checker that keeps a single run active and supports abort
//! - YAML configuration with environment overrides
//!
//! ## Example
//!
//! ```rust,ignore
//! use tabfact_runtime::{FactChecker, NullObserver, RuntimeConfig};
//!
//! let config = RuntimeConfig::load("tabfact.yaml")?.with_env_overrides()?;
//! let checker = FactChecker::from_config(&config)?;
//!
//! let request = config.request(table_text, "Alice joined in 1998.");
//! let outcome = checker.check(&request, &mut NullObserver).await?;
//! if let Some(report) = outcome.report() {
//!     println!("{}", report.verdict.answer);
//! }
//! ```

use thiserror::Error;

pub mod checker;
pub mod config;
pub mod providers;
pub mod session;

pub use checker::{FactChecker, FactCheckerBuilder, SessionSlot};
pub use config::{ConfigError, RuntimeConfig};
pub use providers::{BackendFactory, BackendRegistry, ByteStream, InferenceBackend, ProviderError};
pub use session::{
    run_session, NullObserver, RunOutcome, RunReport, SessionError, SessionObserver,
};

#[cfg(feature = "http")]
pub use providers::{InferenceApiBackend, OllamaBackend};

pub use tokio_util::sync::CancellationToken;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Backend error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Session failed: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
