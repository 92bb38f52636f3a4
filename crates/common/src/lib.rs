//! Common utilities and shared types for apub-engine.
//!
//! This crate provides the foundations the federation and queue crates
//! build on:
//!
//! - **Configuration**: Engine settings via [`Config`]
//! - **Error handling**: Collaborator error type via [`AppError`] and [`AppResult`]
//! - **Key material**: Caller-supplied RSA keys via [`KeyMaterial`]
//! - **HTTP Signatures**: The signing-string / sign / verify codec
//! - **ID Generation**: ULID-based identifiers via [`IdGenerator`]
//! - **Telemetry**: `tracing` subscriber installation
//!
//! # Example
//!
//! ```no_run
//! use apub_common::{Config, IdGenerator, telemetry};
//!
//! fn example() -> Result<(), apub_common::AppError> {
//!     let config = Config::load()?;
//!     telemetry::init_tracing(&config.logging);
//!     let event_id = IdGenerator::new().generate();
//!     tracing::info!(%event_id, "ready");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod http_signature;
pub mod id;
pub mod telemetry;

pub use config::Config;
pub use crypto::{KeyError, KeyMaterial};
pub use error::{AppError, AppResult};
pub use http_signature::{
    SignatureCodecError, SignatureHeader, build_signing_string, calculate_digest,
    format_http_date, parse_http_date, sign, verify, verify_base64, verify_digest,
};
pub use id::IdGenerator;
