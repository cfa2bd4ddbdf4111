//! fw-bouncer - firewall bouncer
//!
//! Enforces ban decisions from an upstream decision feed by keeping them in
//! firewall tables on the local host.
//!
//! # Architecture
//!
//! - [`core`] - Backend lifecycle contract, engines and tool invocation
//! - [`config`] - YAML configuration
//! - [`stream`] - Newline-delimited JSON decision events
//! - [`validators`] - Validation of operator-entered decisions
//! - [`utils`] - Utility functions (PATH lookup, privileges)
//!
//! # Engines
//!
//! - **pf** (FreeBSD/OpenBSD): pf tables through `pfctl`
//! - **iptables** (Linux): ipset sets through `ipset`
//! - **nftables** (Linux): nftables sets through batched `nft -f -` scripts
//!
//! # Example
//!
//! ```no_run
//! use fw_bouncer::config::BouncerConfig;
//! use fw_bouncer::core::backend::{Backend, BackendSupport, new_backend};
//! use fw_bouncer::core::decision::Decision;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BouncerConfig::default();
//! let BackendSupport::Supported(mut backend) = new_backend(&config) else {
//!     return Err("engine not supported on this platform".into());
//! };
//!
//! backend.init().await?;
//! backend.add(&Decision::new("203.0.113.7", "4h", "crowdsecurity/ssh-bf")).await?;
//! backend.commit().await?;
//! backend.shut_down().await?;
//! # Ok(())
//! # }
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod stream;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use crate::core::backend::{AnyBackend, Backend, BackendSupport, Engine, Outcome, new_backend};
pub use crate::core::decision::{Decision, Family};
pub use crate::core::error::{Error, Result};
