//! Core firewall backend functionality
//!
//! This module contains the lifecycle contract every firewall engine
//! implements and the engines themselves:
//!
//! - [`backend`]: The [`backend::Backend`] contract, engine selection and the factory
//! - [`decision`]: Decisions and address family classification
//! - [`invoker`]: External tool invocation and output classification
//! - [`family`]: Per-family table contexts for table-based engines
//! - [`set_backend`]: Immediate-apply backend shared by pf and ipset
//! - [`pf`]: pf tables via `pfctl`
//! - [`ipset`]: netfilter sets via `ipset`
//! - [`nftables`]: nftables sets via batched `nft` scripts
//! - [`error`]: Error types for firewall operations

pub mod backend;
pub mod decision;
pub mod error;
pub mod family;
pub mod invoker;
pub mod ipset;
pub mod nftables;
pub mod pf;
pub mod set_backend;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
