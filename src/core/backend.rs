//! The lifecycle contract shared by every firewall engine
//!
//! A backend is built once at startup by [`new_backend`], then driven by the
//! decision-sync caller in a fixed order:
//!
//! 1. [`Backend::init`] once: pre-conditions, flush, table checks
//! 2. [`Backend::add`] / [`Backend::delete`] per decision, in feed order
//! 3. [`Backend::commit`] whenever the caller wants buffered work applied
//! 4. [`Backend::shut_down`] once at teardown
//!
//! Calls take `&mut self`: the caller serializes access to a backend and the
//! backend keeps no lock of its own.

use crate::config::BouncerConfig;
use crate::core::decision::{Decision, Family};
use crate::core::error::{Result, ToolFailure};
use crate::core::invoker::{SystemInvoker, ToolInvoker};
use crate::core::ipset::IpsetBackend;
use crate::core::nftables::NftablesBackend;
use crate::core::pf::PfBackend;
use serde::{Deserialize, Serialize};
use std::future::Future;
use strum::{Display, EnumString};

/// What happened to a single decision or flush.
///
/// Tolerated failures are successes from the caller's point of view; the
/// failure is kept here so it can be inspected separately from the log line
/// emitted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The engine accepted the change
    Applied,
    /// Buffered until the next [`Backend::commit`]
    Queued,
    /// The engine rejected the change; logged and skipped
    Tolerated(ToolFailure),
    /// The decision's family is disabled
    Skipped,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Queued => "queued",
            Outcome::Tolerated(_) => "tolerated",
            Outcome::Skipped => "skipped",
        }
    }

    pub fn is_tolerated(&self) -> bool {
        matches!(self, Outcome::Tolerated(_))
    }
}

/// Table mutation requested by a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Add,
    Delete,
}

impl Op {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Delete => "delete",
        }
    }

    pub(crate) fn progressive(self) -> &'static str {
        match self {
            Op::Add => "adding",
            Op::Delete => "removing",
        }
    }
}

/// Lifecycle contract implemented by every firewall engine
pub trait Backend: Send {
    /// Engine name for log lines and metric labels
    fn name(&self) -> &'static str;

    /// Validates pre-conditions, flushes stale table contents and verifies
    /// that every enabled family table exists.
    fn init(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Bans `decision.value` in the table of its family.
    fn add(&mut self, decision: &Decision) -> impl Future<Output = Result<Outcome>> + Send;

    /// Lifts the ban on `decision.value`.
    fn delete(&mut self, decision: &Decision) -> impl Future<Output = Result<Outcome>> + Send;

    /// Applies buffered mutations. Immediate-apply engines do nothing.
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Flushes every enabled family table. Failures are logged, not returned.
    fn shut_down(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Reports table sizes to the metrics facade.
    fn collect_metrics(&mut self) -> impl Future<Output = ()> + Send;
}

/// Firewall engine selected by the `mode` configuration key
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Table-based packet filter driven through `pfctl`
    #[default]
    Pf,
    /// netfilter sets driven through `ipset`
    Iptables,
    /// nftables sets driven through batched `nft -f -` scripts
    Nftables,
}

/// Operating system the bouncer runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Platform {
    Linux,
    FreeBsd,
    OpenBsd,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "freebsd") {
            Platform::FreeBsd
        } else if cfg!(target_os = "openbsd") {
            Platform::OpenBsd
        } else {
            Platform::Other
        }
    }
}

impl Engine {
    pub fn supported_on(self, platform: Platform) -> bool {
        match self {
            Engine::Pf => matches!(platform, Platform::FreeBsd | Platform::OpenBsd),
            Engine::Iptables | Engine::Nftables => platform == Platform::Linux,
        }
    }
}

/// A backend for any of the supported engines
#[derive(Debug)]
pub enum AnyBackend<I: ToolInvoker = SystemInvoker> {
    Pf(PfBackend<I>),
    Iptables(IpsetBackend<I>),
    Nftables(NftablesBackend<I>),
}

impl<I: ToolInvoker> Backend for AnyBackend<I> {
    fn name(&self) -> &'static str {
        match self {
            AnyBackend::Pf(b) => b.name(),
            AnyBackend::Iptables(b) => b.name(),
            AnyBackend::Nftables(b) => b.name(),
        }
    }

    async fn init(&mut self) -> Result<()> {
        match self {
            AnyBackend::Pf(b) => b.init().await,
            AnyBackend::Iptables(b) => b.init().await,
            AnyBackend::Nftables(b) => b.init().await,
        }
    }

    async fn add(&mut self, decision: &Decision) -> Result<Outcome> {
        match self {
            AnyBackend::Pf(b) => b.add(decision).await,
            AnyBackend::Iptables(b) => b.add(decision).await,
            AnyBackend::Nftables(b) => b.add(decision).await,
        }
    }

    async fn delete(&mut self, decision: &Decision) -> Result<Outcome> {
        match self {
            AnyBackend::Pf(b) => b.delete(decision).await,
            AnyBackend::Iptables(b) => b.delete(decision).await,
            AnyBackend::Nftables(b) => b.delete(decision).await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match self {
            AnyBackend::Pf(b) => b.commit().await,
            AnyBackend::Iptables(b) => b.commit().await,
            AnyBackend::Nftables(b) => b.commit().await,
        }
    }

    async fn shut_down(&mut self) -> Result<()> {
        match self {
            AnyBackend::Pf(b) => b.shut_down().await,
            AnyBackend::Iptables(b) => b.shut_down().await,
            AnyBackend::Nftables(b) => b.shut_down().await,
        }
    }

    async fn collect_metrics(&mut self) {
        match self {
            AnyBackend::Pf(b) => b.collect_metrics().await,
            AnyBackend::Iptables(b) => b.collect_metrics().await,
            AnyBackend::Nftables(b) => b.collect_metrics().await,
        }
    }
}

/// Result of backend construction. The caller must handle both arms.
#[derive(Debug)]
pub enum BackendSupport<I: ToolInvoker = SystemInvoker> {
    Supported(AnyBackend<I>),
    Unsupported { engine: Engine, reason: String },
}

/// Builds the backend configured by `config.mode` for the running platform.
pub fn new_backend(config: &BouncerConfig) -> BackendSupport {
    new_backend_on(Platform::current(), config, SystemInvoker)
}

/// Builds a backend for an explicit platform with a caller-supplied invoker.
pub fn new_backend_on<I: ToolInvoker>(
    platform: Platform,
    config: &BouncerConfig,
    invoker: I,
) -> BackendSupport<I> {
    let engine = config.mode;
    if !engine.supported_on(platform) {
        return BackendSupport::Unsupported {
            engine,
            reason: format!("the {engine} engine is not available on {platform}"),
        };
    }

    let backend = match engine {
        Engine::Pf => AnyBackend::Pf(PfBackend::with_invoker(
            config.pf.layout(),
            config.disable_ipv6,
            invoker,
        )),
        Engine::Iptables => AnyBackend::Iptables(IpsetBackend::with_invoker(
            config.ipset.layout(),
            config.disable_ipv6,
            invoker,
        )),
        Engine::Nftables => AnyBackend::Nftables(NftablesBackend::with_invoker(
            &config.nftables,
            config.disable_ipv6,
            invoker,
        )),
    };

    BackendSupport::Supported(backend)
}

/// Counts one routed decision under its engine, family, operation and outcome.
pub(crate) fn record_decision(engine: &'static str, family: Family, op: Op, outcome: &Outcome) {
    metrics::counter!(
        "fw_bouncer_decisions_total",
        "engine" => engine,
        "family" => family.to_string(),
        "op" => op.as_str(),
        "outcome" => outcome.label(),
    )
    .increment(1);
}
