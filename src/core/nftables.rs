//! nftables engine: element changes are buffered and applied as one batch
//!
//! `add`/`delete` only queue an element operation. [`Backend::commit`] renders
//! the queue, in order, into a single script fed to `nft -f -`, which the
//! kernel applies atomically. A rejected script is replayed one element at a
//! time so a single bad element costs only its own decision. The named sets
//! must already exist.
//!
//! Values are spliced into script text, so they must parse as an address or
//! network before they are queued.

use crate::config::{NftSetConfig, NftablesConfig};
use crate::core::backend::{Backend, Op, Outcome, record_decision};
use crate::core::decision::{Decision, Family};
use crate::core::error::{Error, Result};
use crate::core::invoker::{self, Invocation, SystemInvoker, ToolInvoker, lookup_tool};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

const ENGINE: &str = "nftables";

/// One family's named set
#[derive(Debug, Clone, PartialEq, Eq)]
struct NftSet {
    family: Family,
    /// nftables address family keyword (`ip`, `ip6`, `inet`)
    nft_family: String,
    table: String,
    set: String,
}

impl NftSet {
    fn from_config(family: Family, config: &NftSetConfig) -> Self {
        Self {
            family,
            nft_family: config.family.clone(),
            table: config.table.clone(),
            set: config.set.clone(),
        }
    }

    /// `<family> <table> <set>` as used in nft commands
    fn target(&self) -> String {
        format!("{} {} {}", self.nft_family, self.table, self.set)
    }

    fn command(&self, verb: &str) -> Vec<String> {
        vec![
            verb.to_string(),
            "set".to_string(),
            self.nft_family.clone(),
            self.table.clone(),
            self.set.clone(),
        ]
    }

    /// `<verb> element <family> <table> <set> { <value> }` as separate arguments
    fn element(&self, verb: &str, value: &str) -> Vec<String> {
        vec![
            verb.to_string(),
            "element".to_string(),
            self.nft_family.clone(),
            self.table.clone(),
            self.set.clone(),
            "{".to_string(),
            value.to_string(),
            "}".to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingOp {
    op: Op,
    family: Family,
    value: String,
}

#[derive(Debug)]
pub struct NftablesBackend<I: ToolInvoker = SystemInvoker> {
    invoker: I,
    nft: PathBuf,
    inet: NftSet,
    inet6: Option<NftSet>,
    pending: Vec<PendingOp>,
}

impl NftablesBackend {
    pub fn new(config: &NftablesConfig, disable_ipv6: bool) -> Self {
        Self::with_invoker(config, disable_ipv6, SystemInvoker)
    }
}

impl<I: ToolInvoker> NftablesBackend<I> {
    pub fn with_invoker(config: &NftablesConfig, disable_ipv6: bool, invoker: I) -> Self {
        let inet6 = if disable_ipv6 {
            None
        } else {
            Some(NftSet::from_config(Family::Ipv6, &config.ipv6))
        };

        Self {
            invoker,
            nft: config.nft_path.clone(),
            inet: NftSet::from_config(Family::Ipv4, &config.ipv4),
            inet6,
            pending: Vec::new(),
        }
    }

    pub fn family_enabled(&self, family: Family) -> bool {
        self.set(family).is_some()
    }

    /// Number of element operations waiting for the next commit
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn set(&self, family: Family) -> Option<&NftSet> {
        match family {
            Family::Ipv4 => Some(&self.inet),
            Family::Ipv6 => self.inet6.as_ref(),
        }
    }

    fn sets(&self) -> impl Iterator<Item = &NftSet> {
        std::iter::once(&self.inet).chain(self.inet6.as_ref())
    }

    async fn flush_set(&self, set: &NftSet) -> Result<Outcome> {
        let inv = Invocation::new(&self.nft, set.command("flush"));
        info!("{ENGINE} set clean-up: {}", inv.command_line());

        match invoker::run(&self.invoker, &inv).await {
            Ok(_) => Ok(Outcome::Applied),
            Err(Error::Tool(failure)) => Ok(Outcome::Tolerated(failure)),
            Err(e) => Err(e),
        }
    }

    async fn check_set(&self, set: &NftSet) -> Result<()> {
        info!("Checking {ENGINE} set: {}", set.target());

        let inv = Invocation::new(&self.nft, set.command("list"));
        match invoker::run(&self.invoker, &inv).await {
            Ok(_) => Ok(()),
            Err(Error::Tool(failure))
                if failure.output.contains("No such file or directory")
                    || failure.output.contains("does not exist") =>
            {
                Err(Error::TableMissing {
                    table: set.target(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn queue(&mut self, op: Op, decision: &Decision) -> Result<Outcome> {
        let ban = decision.ban_duration()?;
        let value = element_value(&decision.value)?;
        let family = decision.family();

        if !self.family_enabled(family) {
            debug!(
                "not {} '{}' because ipv6 is disabled",
                op.progressive(),
                decision.value
            );
            record_decision(ENGINE, family, op, &Outcome::Skipped);
            return Ok(Outcome::Skipped);
        }

        debug!(
            "{ENGINE}: {} ban on {} for {} sec ({})",
            if op == Op::Add { "add" } else { "del" },
            decision.value,
            ban.as_secs(),
            decision.scenario
        );
        self.pending.push(PendingOp { op, family, value });
        record_decision(ENGINE, family, op, &Outcome::Queued);
        Ok(Outcome::Queued)
    }

    /// Renders queued operations as an nft script, one statement per line.
    fn render(&self, ops: &[PendingOp]) -> String {
        let mut script = String::new();
        for pending in ops {
            // Operations are only queued for enabled families
            if let Some(set) = self.set(pending.family) {
                let _ = writeln!(
                    script,
                    "{} element {} {{ {} }}",
                    pending.op.as_str(),
                    set.target(),
                    pending.value
                );
            }
        }
        script
    }

    /// Applies one queued operation on its own, tolerating a rejection.
    async fn apply_one(&self, pending: &PendingOp) -> Result<Outcome> {
        let Some(set) = self.set(pending.family) else {
            return Ok(Outcome::Skipped);
        };
        let inv = Invocation::new(&self.nft, set.element(pending.op.as_str(), &pending.value));
        debug!("{ENGINE} {} : {}", pending.op.as_str(), inv.command_line());

        match invoker::run(&self.invoker, &inv).await {
            Ok(_) => Ok(Outcome::Applied),
            Err(Error::Tool(failure)) => {
                warn!(
                    "Error while running {} on set {} ({}): {} --> {}",
                    pending.op.as_str(),
                    set.target(),
                    failure.command,
                    crate::utils::truncate_string(failure.output.trim(), 512),
                    failure.hint().user_message
                );
                Ok(Outcome::Tolerated(failure))
            }
            Err(e) => Err(e),
        }
    }
}

/// Canonical element text for `value`, which must be an IP address or network.
fn element_value(value: &str) -> Result<String> {
    crate::validators::validate_address(value).map_err(|reason| Error::InvalidValue {
        value: value.to_string(),
        reason,
    })
}

impl<I: ToolInvoker> Backend for NftablesBackend<I> {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn init(&mut self) -> Result<()> {
        lookup_tool(&self.nft)?;

        for set in self.sets() {
            let wrap = |e: Error| Error::Init {
                engine: ENGINE,
                family: set.family,
                source: Box::new(e),
            };

            if let Outcome::Tolerated(failure) = self.flush_set(set).await.map_err(wrap)? {
                warn!(
                    "Error while flushing set ({}): {}",
                    failure.command,
                    failure.output.trim()
                );
            }
            self.check_set(set).await.map_err(wrap)?;
            info!("{ENGINE} for {} initiated", set.family);
        }

        Ok(())
    }

    async fn add(&mut self, decision: &Decision) -> Result<Outcome> {
        self.queue(Op::Add, decision)
    }

    async fn delete(&mut self, decision: &Decision) -> Result<Outcome> {
        self.queue(Op::Delete, decision)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let ops = std::mem::take(&mut self.pending);
        let script = self.render(&ops);
        let inv = Invocation::new(&self.nft, ["-f", "-"]).with_input(script);
        debug!("{ENGINE} commit : {} ({} operations)", inv.command_line(), ops.len());

        match invoker::run(&self.invoker, &inv).await {
            Ok(_) => {
                info!("{ENGINE} commit applied {} element operation(s)", ops.len());
                Ok(())
            }
            Err(Error::Tool(failure)) => {
                warn!(
                    "{ENGINE} rejected batch of {} element operation(s), applying them one by one: {} --> {}",
                    ops.len(),
                    crate::utils::truncate_string(failure.output.trim(), 512),
                    failure.hint().user_message
                );

                let mut applied = 0;
                for pending in &ops {
                    if self.apply_one(pending).await? == Outcome::Applied {
                        applied += 1;
                    }
                }
                info!(
                    "{ENGINE} applied {applied} of {} element operation(s) individually",
                    ops.len()
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn shut_down(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            warn!(
                "discarding {} uncommitted element operation(s)",
                self.pending.len()
            );
            self.pending.clear();
        }

        info!("flushing {ENGINE} set(s)");
        for set in self.sets() {
            match self.flush_set(set).await {
                Ok(Outcome::Tolerated(failure)) => error!(
                    "unable to flush {} set ({}): {}",
                    set.family,
                    set.target(),
                    failure.output.trim()
                ),
                Ok(_) => {}
                Err(e) => error!("unable to flush {} set ({}): {e}", set.family, set.target()),
            }
        }

        Ok(())
    }

    async fn collect_metrics(&mut self) {
        metrics::gauge!("fw_bouncer_pending_operations", "engine" => ENGINE)
            .set(self.pending.len() as f64);

        for set in self.sets() {
            let inv = Invocation::new(&self.nft, set.command("list"));
            match invoker::run(&self.invoker, &inv).await {
                Ok(output) => {
                    metrics::gauge!(
                        "fw_bouncer_table_members",
                        "engine" => ENGINE,
                        "family" => set.family.to_string(),
                        "table" => set.set.clone(),
                    )
                    .set(count_set_elements(&output.text()) as f64);
                }
                Err(e) => warn!("unable to count members of {}: {e}", set.target()),
            }
        }
    }
}

/// Counts the entries of the `elements = { ... }` block of `nft list set`.
fn count_set_elements(listing: &str) -> usize {
    let Some(start) = listing.find("elements = {") else {
        return 0;
    };
    let body = &listing[start + "elements = {".len()..];
    let body = body.split('}').next().unwrap_or_default();

    body.split(',').filter(|item| !item.trim().is_empty()).count()
}
