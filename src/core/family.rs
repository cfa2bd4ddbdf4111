//! Per-family table state for engines that keep addresses in named tables
//!
//! A [`FamilyContext`] owns the name of one family's table and nothing else:
//! membership lives in the kernel and is only ever changed through the
//! engine's control tool. The [`Dialect`] trait supplies the argument
//! vectors of a particular tool (`pfctl`, `ipset`).

use crate::core::backend::Outcome;
use crate::core::decision::{BanDuration, Decision, Family};
use crate::core::error::{Error, Result};
use crate::core::invoker::{self, Invocation, ToolInvoker};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Command syntax of a table-based firewall tool
pub trait Dialect: Send + Sync + 'static {
    /// Engine name used in log lines and metric labels
    const ENGINE: &'static str;

    /// Lists the tables known to the engine.
    fn list_tables() -> Vec<String>;

    /// Whether `table` appears in the output of [`Dialect::list_tables`].
    fn has_table(listing: &str, table: &str) -> bool;

    fn flush(table: &str) -> Vec<String>;

    fn add(table: &str, address: &str) -> Vec<String>;

    fn delete(table: &str, address: &str) -> Vec<String>;

    /// Lists the members of `table`.
    fn show(table: &str) -> Vec<String>;

    /// Number of members in the output of [`Dialect::show`].
    fn count_members(listing: &str) -> usize;
}

/// Tool, device and table names of a table-based engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub tool: PathBuf,
    /// Kernel device that must exist before the tool is usable
    pub device: Option<PathBuf>,
    pub ipv4_table: String,
    pub ipv6_table: String,
}

/// One address family's table
#[derive(Debug)]
pub struct FamilyContext<D> {
    family: Family,
    table: String,
    tool: PathBuf,
    dialect: PhantomData<fn() -> D>,
}

impl<D: Dialect> FamilyContext<D> {
    pub fn new(family: Family, table: impl Into<String>, tool: &Path) -> Self {
        Self {
            family,
            table: table.into(),
            tool: tool.to_path_buf(),
            dialect: PhantomData,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn invocation(&self, args: Vec<String>) -> Invocation {
        Invocation::new(&self.tool, args)
    }

    /// Fails unless the engine lists this context's table.
    ///
    /// # Errors
    ///
    /// - `Error::Tool` if the table listing itself fails
    /// - `Error::TableMissing` if the table is not listed
    pub async fn check_table<I: ToolInvoker>(&self, invoker: &I) -> Result<()> {
        info!("Checking {} table: {}", D::ENGINE, self.table);

        let inv = self.invocation(D::list_tables());
        let output = invoker::run(invoker, &inv).await?;

        if D::has_table(&output.text(), &self.table) {
            Ok(())
        } else {
            Err(Error::TableMissing {
                table: self.table.clone(),
            })
        }
    }

    /// Empties the table. A non-zero exit is tolerated: an empty or absent
    /// table is an acceptable end state. The caller logs the returned failure
    /// at the level its phase calls for.
    ///
    /// # Errors
    ///
    /// Returns `Err` only if the tool could not be run at all.
    pub async fn flush<I: ToolInvoker>(&self, invoker: &I) -> Result<Outcome> {
        let inv = self.invocation(D::flush(&self.table));
        info!("{} table clean-up: {}", D::ENGINE, inv.command_line());

        match invoker::run(invoker, &inv).await {
            Ok(_) => Ok(Outcome::Applied),
            Err(Error::Tool(failure)) => Ok(Outcome::Tolerated(failure)),
            Err(e) => Err(e),
        }
    }

    /// Inserts `decision.value` into the table.
    ///
    /// # Errors
    ///
    /// Returns `Err` only if the tool could not be run; a rejected insert is
    /// reported as [`Outcome::Tolerated`].
    pub async fn add<I: ToolInvoker>(
        &self,
        invoker: &I,
        decision: &Decision,
        ban: BanDuration,
    ) -> Result<Outcome> {
        debug!(
            "{}: add ban on {} for {} sec ({})",
            D::ENGINE,
            decision.value,
            ban.as_secs(),
            decision.scenario
        );
        let inv = self.invocation(D::add(&self.table, &decision.value));
        self.apply(invoker, &inv, "add").await
    }

    /// Removes `decision.value` from the table, with the same tolerance as
    /// [`FamilyContext::add`].
    ///
    /// # Errors
    ///
    /// Returns `Err` only if the tool could not be run.
    pub async fn delete<I: ToolInvoker>(
        &self,
        invoker: &I,
        decision: &Decision,
        ban: BanDuration,
    ) -> Result<Outcome> {
        debug!(
            "{}: del ban on {} for {} sec ({})",
            D::ENGINE,
            decision.value,
            ban.as_secs(),
            decision.scenario
        );
        let inv = self.invocation(D::delete(&self.table, &decision.value));
        self.apply(invoker, &inv, "delete").await
    }

    async fn apply<I: ToolInvoker>(
        &self,
        invoker: &I,
        inv: &Invocation,
        op: &str,
    ) -> Result<Outcome> {
        debug!("{} {op} : {}", D::ENGINE, inv.command_line());

        match invoker::run(invoker, inv).await {
            Ok(_) => Ok(Outcome::Applied),
            Err(Error::Tool(failure)) => {
                let hint = failure.hint();
                warn!(
                    "Error while running {op} on table {} ({}): {} --> {}",
                    self.table,
                    failure.command,
                    crate::utils::truncate_string(failure.output.trim(), 512),
                    hint.user_message
                );
                Ok(Outcome::Tolerated(failure))
            }
            Err(e) => Err(e),
        }
    }

    /// Current number of members, for metrics.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the member listing fails.
    pub async fn member_count<I: ToolInvoker>(&self, invoker: &I) -> Result<usize> {
        let inv = self.invocation(D::show(&self.table));
        let output = invoker::run(invoker, &inv).await?;
        Ok(D::count_members(&output.text()))
    }
}
