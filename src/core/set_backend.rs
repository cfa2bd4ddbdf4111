//! Immediate-apply backend over per-family tables
//!
//! Shared by every engine whose tool mutates a named table directly on each
//! call (`pfctl -T add`, `ipset add`). The IPv4 context always exists; the
//! IPv6 context exists only when IPv6 support is enabled.

use crate::core::backend::{Backend, Op, Outcome, record_decision};
use crate::core::decision::{Decision, Family};
use crate::core::error::{Error, Result};
use crate::core::family::{Dialect, FamilyContext, TableLayout};
use crate::core::invoker::{SystemInvoker, ToolInvoker, lookup_tool};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct SetBackend<D: Dialect, I: ToolInvoker = SystemInvoker> {
    invoker: I,
    tool: PathBuf,
    device: Option<PathBuf>,
    inet: FamilyContext<D>,
    inet6: Option<FamilyContext<D>>,
}

impl<D: Dialect> SetBackend<D> {
    pub fn new(layout: TableLayout, disable_ipv6: bool) -> Self {
        Self::with_invoker(layout, disable_ipv6, SystemInvoker)
    }
}

impl<D: Dialect, I: ToolInvoker> SetBackend<D, I> {
    pub fn with_invoker(layout: TableLayout, disable_ipv6: bool, invoker: I) -> Self {
        let inet = FamilyContext::new(Family::Ipv4, layout.ipv4_table, &layout.tool);
        let inet6 = if disable_ipv6 {
            None
        } else {
            Some(FamilyContext::new(
                Family::Ipv6,
                layout.ipv6_table,
                &layout.tool,
            ))
        };

        Self {
            invoker,
            tool: layout.tool,
            device: layout.device,
            inet,
            inet6,
        }
    }

    pub fn family_enabled(&self, family: Family) -> bool {
        self.context(family).is_some()
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    fn context(&self, family: Family) -> Option<&FamilyContext<D>> {
        match family {
            Family::Ipv4 => Some(&self.inet),
            Family::Ipv6 => self.inet6.as_ref(),
        }
    }

    fn contexts(&self) -> impl Iterator<Item = &FamilyContext<D>> {
        std::iter::once(&self.inet).chain(self.inet6.as_ref())
    }

    async fn check_preconditions(&self) -> Result<()> {
        if let Some(device) = &self.device
            && let Err(e) = tokio::fs::metadata(device).await
        {
            return Err(Error::DeviceNotFound {
                path: device.clone(),
                reason: e.to_string(),
            });
        }

        lookup_tool(&self.tool)?;
        Ok(())
    }

    async fn route(&self, op: Op, decision: &Decision) -> Result<Outcome> {
        let ban = decision.ban_duration()?;
        let family = decision.family();

        let Some(ctx) = self.context(family) else {
            debug!(
                "not {} '{}' because ipv6 is disabled",
                op.progressive(),
                decision.value
            );
            record_decision(D::ENGINE, family, op, &Outcome::Skipped);
            return Ok(Outcome::Skipped);
        };

        let result = match op {
            Op::Add => ctx.add(&self.invoker, decision, ban).await,
            Op::Delete => ctx.delete(&self.invoker, decision, ban).await,
        };

        let outcome = result.map_err(|e| Error::Decision {
            op: op.as_str(),
            value: decision.value.clone(),
            family,
            source: Box::new(e),
        })?;

        record_decision(D::ENGINE, family, op, &outcome);
        Ok(outcome)
    }
}

impl<D: Dialect, I: ToolInvoker> Backend for SetBackend<D, I> {
    fn name(&self) -> &'static str {
        D::ENGINE
    }

    async fn init(&mut self) -> Result<()> {
        self.check_preconditions().await?;

        for ctx in self.contexts() {
            let wrap = |e: Error| Error::Init {
                engine: D::ENGINE,
                family: ctx.family(),
                source: Box::new(e),
            };

            if let Outcome::Tolerated(failure) = ctx.flush(&self.invoker).await.map_err(wrap)? {
                warn!(
                    "Error while flushing table ({}): {}",
                    failure.command,
                    failure.output.trim()
                );
            }
            ctx.check_table(&self.invoker).await.map_err(wrap)?;
            info!("{} for {} initiated", D::ENGINE, ctx.family());
        }

        Ok(())
    }

    async fn add(&mut self, decision: &Decision) -> Result<Outcome> {
        self.route(Op::Add, decision).await
    }

    async fn delete(&mut self, decision: &Decision) -> Result<Outcome> {
        self.route(Op::Delete, decision).await
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn shut_down(&mut self) -> Result<()> {
        info!("flushing {} table(s)", D::ENGINE);

        for ctx in self.contexts() {
            match ctx.flush(&self.invoker).await {
                Ok(Outcome::Tolerated(failure)) => error!(
                    "unable to flush {} table ({}): {}",
                    ctx.family(),
                    ctx.table(),
                    failure.output.trim()
                ),
                Ok(_) => {}
                Err(e) => error!("unable to flush {} table ({}): {e}", ctx.family(), ctx.table()),
            }
        }

        Ok(())
    }

    async fn collect_metrics(&mut self) {
        for ctx in self.contexts() {
            match ctx.member_count(&self.invoker).await {
                Ok(count) => {
                    metrics::gauge!(
                        "fw_bouncer_table_members",
                        "engine" => D::ENGINE,
                        "family" => ctx.family().to_string(),
                        "table" => ctx.table().to_string(),
                    )
                    .set(count as f64);
                }
                Err(e) => warn!("unable to count members of {}: {e}", ctx.table()),
            }
        }
    }
}
