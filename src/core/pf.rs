//! pf engine: addresses live in pf tables managed through `pfctl`
//!
//! The tables must be declared in `pf.conf` (for example
//! `table <crowdsec-blacklists> persist`) together with the rules that block
//! them; the bouncer only fills and empties them.

use crate::core::family::Dialect;
use crate::core::invoker::SystemInvoker;
use crate::core::set_backend::SetBackend;

pub const DEFAULT_PFCTL: &str = "/sbin/pfctl";
pub const DEFAULT_DEVICE: &str = "/dev/pf";
pub const DEFAULT_IPV4_TABLE: &str = "crowdsec-blacklists";
pub const DEFAULT_IPV6_TABLE: &str = "crowdsec6-blacklists";

/// `pfctl` table syntax
#[derive(Debug)]
pub struct Pf;

impl Dialect for Pf {
    const ENGINE: &'static str = "pf";

    fn list_tables() -> Vec<String> {
        args(&["-s", "Tables"])
    }

    fn has_table(listing: &str, table: &str) -> bool {
        listing.contains(table)
    }

    fn flush(table: &str) -> Vec<String> {
        args(&["-t", table, "-T", "flush"])
    }

    fn add(table: &str, address: &str) -> Vec<String> {
        args(&["-t", table, "-T", "add", address])
    }

    fn delete(table: &str, address: &str) -> Vec<String> {
        args(&["-t", table, "-T", "delete", address])
    }

    fn show(table: &str) -> Vec<String> {
        args(&["-t", table, "-T", "show"])
    }

    fn count_members(listing: &str) -> usize {
        listing.lines().filter(|l| !l.trim().is_empty()).count()
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

pub type PfBackend<I = SystemInvoker> = SetBackend<Pf, I>;
