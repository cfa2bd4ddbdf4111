//! iptables engine: addresses live in ipset sets matched by iptables rules
//!
//! The sets (`hash:net` for each family) and the `-m set --match-set` rules
//! referencing them are provisioned outside the bouncer.

use crate::core::family::Dialect;
use crate::core::invoker::SystemInvoker;
use crate::core::set_backend::SetBackend;

pub const DEFAULT_IPSET: &str = "ipset";
pub const DEFAULT_IPV4_SET: &str = "crowdsec-blacklists";
pub const DEFAULT_IPV6_SET: &str = "crowdsec6-blacklists";

/// `ipset` command syntax
#[derive(Debug)]
pub struct Ipset;

impl Dialect for Ipset {
    const ENGINE: &'static str = "ipset";

    fn list_tables() -> Vec<String> {
        vec!["list".to_string(), "-n".to_string()]
    }

    fn has_table(listing: &str, table: &str) -> bool {
        listing.lines().any(|line| line.trim() == table)
    }

    fn flush(table: &str) -> Vec<String> {
        vec!["flush".to_string(), table.to_string()]
    }

    // -exist turns duplicate adds and missing deletes into successes
    fn add(table: &str, address: &str) -> Vec<String> {
        vec![
            "add".to_string(),
            table.to_string(),
            address.to_string(),
            "-exist".to_string(),
        ]
    }

    fn delete(table: &str, address: &str) -> Vec<String> {
        vec![
            "del".to_string(),
            table.to_string(),
            address.to_string(),
            "-exist".to_string(),
        ]
    }

    fn show(table: &str) -> Vec<String> {
        vec!["list".to_string(), table.to_string()]
    }

    fn count_members(listing: &str) -> usize {
        if let Some(count) = listing
            .lines()
            .find_map(|line| line.strip_prefix("Number of entries:"))
            .and_then(|n| n.trim().parse().ok())
        {
            return count;
        }

        // Older ipset releases omit the header; count the member lines instead
        listing
            .lines()
            .skip_while(|line| !line.starts_with("Members:"))
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .count()
    }
}

pub type IpsetBackend<I = SystemInvoker> = SetBackend<Ipset, I>;
