//! Input validation for decisions entered on the command line
//!
//! Decisions from the feed are passed through untouched; the engine is the
//! judge of what it accepts. Operator input gets checked up front so typos
//! fail loudly instead of turning into tolerated engine rejections.

use ipnetwork::IpNetwork;

/// Validates an IP address or CIDR and returns it in canonical form.
///
/// # Errors
///
/// Returns `Err` if the value is not an IPv4/IPv6 address or network.
///
/// # Examples
///
/// ```
/// use fw_bouncer::validators::validate_address;
///
/// assert_eq!(validate_address("203.0.113.7").unwrap(), "203.0.113.7");
/// assert_eq!(validate_address("2001:db8::/32").unwrap(), "2001:db8::/32");
/// assert!(validate_address("203.0.113.300").is_err());
/// ```
pub fn validate_address(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    let network: IpNetwork = trimmed
        .parse()
        .map_err(|e| format!("'{trimmed}' is not an IP address or network: {e}"))?;

    // Single hosts keep the bare address form the engines list them in
    if network.prefix() == max_prefix(&network) {
        Ok(network.ip().to_string())
    } else {
        Ok(network.to_string())
    }
}

fn max_prefix(network: &IpNetwork) -> u8 {
    match network {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    }
}

/// Sanitizes a scenario label for log lines.
///
/// Keeps ASCII alphanumerics and `-_./:`, limited to 64 characters.
pub fn sanitize_scenario(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'))
        .take(64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::Family;
    use proptest::prelude::*;

    #[test]
    fn test_host_addresses_drop_prefix() {
        assert_eq!(validate_address("10.0.0.1/32").unwrap(), "10.0.0.1");
        assert_eq!(validate_address(" 2001:db8::1 ").unwrap(), "2001:db8::1");
    }

    #[test]
    fn test_networks_keep_prefix() {
        assert_eq!(validate_address("198.51.100.0/24").unwrap(), "198.51.100.0/24");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(validate_address("").is_err());
        assert!(validate_address("example.com").is_err());
        assert!(validate_address("10.0.0.1/33").is_err());
    }

    #[test]
    fn test_sanitize_scenario() {
        assert_eq!(sanitize_scenario("crowdsecurity/ssh-bf"), "crowdsecurity/ssh-bf");
        assert_eq!(sanitize_scenario("manual\nban \"x\""), "manualbanx");
    }

    proptest! {
        #[test]
        fn validated_ipv4_stays_ipv4(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            let value = validate_address(&format!("{a}.{b}.{c}.{d}")).unwrap();
            prop_assert_eq!(Family::of(&value), Family::Ipv4);
        }

        #[test]
        fn validated_ipv6_stays_ipv6(segments in proptest::array::uniform8(any::<u16>())) {
            let addr = std::net::Ipv6Addr::from(segments);
            let value = validate_address(&addr.to_string()).unwrap();
            prop_assert_eq!(Family::of(&value), Family::Ipv6);
        }

        #[test]
        fn sanitized_scenario_is_bounded(s in ".*") {
            let clean = sanitize_scenario(&s);
            prop_assert!(clean.len() <= 64);
            prop_assert!(clean.chars().all(|c| c.is_ascii()));
        }
    }
}
