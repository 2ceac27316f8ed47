//! Source-address allow-list for the diagnostics and update endpoints.
//!
//! `Update:AcceptFrom` holds `;` or `,` separated entries, each either `address/prefix`
//! or a bare address (a full-length prefix). IPv4 and IPv6 entries never match an address
//! of the other family. An empty list denies everyone.

use crate::config::ConfigReader;
use crate::constants::keys;
use crate::core::HotError;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// One parsed allow-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `addr/prefix` or a bare address.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (addr, prefix) = match entry.split_once('/') {
            Some((addr, prefix)) => (addr.trim(), Some(prefix.trim())),
            None => (entry, None),
        };
        let network: IpAddr = addr.parse().ok()?;
        let max = max_prefix(&network);
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max)?,
            None => max,
        };
        Some(Self { network, prefix })
    }

    /// Whether `ip` shares the first `prefix` bits with the network address.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                prefix_matches(&net.octets(), &ip.octets(), self.prefix)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                prefix_matches(&net.octets(), &ip.octets(), self.prefix)
            }
            _ => false,
        }
    }
}

const fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn prefix_matches(network: &[u8], ip: &[u8], prefix: u8) -> bool {
    let full_bytes = usize::from(prefix / 8);
    let remaining_bits = prefix % 8;

    if network[..full_bytes] != ip[..full_bytes] {
        return false;
    }
    if remaining_bits == 0 {
        return true;
    }
    let mask = 0xFFu8 << (8 - remaining_bits);
    (network[full_bytes] & mask) == (ip[full_bytes] & mask)
}

/// Whether `source_ip` is covered by any entry of `allow_list`.
///
/// Denials are logged with the source address. Unparsable entries are skipped.
pub fn is_authorized(source_ip: &str, allow_list: &str) -> bool {
    if allow_list.trim().is_empty() {
        error!(source_ip = %source_ip, "Allow-list '{}' is not configured, rejecting", keys::UPDATE_ACCEPT_FROM);
        return false;
    }

    let Ok(ip) = source_ip.trim().parse::<IpAddr>() else {
        warn!(source_ip = %source_ip, "Rejecting request from unparsable address");
        return false;
    };

    for entry in allow_list.split([';', ',']).filter(|e| !e.trim().is_empty()) {
        match Cidr::parse(entry) {
            Some(cidr) if cidr.contains(&ip) => return true,
            Some(_) => {}
            None => debug!("Skipping malformed allow-list entry '{}'", entry.trim()),
        }
    }

    warn!(source_ip = %source_ip, "Address is not on the allow-list");
    false
}

/// Allow-list check bound to a configuration reader.
///
/// The list is re-read on every call so configuration changes apply without a restart.
#[derive(Clone)]
pub struct AccessGuard {
    config: Arc<dyn ConfigReader>,
}

impl AccessGuard {
    pub fn new(config: Arc<dyn ConfigReader>) -> Self {
        Self { config }
    }

    /// Check a caller.
    ///
    /// An unconfigured list is a [`HotError::Configuration`] (answered with 500), a
    /// denied caller is [`HotError::Forbidden`] (answered with 401).
    pub fn check(&self, source_ip: &str) -> Result<(), HotError> {
        let allow_list = self.config.get_or_empty(keys::UPDATE_ACCEPT_FROM);
        if allow_list.trim().is_empty() {
            error!(source_ip = %source_ip, "Configuration failure: '{}' is empty", keys::UPDATE_ACCEPT_FROM);
            return Err(HotError::missing_key(keys::UPDATE_ACCEPT_FROM));
        }
        if is_authorized(source_ip, &allow_list) {
            Ok(())
        } else {
            Err(HotError::Forbidden {
                source_ip: source_ip.to_string(),
            })
        }
    }
}
