//! Address exclusion utilities

use std::collections::HashSet;
use std::net::IpAddr;

use crate::utils::target_parser::{AddressSpace, TargetBlock};

/// Blocks up to this size are expanded into the hash set
const EXPAND_LIMIT: u64 = 1 << 16;

/// Addresses a task must never probe.
///
/// Built once per task from the same syntax as targets. Literal addresses and
/// small blocks are expanded into a hash set; very large blocks are kept as
/// ranges and checked arithmetically.
#[derive(Debug, Clone, Default)]
pub struct ExcludedAddressSet {
    addresses: HashSet<IpAddr>,
    wide_blocks: Vec<TargetBlock>,
}

impl ExcludedAddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated exclusion list; an empty string excludes nothing.
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let mut set = Self::new();
        if spec.trim().is_empty() {
            return Ok(set);
        }

        for block in AddressSpace::parse(spec)?.blocks() {
            set.add_block(block.clone());
        }
        Ok(set)
    }

    pub fn add_block(&mut self, block: TargetBlock) {
        if block.len() <= EXPAND_LIMIT {
            self.addresses.extend(block.addresses());
        } else {
            self.wide_blocks.push(block);
        }
    }

    /// Check if an IP address should be excluded
    pub fn is_excluded(&self, addr: IpAddr) -> bool {
        self.addresses.contains(&addr) || self.wide_blocks.iter().any(|b| b.contains(addr))
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.wide_blocks.is_empty()
    }

    /// Number of expanded addresses plus wide blocks
    pub fn stats(&self) -> ExclusionStats {
        ExclusionStats {
            expanded_addresses: self.addresses.len(),
            wide_blocks: self.wide_blocks.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusionStats {
    pub expanded_addresses: usize,
    pub wide_blocks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_mixed_exclusions() {
        let set = ExcludedAddressSet::parse("10.0.0.1, 192.168.1.0/30,172.16.0.5-172.16.0.7").unwrap();
        assert!(set.is_excluded(ip("10.0.0.1")));
        assert!(set.is_excluded(ip("192.168.1.3")));
        assert!(!set.is_excluded(ip("192.168.1.4")));
        assert!(set.is_excluded(ip("172.16.0.6")));
        assert!(!set.is_excluded(ip("172.16.0.8")));
        assert_eq!(set.stats().expanded_addresses, 8);
    }

    #[test]
    fn test_wide_blocks_stay_ranges() {
        let set = ExcludedAddressSet::parse("10.0.0.0/8").unwrap();
        assert_eq!(set.stats(), ExclusionStats { expanded_addresses: 0, wide_blocks: 1 });
        assert!(set.is_excluded(ip("10.200.3.4")));
        assert!(!set.is_excluded(ip("11.0.0.1")));
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(ExcludedAddressSet::parse("").unwrap().is_empty());
        assert!(ExcludedAddressSet::parse("not-an-ip").is_err());
    }

    #[test]
    fn test_ipv6_exclusion() {
        let set = ExcludedAddressSet::parse("::1,fe80::/120").unwrap();
        assert!(set.is_excluded(ip("::1")));
        assert!(set.is_excluded(ip("fe80::ff")));
        assert!(!set.is_excluded(ip("fe80::1:0")));
        assert!(!set.is_excluded(ip("127.0.0.1")));
    }
}
