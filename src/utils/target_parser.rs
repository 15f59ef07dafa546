//! Target parsing with IPv4/IPv6, CIDR and range support
//!
//! A target specification is a comma separated list of items:
//! - single addresses (`10.0.0.1`, `fe80::1`)
//! - CIDR blocks (`10.0.0.0/24`), every address including network/broadcast
//! - ranges (`10.0.0.1-10.0.0.50`, or the short form `10.0.0.1-50`)
//!
//! Each item becomes an indexable [`TargetBlock`]; addresses are produced on
//! demand by index, never collected into a list.

use ipnetwork::IpNetwork;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::ScanError;

/// Largest block accepted from a single item
pub const MAX_BLOCK_ADDRESSES: u64 = 1 << 32;

/// A contiguous run of addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBlock {
    source: String,
    start: BlockStart,
    len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStart {
    V4(u32),
    V6(u128),
}

impl TargetBlock {
    pub fn parse(item: &str) -> crate::Result<Self> {
        let item = item.trim();
        if item.contains('/') {
            Self::parse_cidr(item)
        } else if let Some((lo, hi)) = item.split_once('-') {
            Self::parse_range(item, lo.trim(), hi.trim())
        } else {
            let addr = IpAddr::from_str(item)
                .map_err(|_| ScanError::InvalidTarget(format!("Invalid IP address: {}", item)))?;
            Ok(Self::single(item, addr))
        }
    }

    fn single(source: &str, addr: IpAddr) -> Self {
        let start = match addr {
            IpAddr::V4(v4) => BlockStart::V4(u32::from(v4)),
            IpAddr::V6(v6) => BlockStart::V6(u128::from(v6)),
        };
        Self {
            source: source.to_string(),
            start,
            len: 1,
        }
    }

    fn parse_cidr(item: &str) -> crate::Result<Self> {
        let network = IpNetwork::from_str(item)
            .map_err(|e| ScanError::InvalidTarget(format!("Invalid CIDR '{}': {}", item, e)))?;
        match network {
            IpNetwork::V4(net) => Ok(Self {
                source: item.to_string(),
                start: BlockStart::V4(u32::from(net.network())),
                len: 1u64 << (32 - net.prefix() as u32),
            }),
            IpNetwork::V6(net) => {
                let host_bits = 128 - net.prefix() as u32;
                if host_bits > 32 {
                    return Err(ScanError::InvalidTarget(format!(
                        "IPv6 block too large to scan: {}",
                        item
                    )));
                }
                Ok(Self {
                    source: item.to_string(),
                    start: BlockStart::V6(u128::from(net.network())),
                    len: 1u64 << host_bits,
                })
            }
        }
    }

    fn parse_range(item: &str, lo: &str, hi: &str) -> crate::Result<Self> {
        let invalid = || ScanError::InvalidTarget(format!("Invalid range: {}", item));
        let start = IpAddr::from_str(lo).map_err(|_| invalid())?;

        let end = match (start, IpAddr::from_str(hi)) {
            (_, Ok(end)) => end,
            // 10.0.0.1-50 replaces the last octet
            (IpAddr::V4(s), Err(_)) => {
                let last: u8 = hi.parse().map_err(|_| invalid())?;
                let o = s.octets();
                IpAddr::V4(Ipv4Addr::new(o[0], o[1], o[2], last))
            }
            (IpAddr::V6(_), Err(_)) => return Err(invalid()),
        };

        match (start, end) {
            (IpAddr::V4(s), IpAddr::V4(e)) => {
                let (s, e) = (u32::from(s), u32::from(e));
                if s > e {
                    return Err(ScanError::InvalidTarget(
                        "Start IP must be less than or equal to end IP".to_string(),
                    ));
                }
                Ok(Self {
                    source: item.to_string(),
                    start: BlockStart::V4(s),
                    len: (e - s) as u64 + 1,
                })
            }
            (IpAddr::V6(s), IpAddr::V6(e)) => {
                let (s, e) = (u128::from(s), u128::from(e));
                if s > e {
                    return Err(ScanError::InvalidTarget(
                        "Start IP must be less than or equal to end IP".to_string(),
                    ));
                }
                if e - s >= MAX_BLOCK_ADDRESSES as u128 {
                    return Err(ScanError::InvalidTarget(format!(
                        "IPv6 range too large to scan: {}",
                        item
                    )));
                }
                Ok(Self {
                    source: item.to_string(),
                    start: BlockStart::V6(s),
                    len: (e - s) as u64 + 1,
                })
            }
            _ => Err(ScanError::InvalidTarget(
                "Start and end IP must be the same version".to_string(),
            )),
        }
    }

    /// Number of addresses in the block
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The item this block was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Address at `index`, `None` past the end
    pub fn nth(&self, index: u64) -> Option<IpAddr> {
        if index >= self.len {
            return None;
        }
        Some(match self.start {
            BlockStart::V4(start) => IpAddr::V4(Ipv4Addr::from(start + index as u32)),
            BlockStart::V6(start) => IpAddr::V6(Ipv6Addr::from(start + index as u128)),
        })
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.start, addr) {
            (BlockStart::V4(start), IpAddr::V4(a)) => {
                let a = u32::from(a) as u64;
                a >= start as u64 && a - (start as u64) < self.len
            }
            (BlockStart::V6(start), IpAddr::V6(a)) => {
                let a = u128::from(a);
                a >= start && a - start < self.len as u128
            }
            _ => false,
        }
    }

    /// Every address of the block, in order
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        (0..self.len).filter_map(move |i| self.nth(i))
    }
}

impl fmt::Display for TargetBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} addresses)", self.source, self.len)
    }
}

/// All blocks of a target specification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSpace {
    blocks: Vec<TargetBlock>,
}

impl AddressSpace {
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let blocks = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TargetBlock::parse)
            .collect::<crate::Result<Vec<_>>>()?;

        if blocks.is_empty() {
            return Err(ScanError::InvalidTarget("target is empty".to_string()));
        }
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[TargetBlock] {
        &self.blocks
    }

    /// Total number of addresses across all blocks
    pub fn len(&self) -> u64 {
        self.blocks.iter().map(TargetBlock::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
