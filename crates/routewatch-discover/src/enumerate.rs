//! Subnet enumeration.
//!
//! Expands a CIDR into the ordered list of host addresses to probe. Blocks
//! larger than [`MAX_ADDRESSES`] are refused so a scan stays bounded and
//! does not flood the target network.
//!
//! Prefixes up to /30 skip the network and broadcast addresses; /31 and
//! /32 yield every address. A bare IPv4 address is treated as a /32.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::{IpNet, Ipv4Net};

use crate::error::{DiscoverError, Result};

/// Largest accepted block, i.e. a /22.
pub const MAX_ADDRESSES: u64 = 1024;

/// A validated, restartable range of host addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    net: Ipv4Net,
}

impl AddressRange {
    /// Parse and bound-check a CIDR (or bare IPv4 address).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = |reason: String| DiscoverError::InvalidSubnet {
            input: input.to_string(),
            reason,
        };

        let net = match trimmed.parse::<IpNet>() {
            Ok(IpNet::V4(net)) => net,
            Ok(IpNet::V6(_)) => return Err(invalid("only IPv4 subnets are supported".to_string())),
            Err(cidr_err) => match trimmed.parse::<IpAddr>() {
                Ok(IpAddr::V4(addr)) => Ipv4Net::from(addr),
                Ok(IpAddr::V6(_)) => {
                    return Err(invalid("only IPv4 subnets are supported".to_string()))
                }
                Err(_) => return Err(invalid(cidr_err.to_string())),
            },
        };
        let net = net.trunc();

        check_address_count(&net.to_string(), block_size(net.prefix_len()))?;
        Ok(Self { net })
    }

    pub fn network(&self) -> Ipv4Net {
        self.net
    }

    /// Addresses in the block, including network and broadcast.
    pub fn block_size(&self) -> u64 {
        block_size(self.net.prefix_len())
    }

    /// Number of addresses `iter()` yields.
    pub fn len(&self) -> usize {
        self.net.hosts().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Host addresses in ascending order. Each call starts from the beginning.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.net.hosts()
    }

    pub fn to_vec(&self) -> Vec<Ipv4Addr> {
        self.iter().collect()
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.net)
    }
}

fn block_size(prefix_len: u8) -> u64 {
    1u64 << (32 - u32::from(prefix_len))
}

/// Refuse address counts above [`MAX_ADDRESSES`].
pub fn check_address_count(subnet: &str, count: u64) -> Result<()> {
    if count > MAX_ADDRESSES {
        return Err(DiscoverError::SubnetTooLarge {
            subnet: subnet.to_string(),
            count,
            limit: MAX_ADDRESSES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slash_30_has_two_hosts() {
        let range = AddressRange::parse("10.0.0.0/30").unwrap();
        let hosts = range.to_vec();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
        assert_eq!(range.len(), 2);
        assert_eq!(range.block_size(), 4);
    }

    #[test]
    fn test_slash_31_and_32_keep_every_address() {
        assert_eq!(AddressRange::parse("10.0.0.0/31").unwrap().len(), 2);
        let single = AddressRange::parse("10.0.0.9/32").unwrap();
        assert_eq!(single.to_vec(), vec![Ipv4Addr::new(10, 0, 0, 9)]);
    }

    #[test]
    fn test_bare_address_is_single_host() {
        let range = AddressRange::parse("192.168.88.1").unwrap();
        assert_eq!(range.to_vec(), vec![Ipv4Addr::new(192, 168, 88, 1)]);
    }

    #[test]
    fn test_host_bits_are_truncated() {
        let range = AddressRange::parse("10.1.2.77/24").unwrap();
        assert_eq!(range.network().to_string(), "10.1.2.0/24");
        assert_eq!(range.iter().next(), Some(Ipv4Addr::new(10, 1, 2, 1)));
    }

    #[test]
    fn test_ceiling_boundary() {
        let range = AddressRange::parse("10.0.0.0/22").unwrap();
        assert_eq!(range.block_size(), 1024);
        assert_eq!(range.len(), 1022);

        let err = AddressRange::parse("10.0.0.0/21").unwrap_err();
        assert!(matches!(
            err,
            DiscoverError::SubnetTooLarge {
                count: 2048,
                limit: 1024,
                ..
            }
        ));

        assert!(check_address_count("x", 1024).is_ok());
        assert!(matches!(
            check_address_count("x", 1025),
            Err(DiscoverError::SubnetTooLarge { count: 1025, .. })
        ));
    }

    #[test]
    fn test_unique_stable_order() {
        for prefix in 22..=32u8 {
            let range = AddressRange::parse(&format!("172.16.0.0/{prefix}")).unwrap();
            let first = range.to_vec();
            let second = range.to_vec();
            assert_eq!(first, second);
            assert_eq!(first.len(), range.len());
            let unique: HashSet<_> = first.iter().collect();
            assert_eq!(unique.len(), first.len());
            assert!(first.windows(2).all(|w| w[0] < w[1]));
            let expected = if prefix >= 31 {
                range.block_size()
            } else {
                range.block_size() - 2
            };
            assert_eq!(first.len() as u64, expected);
        }
    }

    #[test]
    fn test_invalid_input() {
        for bad in ["", "10.0.0.0/33", "10.0.0/24", "hello", "10.0.0.0/"] {
            let err = AddressRange::parse(bad).unwrap_err();
            assert!(err.is_validation(), "{bad}");
            assert!(matches!(err, DiscoverError::InvalidSubnet { .. }), "{bad}");
        }
        assert!(matches!(
            AddressRange::parse("fd00::/120"),
            Err(DiscoverError::InvalidSubnet { .. })
        ));
    }
}
