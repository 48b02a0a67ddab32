//! IPv4 CIDR blocks and subnet carving

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// An IPv4 network block such as `10.0.0.0/16`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Build a block, rejecting host bits outside the prefix
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        let input = format!("{}/{}", network, prefix);
        if prefix > 32 {
            return Err(CoreError::InvalidCidr {
                input,
                reason: "prefix length must be between 0 and 32".to_string(),
            });
        }
        if u32::from(network) & !mask(prefix) != 0 {
            return Err(CoreError::InvalidCidr {
                input,
                reason: "address has bits set outside the prefix".to_string(),
            });
        }
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Carve the `index`-th block of length `new_prefix` out of this one
    pub fn subnet(&self, new_prefix: u8, index: u32) -> Result<Ipv4Cidr> {
        if new_prefix < self.prefix || new_prefix > 32 {
            return Err(CoreError::InvalidCidr {
                input: self.to_string(),
                reason: format!("cannot carve /{} subnets", new_prefix),
            });
        }
        let available = 1u64 << u32::from(new_prefix - self.prefix);
        if u64::from(index) >= available {
            return Err(CoreError::InvalidCidr {
                input: self.to_string(),
                reason: format!(
                    "subnet index {} out of range, only {} /{} blocks fit",
                    index, available, new_prefix
                ),
            });
        }
        let step = 1u64 << (32 - u32::from(new_prefix));
        let start = u64::from(u32::from(self.network)) + u64::from(index) * step;
        // start stays below 2^32 because index < available
        Ipv4Cidr::new(Ipv4Addr::from(start as u32), new_prefix)
    }

    /// Whether `addr` lies inside this block
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }

    /// Whether two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidCidr {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <address>/<prefix>"))?;
        let network: Ipv4Addr = addr
            .parse()
            .map_err(|_| invalid("not a valid IPv4 address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| invalid("prefix length is not a number"))?;

        Ipv4Cidr::new(network, prefix).map_err(|e| match e {
            CoreError::InvalidCidr { reason, .. } => invalid(&reason),
            other => other,
        })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.size(), 65536);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["10.0.0.0", "10.0.0/16", "10.0.0.0/33", "10.0.0.0/x", "not-a-cidr"] {
            assert!(input.parse::<Ipv4Cidr>().is_err(), "{} should be rejected", input);
        }
    }

    #[test]
    fn test_parse_rejects_host_bits() {
        let err = "10.0.0.1/16".parse::<Ipv4Cidr>().unwrap_err();
        assert!(err.to_string().contains("outside the prefix"));
    }

    #[test]
    fn test_subnet_carving() {
        let base: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(base.subnet(20, 0).unwrap().to_string(), "10.0.0.0/20");
        assert_eq!(base.subnet(20, 1).unwrap().to_string(), "10.0.16.0/20");
        assert_eq!(base.subnet(20, 15).unwrap().to_string(), "10.0.240.0/20");
        assert!(base.subnet(20, 16).is_err());
        assert!(base.subnet(8, 0).is_err());
    }

    #[test]
    fn test_zero_prefix() {
        let all: Ipv4Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn test_overlaps() {
        let a: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let b: Ipv4Cidr = "10.0.128.0/17".parse().unwrap();
        let c: Ipv4Cidr = "10.1.0.0/16".parse().unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let cidr: Ipv4Cidr = serde_json::from_str("\"172.16.0.0/12\"").unwrap();
        assert_eq!(serde_json::to_string(&cidr).unwrap(), "\"172.16.0.0/12\"");
        assert!(serde_json::from_str::<Ipv4Cidr>("\"172.16.0.1/12\"").is_err());
    }
}
