//! Canonical CIDR prefix type.
//!
//! All target matching in the engine goes through [`Prefix`], which compares
//! parsed network/mask values. Textual prefix comparison is forbidden: a
//! substring match would select `1.1.179.0/24` for target `1.1.1.0/24`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefixError {
    #[error("invalid CIDR syntax: {0}")]
    Syntax(String),
    #[error("invalid network address: {0}")]
    Address(String),
    #[error("mask length /{len} out of range for {addr}")]
    MaskRange { addr: String, len: u32 },
}

/// An IP prefix with the host bits zeroed.
///
/// IPv4 networks occupy the low 32 bits of `network`. A bare address parses
/// as a full-length mask (`1.1.1.1` == `1.1.1.1/32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix {
    network: u128,
    mask_len: u8,
    v6: bool,
}

impl Prefix {
    fn bit_width(&self) -> u32 {
        if self.v6 {
            128
        } else {
            32
        }
    }

    fn mask(&self, len: u8) -> u128 {
        let family = if self.v6 {
            u128::MAX
        } else {
            u32::MAX as u128
        };
        if len == 0 {
            0
        } else {
            family & (family << (self.bit_width() - len as u32))
        }
    }

    pub fn mask_len(&self) -> u8 {
        self.mask_len
    }

    pub fn is_ipv6(&self) -> bool {
        self.v6
    }

    /// True when `other` lies inside this network (equal or longer mask).
    pub fn contains(&self, other: &Prefix) -> bool {
        self.v6 == other.v6
            && self.mask_len <= other.mask_len
            && (other.network & self.mask(self.mask_len)) == self.network
    }

    /// True when `self` is a proper subnet of `other`: contained, with a
    /// strictly longer mask.
    pub fn is_more_specific_of(&self, other: &Prefix) -> bool {
        other.contains(self) && self.mask_len > other.mask_len
    }

    /// Exact match or proper subnet containment against a target resource.
    pub fn matches_target(&self, target: &Prefix) -> bool {
        self == target || self.is_more_specific_of(target)
    }
}

impl FromStr for Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PrefixError::Syntax(s.to_string()));
        }
        let (addr_part, len_part) = match s.split_once('/') {
            Some((a, l)) => (a, Some(l)),
            None => (s, None),
        };
        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| PrefixError::Address(addr_part.to_string()))?;
        let (bits, width, v6) = match addr {
            IpAddr::V4(a) => (u32::from(a) as u128, 32u32, false),
            IpAddr::V6(a) => (u128::from(a), 128u32, true),
        };
        let mask_len: u32 = match len_part {
            Some(l) => l
                .parse()
                .map_err(|_| PrefixError::Syntax(s.to_string()))?,
            None => width,
        };
        if mask_len > width {
            return Err(PrefixError::MaskRange {
                addr: addr_part.to_string(),
                len: mask_len,
            });
        }
        let mut prefix = Prefix {
            network: bits,
            mask_len: mask_len as u8,
            v6,
        };
        // canonical form: zero the host bits
        prefix.network &= prefix.mask(prefix.mask_len);
        Ok(prefix)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.v6 {
            write!(f, "{}/{}", Ipv6Addr::from(self.network), self.mask_len)
        } else {
            write!(
                f,
                "{}/{}",
                Ipv4Addr::from(self.network as u32),
                self.mask_len
            )
        }
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
