//! Address-family capability.
//!
//! The protocol core is written once against [`AddressFamily`] and instantiated
//! for IPv4 and IPv6.

use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::net::{Datagram, Payload};

/// EIGRP router IDs are 32-bit in both families.
pub type RouterId = Ipv4Addr;

pub trait AddressFamily:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + FromStr + Serialize + Send + Sync + 'static
{
    /// Short family name for logs and reports.
    const NAME: &'static str;
    const BITS: u8;
    /// The all-zero address; used as "no next hop" / "directly connected".
    const UNSPEC: Self;

    /// Group address EIGRP hellos and multicast updates are sent to.
    fn eigrp_multicast() -> Self;

    fn to_bits(self) -> u128;
    fn from_bits(bits: u128) -> Self;

    fn into_payload(dgram: Datagram<Self>) -> Payload;
    fn from_payload(payload: Payload) -> Option<Datagram<Self>>;

    fn is_unspec(self) -> bool {
        self == Self::UNSPEC
    }

    /// Network part of the address for the given prefix length.
    fn network(self, prefix_len: u8) -> Self {
        Self::from_bits(self.to_bits() & mask_bits(Self::BITS, prefix_len))
    }

    fn same_subnet(self, other: Self, prefix_len: u8) -> bool {
        self.network(prefix_len) == other.network(prefix_len)
    }
}

fn mask_bits(width: u8, prefix_len: u8) -> u128 {
    let width = u32::from(width);
    let plen = u32::from(prefix_len).min(width);
    if plen == 0 {
        return 0;
    }
    let full: u128 = if width == 128 { u128::MAX } else { (1u128 << width) - 1 };
    (full << (width - plen)) & full
}

impl AddressFamily for Ipv4Addr {
    const NAME: &'static str = "ipv4";
    const BITS: u8 = 32;
    const UNSPEC: Self = Ipv4Addr::UNSPECIFIED;

    fn eigrp_multicast() -> Self {
        Ipv4Addr::new(224, 0, 0, 10)
    }

    fn to_bits(self) -> u128 {
        u128::from(u32::from(self))
    }

    fn from_bits(bits: u128) -> Self {
        Ipv4Addr::from(bits as u32)
    }

    fn into_payload(dgram: Datagram<Self>) -> Payload {
        Payload::V4(dgram)
    }

    fn from_payload(payload: Payload) -> Option<Datagram<Self>> {
        match payload {
            Payload::V4(d) => Some(d),
            Payload::V6(_) => None,
        }
    }
}

impl AddressFamily for Ipv6Addr {
    const NAME: &'static str = "ipv6";
    const BITS: u8 = 128;
    const UNSPEC: Self = Ipv6Addr::UNSPECIFIED;

    fn eigrp_multicast() -> Self {
        Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xa)
    }

    fn to_bits(self) -> u128 {
        u128::from(self)
    }

    fn from_bits(bits: u128) -> Self {
        Ipv6Addr::from(bits)
    }

    fn into_payload(dgram: Datagram<Self>) -> Payload {
        Payload::V6(dgram)
    }

    fn from_payload(payload: Payload) -> Option<Datagram<Self>> {
        match payload {
            Payload::V6(d) => Some(d),
            Payload::V4(_) => None,
        }
    }
}

/// Parses `addr/len`. A missing `/len` means a host prefix.
pub fn parse_prefix<A: AddressFamily>(s: &str) -> Option<(A, u8)> {
    let (addr, plen) = match s.split_once('/') {
        Some((a, l)) => (a, l.parse::<u8>().ok()?),
        None => (s, A::BITS),
    };
    if plen > A::BITS {
        return None;
    }
    let addr = A::from_str(addr.trim()).ok()?;
    Some((addr, plen))
}

/// `Display` helper for `(address, prefix_len)` pairs.
pub struct Prefix<A>(pub A, pub u8);

impl<A: AddressFamily> fmt::Display for Prefix<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}
