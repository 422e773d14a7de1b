// Copyright 2019 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Implementation of the textual multiaddr format.
//!
//! A [`Multiaddr`] is an ordered, non-empty sequence of protocol segments
//! such as `/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDM…`. Addresses are value
//! types: two multiaddresses are equal iff their canonical textual forms are
//! equal. The legacy `/ipfs/<peer-id>` notation is accepted on input and
//! canonicalized to `/p2p/<peer-id>`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::convert::TryFrom;
use std::fmt;
use std::iter::FromIterator;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// A single `/name/value` segment of a [`Multiaddr`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Dns(String),
    Dns4(String),
    Dns6(String),
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    /// In-memory point-to-point channel, identified by an arbitrary port
    /// number. Only dialable within the local process.
    Memory(u64),
    /// The identity segment carrying a base58-encoded peer id.
    P2p(String),
    Tcp(u16),
    Udp(u16),
    Ws,
    Wss,
}

impl Protocol {
    /// The protocol name as it appears in the textual form.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Dns(_) => "dns",
            Protocol::Dns4(_) => "dns4",
            Protocol::Dns6(_) => "dns6",
            Protocol::Ip4(_) => "ip4",
            Protocol::Ip6(_) => "ip6",
            Protocol::Memory(_) => "memory",
            Protocol::P2p(_) => "p2p",
            Protocol::Tcp(_) => "tcp",
            Protocol::Udp(_) => "udp",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
        }
    }

    /// Parses one segment, pulling the value part out of `parts` when the
    /// protocol requires one.
    fn parse<'a>(
        name: &str,
        parts: &mut impl Iterator<Item = &'a str>,
    ) -> Result<Protocol, Error> {
        let mut value = || {
            parts
                .next()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::MissingValue(name.to_owned()))
        };
        let invalid = |v: &str| Error::InvalidValue {
            protocol: name.to_owned(),
            value: v.to_owned(),
        };
        let proto = match name {
            "dns" => Protocol::Dns(value()?.to_owned()),
            "dns4" => Protocol::Dns4(value()?.to_owned()),
            "dns6" => Protocol::Dns6(value()?.to_owned()),
            "ip4" => {
                let v = value()?;
                Protocol::Ip4(v.parse().map_err(|_| invalid(v))?)
            }
            "ip6" => {
                let v = value()?;
                Protocol::Ip6(v.parse().map_err(|_| invalid(v))?)
            }
            "memory" => {
                let v = value()?;
                Protocol::Memory(v.parse().map_err(|_| invalid(v))?)
            }
            // `/ipfs/<id>` is the legacy spelling of `/p2p/<id>`.
            "p2p" | "ipfs" => {
                let v = value()?;
                if bs58::decode(v).into_vec().is_err() {
                    return Err(Error::InvalidPeerId(v.to_owned()));
                }
                Protocol::P2p(v.to_owned())
            }
            "tcp" => {
                let v = value()?;
                Protocol::Tcp(v.parse().map_err(|_| invalid(v))?)
            }
            "udp" => {
                let v = value()?;
                Protocol::Udp(v.parse().map_err(|_| invalid(v))?)
            }
            "ws" => Protocol::Ws,
            "wss" => Protocol::Wss,
            _ => return Err(Error::UnknownProtocol(name.to_owned())),
        };
        Ok(proto)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Dns(host) => write!(f, "/dns/{}", host),
            Protocol::Dns4(host) => write!(f, "/dns4/{}", host),
            Protocol::Dns6(host) => write!(f, "/dns6/{}", host),
            Protocol::Ip4(ip) => write!(f, "/ip4/{}", ip),
            Protocol::Ip6(ip) => write!(f, "/ip6/{}", ip),
            Protocol::Memory(port) => write!(f, "/memory/{}", port),
            Protocol::P2p(id) => write!(f, "/p2p/{}", id),
            Protocol::Tcp(port) => write!(f, "/tcp/{}", port),
            Protocol::Udp(port) => write!(f, "/udp/{}", port),
            Protocol::Ws => f.write_str("/ws"),
            Protocol::Wss => f.write_str("/wss"),
        }
    }
}

/// A self-describing, layered network address.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Multiaddr {
    segments: Vec<Protocol>,
}

impl Multiaddr {
    /// Creates an address without any segment.
    ///
    /// An empty multiaddress never parses; this exists so addresses can be
    /// assembled segment by segment with [`Multiaddr::push`] or `collect()`.
    pub fn empty() -> Self {
        Multiaddr { segments: Vec::new() }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterates over the segments in order.
    pub fn iter(&self) -> impl Iterator<Item = &Protocol> {
        self.segments.iter()
    }

    /// Appends a segment.
    pub fn push(&mut self, p: Protocol) {
        self.segments.push(p)
    }

    /// Removes and returns the last segment.
    pub fn pop(&mut self) -> Option<Protocol> {
        self.segments.pop()
    }

    /// The base58 peer id of the trailing identity segment, if any.
    pub fn peer_id(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Protocol::P2p(id)) => Some(id),
            _ => None,
        }
    }

    /// Whether the address terminates in an identity segment.
    pub fn has_peer_id(&self) -> bool {
        self.peer_id().is_some()
    }

    /// Returns this address extended with a trailing `/p2p/<id>` segment.
    ///
    /// If the address already carries an identity segment it is returned
    /// unchanged.
    pub fn with_p2p(&self, id: &str) -> Multiaddr {
        if self.has_peer_id() {
            return self.clone();
        }
        let mut addr = self.clone();
        addr.push(Protocol::P2p(id.to_owned()));
        addr
    }

    /// Returns this address without a trailing identity segment.
    pub fn without_p2p(&self) -> Multiaddr {
        let mut addr = self.clone();
        if addr.has_peer_id() {
            addr.pop();
        }
        addr
    }

    /// Whether `prefix` is a segment-wise prefix of (or equal to) this
    /// address.
    pub fn starts_with(&self, prefix: &Multiaddr) -> bool {
        if prefix.segments.len() > self.segments.len() {
            return false;
        }
        self.segments.iter().zip(&prefix.segments).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            seg.fmt(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Multiaddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::EmptyAddress);
        }
        let mut parts = s.split('/');
        if parts.next() != Some("") {
            return Err(Error::InvalidFormat(s.to_owned()));
        }
        let mut segments = Vec::new();
        while let Some(name) = parts.next() {
            if name.is_empty() {
                return Err(Error::InvalidFormat(s.to_owned()));
            }
            segments.push(Protocol::parse(name, &mut parts)?);
        }
        if segments.is_empty() {
            return Err(Error::EmptyAddress);
        }
        Ok(Multiaddr { segments })
    }
}

impl TryFrom<&str> for Multiaddr {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Error> {
        s.parse()
    }
}

impl FromIterator<Protocol> for Multiaddr {
    fn from_iter<T: IntoIterator<Item = Protocol>>(iter: T) -> Self {
        Multiaddr { segments: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a Multiaddr {
    type Item = &'a Protocol;
    type IntoIter = std::slice::Iter<'a, Protocol>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl Serialize for Multiaddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Multiaddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Error while parsing a multiaddress from its textual form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("multiaddress has no segments")]
    EmptyAddress,
    #[error("multiaddress must start with `/`: `{0}`")]
    InvalidFormat(String),
    #[error("unknown protocol `{0}`")]
    UnknownProtocol(String),
    #[error("protocol `{0}` requires a value")]
    MissingValue(String),
    #[error("invalid value `{value}` for protocol `{protocol}`")]
    InvalidValue { protocol: String, value: String },
    #[error("`{0}` is not a base58 peer id")]
    InvalidPeerId(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck};
    use rand::Rng;

    #[test]
    fn parse_and_display_round_trip() {
        let cases = [
            "/ip4/127.0.0.1/tcp/4001",
            "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
            "/ip6/::1/tcp/4001",
            "/dns4/bootstrap.libp2p.io/tcp/443/wss",
            "/dns/example.com/udp/53",
            "/memory/1234",
            "/ip4/9.8.7.6/udp/4023/ws",
        ];
        for case in cases.iter() {
            let addr: Multiaddr = case.parse().unwrap();
            assert_eq!(&addr.to_string(), case);
        }
    }

    #[test]
    fn legacy_ipfs_is_canonicalized_to_p2p() {
        let legacy: Multiaddr = "/ip4/1.2.3.4/tcp/4001/ipfs/QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64"
            .parse()
            .unwrap();
        let modern: Multiaddr = "/ip4/1.2.3.4/tcp/4001/p2p/QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64"
            .parse()
            .unwrap();
        assert_eq!(legacy, modern);
        assert!(legacy.to_string().contains("/p2p/"));
    }

    #[test]
    fn peer_id_accessors() {
        let addr: Multiaddr = "/ip4/1.2.3.4/tcp/4001/p2p/QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64"
            .parse()
            .unwrap();
        assert_eq!(addr.peer_id(), Some("QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64"));
        assert!(!"/ip4/1.2.3.4/tcp/4001".parse::<Multiaddr>().unwrap().has_peer_id());
        // An identity segment in the middle does not identify the peer.
        let mid: Multiaddr = "/p2p/QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64/tcp/4001"
            .parse()
            .unwrap();
        assert_eq!(mid.peer_id(), None);
    }

    #[test]
    fn with_p2p_appends_once() {
        let addr: Multiaddr = "/ip4/1.2.3.4/tcp/4001".parse().unwrap();
        let id = "QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64";
        let extended = addr.with_p2p(id);
        assert_eq!(extended.peer_id(), Some(id));
        assert_eq!(extended.with_p2p(id), extended);
        assert_eq!(extended.without_p2p(), addr);
    }

    #[test]
    fn starts_with_is_segment_wise() {
        let addr: Multiaddr = "/ip4/10.0.0.1/tcp/4001".parse().unwrap();
        assert!(addr.starts_with(&"/ip4/10.0.0.1".parse().unwrap()));
        assert!(addr.starts_with(&addr.clone()));
        assert!(!addr.starts_with(&"/ip4/10.0.0.2".parse().unwrap()));
        assert!(!addr.starts_with(&"/ip4/10.0.0.1/tcp/4001/ws".parse().unwrap()));
        // Textual prefixes that split a segment value must not match.
        assert!(!addr.starts_with(&"/ip4/10.0.0.1/tcp/4".parse().unwrap()));
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<Multiaddr>(), Err(Error::EmptyAddress));
        assert_eq!("/".parse::<Multiaddr>(), Err(Error::InvalidFormat("/".into())));
        assert_eq!(
            "ip4/1.2.3.4".parse::<Multiaddr>(),
            Err(Error::InvalidFormat("ip4/1.2.3.4".into()))
        );
        assert_eq!(
            "/quic/1".parse::<Multiaddr>(),
            Err(Error::UnknownProtocol("quic".into()))
        );
        assert_eq!(
            "/ip4".parse::<Multiaddr>(),
            Err(Error::MissingValue("ip4".into()))
        );
        assert_eq!(
            "/tcp/hello".parse::<Multiaddr>(),
            Err(Error::InvalidValue { protocol: "tcp".into(), value: "hello".into() })
        );
        assert_eq!(
            "/p2p/0OIl".parse::<Multiaddr>(),
            Err(Error::InvalidPeerId("0OIl".into()))
        );
    }

    #[test]
    fn serde_uses_textual_form() {
        let addr: Multiaddr = "/dns4/example.com/tcp/443/wss".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"/dns4/example.com/tcp/443/wss\"");
        let back: Multiaddr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[derive(Clone, Debug)]
    struct Ma(Multiaddr);

    impl Arbitrary for Ma {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            let len = g.gen_range(1, 6);
            let segments = (0..len)
                .map(|_| match g.gen_range(0, 9) {
                    0 => Protocol::Ip4(Ipv4Addr::from(g.gen::<u32>())),
                    1 => Protocol::Ip6(Ipv6Addr::from(g.gen::<u128>())),
                    2 => Protocol::Tcp(g.gen()),
                    3 => Protocol::Udp(g.gen()),
                    4 => Protocol::Memory(g.gen()),
                    5 => Protocol::Dns4(format!("host-{}.example", g.gen::<u16>())),
                    6 => Protocol::Ws,
                    7 => Protocol::Wss,
                    _ => Protocol::P2p(
                        bs58::encode(g.gen::<[u8; 16]>()).into_string(),
                    ),
                })
                .collect();
            Ma(Multiaddr { segments })
        }
    }

    #[test]
    fn round_trip_any_address() {
        fn prop(ma: Ma) -> bool {
            ma.0.to_string().parse::<Multiaddr>() == Ok(ma.0)
        }
        QuickCheck::new().quickcheck(prop as fn(Ma) -> bool)
    }
}
