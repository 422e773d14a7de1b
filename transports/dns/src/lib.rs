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

//! DNS resolution for multiaddresses.
//!
//! [`DnsResolver`] expands the first `dns`, `dns4` or `dns6` segment of an
//! address into one address per resolved IP, leaving every other segment —
//! the trailing identity segment in particular — untouched. Addresses
//! without DNS segments pass through unchanged.

use async_std_resolver::AsyncStdResolver;
use futures::future::{BoxFuture, FutureExt};
use ipfs_engine_core::cancellation::CancelToken;
use ipfs_engine_core::resolver::Resolver;
use ipfs_engine_multiaddr::{Multiaddr, Protocol};
use std::io;
use std::net::IpAddr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveError;

/// Which address family a DNS segment asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn admits(self, ip: &IpAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => ip.is_ipv4(),
            Family::V6 => ip.is_ipv6(),
        }
    }
}

/// The first DNS segment of `addr`, as (index, hostname, family).
fn dns_segment(addr: &Multiaddr) -> Option<(usize, String, Family)> {
    addr.iter().enumerate().find_map(|(i, seg)| match seg {
        Protocol::Dns(host) => Some((i, host.clone(), Family::Any)),
        Protocol::Dns4(host) => Some((i, host.clone(), Family::V4)),
        Protocol::Dns6(host) => Some((i, host.clone(), Family::V6)),
        _ => None,
    })
}

/// One address per IP: `addr` with the segment at `index` replaced by the
/// IP and everything else kept verbatim.
fn expand(addr: &Multiaddr, index: usize, ips: impl IntoIterator<Item = IpAddr>) -> Vec<Multiaddr> {
    ips.into_iter()
        .map(|ip| {
            addr.iter()
                .enumerate()
                .map(|(i, seg)| {
                    if i == index {
                        match ip {
                            IpAddr::V4(ip) => Protocol::Ip4(ip),
                            IpAddr::V6(ip) => Protocol::Ip6(ip),
                        }
                    } else {
                        seg.clone()
                    }
                })
                .collect()
        })
        .collect()
}

/// Resolver backed by the system's DNS configuration.
#[derive(Clone)]
pub struct DnsResolver {
    resolver: AsyncStdResolver,
}

impl DnsResolver {
    /// Resolver using the host's DNS configuration (`/etc/resolv.conf`).
    pub async fn system() -> Result<Self, ResolveError> {
        let resolver = async_std_resolver::resolver_from_system_conf().await?;
        Ok(DnsResolver { resolver })
    }

    /// Resolver with an explicit configuration.
    pub async fn custom(config: ResolverConfig, opts: ResolverOpts) -> Result<Self, ResolveError> {
        let resolver = async_std_resolver::resolver(config, opts).await?;
        Ok(DnsResolver { resolver })
    }
}

impl Resolver for DnsResolver {
    fn resolve(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> BoxFuture<'static, io::Result<Vec<Multiaddr>>> {
        let addr = addr.clone();
        let resolver = self.resolver.clone();
        async move {
            let (index, host, family) = match dns_segment(&addr) {
                Some(segment) => segment,
                None => return Ok(vec![addr]),
            };
            log::debug!("resolving {} for {}", host, addr);
            let lookup = cancel
                .guard(resolver.lookup_ip(host.as_str()))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::Interrupted, "dns resolution cancelled"))?
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let ips: Vec<IpAddr> = lookup.iter().filter(|ip| family.admits(ip)).collect();
            log::trace!("{} resolved to {} address(es)", host, ips.len());
            Ok(expand(&addr, index, ips))
        }
        .boxed()
    }
}
