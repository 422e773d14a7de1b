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

//! Name resolution contract.

use crate::cancellation::CancelToken;
use futures::future::{self, BoxFuture, FutureExt};
use ipfs_engine_multiaddr::Multiaddr;
use std::io;

/// Turns a multiaddress into one or more concrete, dialable addresses.
///
/// Implementations expand `dns`/`dns4`/`dns6` segments into `ip4`/`ip6`
/// ones and must return the input unchanged when no such segment is
/// present. The trailing identity segment is never altered. Resolution
/// must observe the cancellation token and never block indefinitely.
pub trait Resolver: Send + Sync {
    fn resolve(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> BoxFuture<'static, io::Result<Vec<Multiaddr>>>;
}

/// Resolver that returns every address unchanged. The default for swarms
/// that only dial concrete addresses.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityResolver;

impl Resolver for IdentityResolver {
    fn resolve(
        &self,
        addr: &Multiaddr,
        _cancel: CancelToken,
    ) -> BoxFuture<'static, io::Result<Vec<Multiaddr>>> {
        future::ready(Ok(vec![addr.clone()])).boxed()
    }
}
