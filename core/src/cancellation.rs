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

//! Cooperative cancellation.
//!
//! [`cancellation()`] produces a single-shot [`Canceller`] paired with a
//! clonable [`CancelToken`]. Long-running operations take a token and either
//! poll [`CancelToken::is_cancelled`] between steps or race their I/O against
//! [`CancelToken::cancelled`] via [`CancelToken::guard`].

use futures::channel::oneshot;
use futures::future::{self, Either, FutureExt, Shared};
use std::fmt;
use std::future::Future;

/// Creates a connected canceller/token pair.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = oneshot::channel();
    (Canceller { tx }, CancelToken { rx: Some(rx.shared()) })
}

/// The firing end of a cancellation signal. Consumed by [`Canceller::cancel`];
/// dropping it without firing leaves the paired tokens pending forever.
#[derive(Debug)]
pub struct Canceller {
    tx: oneshot::Sender<()>,
}

impl Canceller {
    /// Fires the signal. Every clone of the paired token observes it.
    pub fn cancel(self) {
        let _ = self.tx.send(());
    }
}

/// The observing end of a cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    rx: Option<Shared<oneshot::Receiver<()>>>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn none() -> CancelToken {
        CancelToken { rx: None }
    }

    /// Whether the paired canceller has fired.
    pub fn is_cancelled(&self) -> bool {
        self.rx
            .as_ref()
            .map_or(false, |rx| matches!(rx.peek(), Some(Ok(()))))
    }

    /// Resolves once the paired canceller fires. Pending forever for
    /// [`CancelToken::none`] and for tokens whose canceller was dropped
    /// without firing.
    pub async fn cancelled(&self) {
        match &self.rx {
            None => future::pending().await,
            Some(rx) => match rx.clone().await {
                Ok(()) => (),
                Err(oneshot::Canceled) => future::pending().await,
            },
        }
    }

    /// Runs `fut` to completion unless this token fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        futures::pin_mut!(fut);
        let cancelled = self.cancelled();
        futures::pin_mut!(cancelled);
        match future::select(fut, cancelled).await {
            Either::Left((out, _)) => Ok(out),
            Either::Right(((), _)) => Err(Cancelled),
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The operation observed a fired cancellation signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("the operation was cancelled")]
pub struct Cancelled;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_observes_cancel() {
        let (canceller, token) = cancellation();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        canceller.cancel();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn none_never_fires() {
        assert!(!CancelToken::none().is_cancelled());
    }

    #[async_std::test]
    async fn guard_passes_output_through() {
        let (_canceller, token) = cancellation();
        assert_eq!(token.guard(future::ready(7)).await, Ok(7));
    }

    #[async_std::test]
    async fn guard_aborts_pending_work() {
        let (canceller, token) = cancellation();
        canceller.cancel();
        let res = token.guard(future::pending::<()>()).await;
        assert_eq!(res, Err(Cancelled));
    }

    #[async_std::test]
    async fn cancelled_resolves_for_every_clone() {
        let (canceller, token) = cancellation();
        let clone = token.clone();
        canceller.cancel();
        token.cancelled().await;
        clone.cancelled().await;
    }
}
