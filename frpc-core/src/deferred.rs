//! Single-assignment promises for call header and trailer.
//!
//! [`Deferred`] is the settling side, [`Settled`] the awaiting side. A deferred
//! value settles at most once: the first `resolve`/`reject` wins and later
//! attempts return `false`. If every [`Deferred`] handle is dropped without
//! settling, the [`Settled`] future completes with [`RpcError::Unsettled`]
//! instead of hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::RpcError;

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<Result<T, RpcError>>>>>;

/// Settling side of a single-assignment promise.
///
/// Cloning yields another handle to the same promise, so several call sites
/// (a read loop and a drain-end hook, say) may race to settle it.
pub struct Deferred<T> {
    slot: Slot<T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> Deferred<T> {
    /// Create a pending promise.
    pub fn new() -> (Deferred<T>, Settled<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Deferred {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            Settled { rx },
        )
    }

    /// Settle with `result`.
    ///
    /// Returns `true` if this call settled the promise, `false` if it was
    /// already settled.
    pub fn settle(&self, result: Result<T, RpcError>) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // The awaiting side may be gone; settling still counts.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Settle with a value.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error.
    pub fn reject(&self, error: RpcError) -> bool {
        self.settle(Err(error))
    }

    /// Whether the promise has been settled.
    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Awaiting side of a single-assignment promise.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Settled<T> {
    rx: oneshot::Receiver<Result<T, RpcError>>,
}

impl<T> Settled<T> {
    /// A promise that is already resolved.
    pub fn resolved(value: T) -> Self {
        let (deferred, settled) = Deferred::new();
        deferred.resolve(value);
        settled
    }

    /// A promise that is already rejected.
    pub fn rejected(error: RpcError) -> Self {
        let (deferred, settled) = Deferred::new();
        deferred.reject(error);
        settled
    }

    /// Non-blocking check; returns the outcome if already settled.
    ///
    /// After this returns `Some`, the future must not be polled again.
    pub fn try_take(&mut self) -> Option<Result<T, RpcError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RpcError::Unsettled)),
        }
    }
}

impl<T> Future for Settled<T> {
    type Output = Result<T, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Unsettled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[tokio::test]
    async fn test_resolve() {
        let (deferred, settled) = Deferred::new();
        assert!(!deferred.is_settled());
        assert!(deferred.resolve(7));
        assert!(deferred.is_settled());
        assert_eq!(settled.await, Ok(7));
    }

    #[tokio::test]
    async fn test_first_settle_wins() {
        let (deferred, settled) = Deferred::new();
        let other = deferred.clone();

        assert!(other.reject(RpcError::new(Code::Canceled, "first")));
        assert!(!deferred.resolve("second"));
        assert_eq!(settled.await, Err(RpcError::new(Code::Canceled, "first")));
    }

    #[tokio::test]
    async fn test_dropped_deferred_does_not_hang() {
        let (deferred, settled) = Deferred::<u8>::new();
        drop(deferred);
        assert_eq!(settled.await, Err(RpcError::Unsettled));
    }

    #[tokio::test]
    async fn test_settle_after_receiver_dropped() {
        let (deferred, settled) = Deferred::new();
        drop(settled);
        assert!(deferred.resolve(1));
        assert!(deferred.is_settled());
    }

    #[tokio::test]
    async fn test_try_take() {
        let (deferred, mut settled) = Deferred::new();
        assert_eq!(settled.try_take(), None);
        deferred.resolve("done");
        assert_eq!(settled.try_take(), Some(Ok("done")));
    }

    #[tokio::test]
    async fn test_already_settled_constructors() {
        assert_eq!(Settled::resolved(3).await, Ok(3));
        assert_eq!(
            Settled::<u8>::rejected(RpcError::Unsettled).await,
            Err(RpcError::Unsettled)
        );
    }
}
