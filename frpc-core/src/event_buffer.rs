//! Push-to-pull conduit between a transport and a response consumer.
//!
//! A transport pushes decoded values into an [`EventBuffer`] from its callbacks
//! or read loop. The consumer pulls them lazily through the [`Drain`] stream.
//!
//! # Cancellation
//!
//! Dropping a [`Drain`] (or calling [`Drain::close`]) before the producer has
//! called [`EventBuffer::finish`] ends the drain: the registered drain-end hook
//! runs exactly once and every later [`EventBuffer::push`] is silently ignored.
//! This is the only path by which consumer-side cancellation reaches a transport.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use futures::Stream;

type DrainEndHook = Box<dyn FnOnce() + Send>;

/// Lifecycle of an [`EventBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// Accepting pushes; the consumer may await more values.
    Open,
    /// The consumer abandoned the drain and the drain-end hook is running.
    DrainRequested,
    /// The consumer abandoned the drain and the hook has run.
    DrainEnded,
    /// The producer signaled that no more values will arrive.
    Finished,
}

impl BufferState {
    fn accepts_push(self) -> bool {
        self == BufferState::Open
    }
}

struct Inner<T> {
    queue: VecDeque<T>,
    state: BufferState,
    waker: Option<Waker>,
    on_drain_end: Option<DrainEndHook>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn end_drain(&self) {
        let hook = {
            let mut inner = self.lock();
            if inner.state != BufferState::Open {
                return;
            }
            inner.state = BufferState::DrainRequested;
            inner.queue.clear();
            inner.waker = None;
            inner.on_drain_end.take()
        };

        // Run outside the lock so the hook may touch the buffer.
        if let Some(hook) = hook {
            hook();
        }

        self.lock().state = BufferState::DrainEnded;
    }
}

/// Producer handle of a cancellable, ordered value buffer.
///
/// Cloning yields another handle to the same buffer.
///
/// # Example
///
/// ```
/// use frpc_core::EventBuffer;
/// use futures::StreamExt;
///
/// # futures::executor::block_on(async {
/// let buffer = EventBuffer::new();
/// let drain = buffer.drain();
///
/// buffer.push(1);
/// buffer.push(2);
/// buffer.finish();
///
/// assert_eq!(drain.collect::<Vec<_>>().await, vec![1, 2]);
/// # });
/// ```
pub struct EventBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for EventBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("EventBuffer")
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .finish()
    }
}

impl<T> EventBuffer<T> {
    /// Create an open buffer with no drain-end hook.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    state: BufferState::Open,
                    waker: None,
                    on_drain_end: None,
                }),
            }),
        }
    }

    /// Create an open buffer with a drain-end hook.
    pub fn with_drain_end<F>(on_drain_end: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let buffer = Self::new();
        buffer.on_drain_end(on_drain_end);
        buffer
    }

    /// Register the hook that runs when the consumer abandons the drain.
    ///
    /// Replaces a previously registered hook that has not run yet. If the
    /// drain has already ended (or is ending), the hook runs immediately; on a
    /// finished buffer it is dropped.
    pub fn on_drain_end<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut inner = self.shared.lock();
            match inner.state {
                BufferState::Open => {
                    inner.on_drain_end = Some(Box::new(hook));
                    return;
                }
                BufferState::Finished => return,
                // The slot was already taken by `end_drain`.
                BufferState::DrainRequested | BufferState::DrainEnded => {}
            }
        }
        hook();
    }

    /// Enqueue a value and wake the consumer if it is waiting.
    ///
    /// A no-op once the buffer is finished or the drain has ended.
    pub fn push(&self, value: T) {
        let waker = {
            let mut inner = self.shared.lock();
            if !inner.state.accepts_push() {
                return;
            }
            inner.queue.push_back(value);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Mark the end of input.
    ///
    /// Values already queued are still delivered; afterwards the drain ends
    /// normally. A no-op if the drain has already ended.
    pub fn finish(&self) {
        let waker = {
            let mut inner = self.shared.lock();
            if !inner.state.accepts_push() {
                return;
            }
            inner.state = BufferState::Finished;
            // A finished buffer never runs its hook.
            inner.on_drain_end = None;
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BufferState {
        self.shared.lock().state
    }

    /// Whether the consumer has abandoned the drain.
    pub fn is_drain_ended(&self) -> bool {
        matches!(
            self.state(),
            BufferState::DrainRequested | BufferState::DrainEnded
        )
    }

    /// Return the consumer view of this buffer.
    ///
    /// The drain is single-consumer: values are split between drains if
    /// this is called more than once.
    pub fn drain(&self) -> Drain<T> {
        Drain {
            shared: self.shared.clone(),
            done: false,
        }
    }
}

/// Lazily pulled, forward-only stream of the values pushed into an
/// [`EventBuffer`].
///
/// Ends once the producer finished and the queue is empty. Dropping it early
/// triggers the buffer's drain-end hook.
#[must_use = "streams do nothing unless polled"]
pub struct Drain<T> {
    shared: Arc<Shared<T>>,
    done: bool,
}

impl<T> Drain<T> {
    /// Abandon the stream now instead of on drop.
    pub fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.shared.end_drain();
        }
    }
}

impl<T> std::fmt::Debug for Drain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drain").field("done", &self.done).finish()
    }
}

impl<T> Stream for Drain<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut inner = this.shared.lock();
        if let Some(value) = inner.queue.pop_front() {
            return Poll::Ready(Some(value));
        }
        match inner.state {
            BufferState::Open => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            BufferState::Finished | BufferState::DrainRequested | BufferState::DrainEnded => {
                drop(inner);
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> Drop for Drain<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_hook() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        (count, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_values_pushed_before_drain_keep_order() {
        let buffer = EventBuffer::new();
        for i in 0..5 {
            buffer.push(i);
        }
        buffer.finish();

        let values: Vec<_> = buffer.drain().collect().await;
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_finish_without_values_ends_stream() {
        let buffer = EventBuffer::<u32>::new();
        let mut drain = buffer.drain();
        buffer.finish();

        assert_eq!(drain.next().await, None);
        assert_eq!(buffer.state(), BufferState::Finished);
    }

    #[tokio::test]
    async fn test_push_resumes_waiting_consumer() {
        let buffer = EventBuffer::new();
        let mut drain = buffer.drain();

        let producer = buffer.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.push("late");
            producer.finish();
        });

        assert_eq!(drain.next().await, Some("late"));
        assert_eq!(drain.next().await, None);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_early_drop_runs_hook_once_and_ignores_pushes() {
        let (count, hook) = counting_hook();
        let buffer = EventBuffer::with_drain_end(hook);
        buffer.push(1);
        buffer.push(2);

        let mut drain = buffer.drain();
        assert_eq!(drain.next().await, Some(1));
        drop(drain);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.state(), BufferState::DrainEnded);

        buffer.push(3);
        buffer.finish();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.state(), BufferState::DrainEnded);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (count, hook) = counting_hook();
        let buffer = EventBuffer::<u8>::with_drain_end(hook);
        let mut drain = buffer.drain();

        drain.close();
        drain.close();
        assert_eq!(drain.next().await, None);
        drop(drain);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_after_finish_does_not_run_hook() {
        let (count, hook) = counting_hook();
        let buffer = EventBuffer::with_drain_end(hook);
        buffer.push(1);
        buffer.finish();

        let mut drain = buffer.drain();
        assert_eq!(drain.next().await, Some(1));
        drop(drain);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hook_sees_drain_requested_and_may_push() {
        let buffer = EventBuffer::<u8>::new();
        let observed = Arc::new(Mutex::new(None));

        let inner_buffer = buffer.clone();
        let inner_observed = observed.clone();
        buffer.on_drain_end(move || {
            inner_buffer.push(9);
            *inner_observed.lock().unwrap() = Some(inner_buffer.state());
        });

        drop(buffer.drain());
        assert_eq!(*observed.lock().unwrap(), Some(BufferState::DrainRequested));
        assert_eq!(buffer.state(), BufferState::DrainEnded);
    }

    #[test]
    fn test_hook_registered_after_drain_end_runs_immediately() {
        let buffer = EventBuffer::<u8>::new();
        drop(buffer.drain());

        let (count, hook) = counting_hook();
        buffer.on_drain_end(hook);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_registered_while_hook_runs_runs_immediately() {
        let buffer = EventBuffer::<u8>::new();
        let (count, late_hook) = counting_hook();

        let inner_buffer = buffer.clone();
        buffer.on_drain_end(move || inner_buffer.on_drain_end(late_hook));

        drop(buffer.drain());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.state(), BufferState::DrainEnded);
    }

    #[test]
    fn test_hook_registered_after_finish_never_runs() {
        let buffer = EventBuffer::<u8>::new();
        buffer.finish();

        let (count, hook) = counting_hook();
        buffer.on_drain_end(hook);
        drop(buffer.drain());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_is_drain_ended() {
        let buffer = EventBuffer::<u8>::new();
        assert!(!buffer.is_drain_ended());
        drop(buffer.drain());
        assert!(buffer.is_drain_ended());
    }
}
