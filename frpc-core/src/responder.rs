//! Imperative producer side of an [`RpcCall`](crate::RpcCall).

use crate::deferred::Deferred;
use crate::error::RpcError;
use crate::event_buffer::EventBuffer;

/// Drives an [`RpcCall`](crate::RpcCall) from handler code.
///
/// Typical use is `header`, any number of `send`, then `end`. Each promise
/// settles once; later calls to `header`, `end` or `fail` are ignored.
///
/// Dropping a responder finishes the response stream. Promises that were
/// never settled then fail with [`RpcError::Unsettled`].
pub struct Responder<Res, H, T> {
    buffer: EventBuffer<Res>,
    header: Deferred<H>,
    trailer: Deferred<T>,
}

impl<Res, H, T> Responder<Res, H, T> {
    pub(crate) fn new(buffer: EventBuffer<Res>, header: Deferred<H>, trailer: Deferred<T>) -> Self {
        Self {
            buffer,
            header,
            trailer,
        }
    }

    /// Resolve the response header.
    pub fn header(&self, header: H) {
        self.header.resolve(header);
    }

    /// Queue one response message.
    ///
    /// Ignored once the call has ended or the consumer went away.
    pub fn send(&self, response: Res) {
        self.buffer.push(response);
    }

    /// Resolve the trailer and finish the response stream.
    ///
    /// A header that was never sent is rejected.
    pub fn end(&self, trailer: T) {
        self.header
            .reject(RpcError::internal("response ended before header was sent"));
        self.trailer.resolve(trailer);
        self.buffer.finish();
    }

    /// Fail the call: reject whichever promises are still pending and finish
    /// the response stream.
    pub fn fail(&self, error: RpcError) {
        self.header.reject(error.clone());
        self.trailer.reject(error);
        self.buffer.finish();
    }

    /// Whether the consumer abandoned the response stream.
    pub fn is_canceled(&self) -> bool {
        self.buffer.is_drain_ended()
    }

    /// Run `f` once if the consumer abandons the response stream.
    pub fn on_cancel<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.buffer.on_drain_end(f);
    }
}

impl<Res, H, T> std::fmt::Debug for Responder<Res, H, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("buffer", &self.buffer)
            .field("header", &self.header)
            .field("trailer", &self.trailer)
            .finish()
    }
}

impl<Res, H, T> Drop for Responder<Res, H, T> {
    fn drop(&mut self) {
        self.buffer.finish();
    }
}
