//! The three-part result of one RPC call.

use futures::StreamExt;

use crate::deferred::{Deferred, Settled};
use crate::error::RpcError;
use crate::event_buffer::{Drain, EventBuffer};
use crate::responder::Responder;

/// Result of invoking a method: a lazy response stream plus header and
/// trailer promises.
///
/// Every transport returns this shape, so code written against it does not
/// care whether the call went over frpc, gRPC or gRPC-Web. Dropping
/// `responses` before it ends cancels the call.
#[derive(Debug)]
pub struct RpcCall<Res, H, T> {
    /// Response messages in wire order.
    pub responses: Drain<Res>,
    /// Settles once the peer starts responding.
    pub header: Settled<H>,
    /// Settles once the call is over, on every path.
    pub trailer: Settled<T>,
}

impl<Res, H, T> RpcCall<Res, H, T> {
    /// Assemble a call from its parts.
    pub fn new(responses: Drain<Res>, header: Settled<H>, trailer: Settled<T>) -> Self {
        Self {
            responses,
            header,
            trailer,
        }
    }

    /// Create a call together with the [`Responder`] that drives it.
    ///
    /// # Example
    ///
    /// ```
    /// use frpc_core::{Metadata, RpcCall};
    /// use futures::StreamExt;
    ///
    /// # futures::executor::block_on(async {
    /// let (responder, call) = RpcCall::<&str, u16, Metadata>::responder();
    /// responder.header(200);
    /// responder.send("pong");
    /// responder.end(Metadata::new());
    ///
    /// let (responses, header, trailer) = call.into_parts();
    /// assert_eq!(header.await.unwrap(), 200);
    /// assert_eq!(responses.collect::<Vec<_>>().await, vec!["pong"]);
    /// assert!(trailer.await.unwrap().is_empty());
    /// # });
    /// ```
    pub fn responder() -> (Responder<Res, H, T>, RpcCall<Res, H, T>) {
        let buffer = EventBuffer::new();
        let (header, header_settled) = Deferred::new();
        let (trailer, trailer_settled) = Deferred::new();
        let call = RpcCall::new(buffer.drain(), header_settled, trailer_settled);
        (Responder::new(buffer, header, trailer), call)
    }

    /// Split into `(responses, header, trailer)`.
    pub fn into_parts(self) -> (Drain<Res>, Settled<H>, Settled<T>) {
        (self.responses, self.header, self.trailer)
    }

    /// Take the first response message once the call has completed.
    ///
    /// The response stream stays open until the trailer settles, so the call
    /// runs to completion; later messages are discarded. A rejected trailer is
    /// returned as the error. If the stream ends without a message, the header
    /// or trailer error is returned when there is one.
    pub async fn first_response(self) -> Result<Res, RpcError> {
        let RpcCall {
            mut responses,
            header,
            trailer,
        } = self;

        let Some(response) = responses.next().await else {
            header.await?;
            trailer.await?;
            return Err(RpcError::Protocol(
                "call completed without a response message".into(),
            ));
        };
        trailer.await?;
        drop(responses);
        Ok(response)
    }
}
