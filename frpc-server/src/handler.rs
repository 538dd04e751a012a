//! Handler trait and adapters.

use std::future::Future;
use std::marker::PhantomData;

use frpc_core::{Drain, Metadata, Responder, RpcCall};

use crate::context::{CallContext, ServerHeader};

/// What a handler returns: responses plus header and trailer promises.
pub type ServerCall<Res> = RpcCall<Res, ServerHeader, Metadata>;

/// Imperative builder for a [`ServerCall`].
pub type ServerResponder<Res> = Responder<Res, ServerHeader, Metadata>;

/// Serves one method.
///
/// Implemented for every `Fn(Drain<Req>, CallContext) -> ServerCall<Res>`
/// closure. The handler is invoked as soon as a request arrives; request
/// messages keep flowing into `requests` while it runs. Dropping `requests`
/// stops reading the request body.
pub trait FrpcHandler<Req, Res>: Clone + Send + Sync + 'static {
    fn call(&self, requests: Drain<Req>, context: CallContext) -> ServerCall<Res>;
}

impl<F, Req, Res> FrpcHandler<Req, Res> for F
where
    F: Fn(Drain<Req>, CallContext) -> ServerCall<Res> + Clone + Send + Sync + 'static,
{
    fn call(&self, requests: Drain<Req>, context: CallContext) -> ServerCall<Res> {
        self(requests, context)
    }
}

/// Adapt an async function driving a [`ServerResponder`] into a handler.
///
/// The function runs on its own task. If it returns without calling
/// [`end`](Responder::end) the response stream finishes and the unsettled
/// promises fail, which aborts the HTTP response.
///
/// ```
/// use frpc_server::{ServerHeader, responder_fn};
/// use futures::StreamExt;
///
/// let handler = responder_fn(|mut requests, _context, responder| async move {
///     let name: String = requests.next().await.unwrap_or_default();
///     responder.header(ServerHeader::ok());
///     responder.send(format!("hello {name}"));
///     responder.end(Default::default());
/// });
/// # let _ = handler;
/// ```
pub fn responder_fn<F, Fut, Req, Res>(f: F) -> ResponderFn<F, Req, Res>
where
    F: Fn(Drain<Req>, CallContext, ServerResponder<Res>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    ResponderFn {
        f,
        _marker: PhantomData,
    }
}

/// Handler returned by [`responder_fn`].
pub struct ResponderFn<F, Req, Res> {
    f: F,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<F: Clone, Req, Res> Clone for ResponderFn<F, Req, Res> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: PhantomData,
        }
    }
}

impl<F, Fut, Req, Res> FrpcHandler<Req, Res> for ResponderFn<F, Req, Res>
where
    F: Fn(Drain<Req>, CallContext, ServerResponder<Res>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    Req: 'static,
    Res: 'static,
{
    fn call(&self, requests: Drain<Req>, context: CallContext) -> ServerCall<Res> {
        let (responder, call) = ServerCall::responder();
        tokio::spawn((self.f)(requests, context, responder));
        call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use frpc_core::EventBuffer;
    use futures::StreamExt;

    fn context() -> CallContext {
        let (parts, _) = Request::new(()).into_parts();
        CallContext::from_parts(&parts)
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = |_requests: Drain<u8>, _context: CallContext| {
            let (responder, call) = ServerCall::<u8>::responder();
            responder.header(ServerHeader::new(StatusCode::CREATED));
            responder.send(1);
            responder.end(Metadata::new());
            call
        };

        let buffer = EventBuffer::new();
        let call = FrpcHandler::call(&handler, buffer.drain(), context());
        let (responses, header, trailer) = call.into_parts();
        assert_eq!(header.await.unwrap().status, StatusCode::CREATED);
        assert_eq!(responses.collect::<Vec<_>>().await, vec![1]);
        assert!(trailer.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_responder_fn_echoes_requests() {
        let handler = responder_fn(|requests: Drain<u32>, _context, responder| async move {
            responder.header(ServerHeader::ok());
            let mut requests = requests;
            while let Some(value) = requests.next().await {
                responder.send(value * 2);
            }
            responder.end(Metadata::from([("count", "done")]));
        });

        let buffer = EventBuffer::new();
        buffer.push(1);
        buffer.push(2);
        buffer.finish();

        let call: ServerCall<u32> = handler.call(buffer.drain(), context());
        let (responses, header, trailer) = call.into_parts();
        assert_eq!(header.await.unwrap(), ServerHeader::ok());
        assert_eq!(responses.collect::<Vec<_>>().await, vec![2, 4]);
        assert_eq!(trailer.await.unwrap().get("count"), Some("done"));
    }

    #[tokio::test]
    async fn test_responder_fn_returning_early_fails_promises() {
        let handler = responder_fn(
            |_requests: Drain<u8>, _context, _responder: ServerResponder<u8>| async {},
        );

        let buffer = EventBuffer::new();
        let call = handler.call(buffer.drain(), context());
        assert!(call.header.await.is_err());
    }
}
