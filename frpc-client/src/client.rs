//! Frame-based protocol client.
//!
//! Each call is a `POST {host}/{service}/{method}` whose body is one
//! `MESSAGE` frame. The response body is a sequence of `MESSAGE` frames
//! followed by `TRAILER` frames.

use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{Stream, StreamExt};
use http::header::{HeaderName, HeaderValue};
use http_body_util::BodyExt;
use tracing::{Instrument, debug, info_span, warn};

use frpc_core::{
    BoxedMessageCodec, DefaultMetadata, Deferred, EventBuffer, FRPC_CONTENT_TYPE, FrameAssembler,
    Metadata, MethodDescriptor, RpcCall, RpcError, STATUS_KEY, STATUS_MESSAGE_KEY,
    encode_message, resolve_metadata,
};

use crate::builder::ClientBuilder;
use crate::transport::{HyperTransport, TransportBody};

/// Header metadata of a frame-based call.
pub type Header = Metadata;

/// Trailer metadata of a frame-based call.
pub type Trailer = Metadata;

/// Client for the frame-based protocol.
///
/// Cheap to clone. Calls must be started from within a Tokio runtime: each
/// call runs on its own task so the response can be consumed lazily.
///
/// # Example
///
/// ```ignore
/// use frpc_client::FrpcClient;
///
/// let client = FrpcClient::builder("http://localhost:3000")
///     .metadata("authorization", "Bearer token")
///     .build()?;
///
/// let pong = client.unary(&ping_pong, Ping { hello: "hello".into() }, Metadata::new())
///     .first_response()
///     .await?;
/// ```
#[derive(Clone)]
pub struct FrpcClient {
    host: Arc<str>,
    transport: HyperTransport,
    metadata: Arc<DefaultMetadata>,
}

impl std::fmt::Debug for FrpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrpcClient")
            .field("host", &self.host)
            .field("transport", &self.transport)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl FrpcClient {
    /// Start building a client for `host` (e.g. `http://localhost:3000`).
    pub fn builder<S: Into<String>>(host: S) -> ClientBuilder {
        ClientBuilder::new(host)
    }

    pub(crate) fn new(host: String, transport: HyperTransport, metadata: DefaultMetadata) -> Self {
        Self {
            host: host.into(),
            transport,
            metadata: Arc::new(metadata),
        }
    }

    /// Base URL of the server.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Invoke `method` with a single request.
    pub fn unary<Req, Res>(
        &self,
        method: &MethodDescriptor<Req, Res>,
        request: Req,
        metadata: Metadata,
    ) -> RpcCall<Res, Header, Trailer>
    where
        Req: Send + 'static,
        Res: Send + 'static,
    {
        self.call(method, futures::stream::iter([request]), metadata)
    }

    /// Invoke `method`.
    ///
    /// Only the first value of `requests` is sent, even for client-streaming
    /// methods; an empty stream fails the call with `invalid_argument`.
    ///
    /// The call always settles both promises. Dropping the response stream
    /// before it ends aborts the HTTP request.
    pub fn call<Req, Res, S>(
        &self,
        method: &MethodDescriptor<Req, Res>,
        requests: S,
        metadata: Metadata,
    ) -> RpcCall<Res, Header, Trailer>
    where
        Req: Send + 'static,
        Res: Send + 'static,
        S: Stream<Item = Req> + Send + 'static,
    {
        let span = info_span!(
            "rpc.call",
            rpc.system = "frpc",
            rpc.service = %method.service_name(),
            rpc.method = %method.method_name(),
            otel.kind = "client",
        );

        let buffer = EventBuffer::new();
        let (header, header_settled) = Deferred::new();
        let (trailer, trailer_settled) = Deferred::new();
        let settlement = Arc::new(Settlement {
            header,
            trailer,
            received: Mutex::new(Metadata::new()),
        });

        let exchange = Exchange {
            transport: self.transport.clone(),
            url: format!(
                "{}/{}/{}",
                self.host,
                method.service_name(),
                method.method_name()
            ),
            defaults: self.metadata.clone(),
            request_type: method.request_type().clone(),
            response_type: method.response_type().clone(),
            buffer: buffer.clone(),
            settlement: settlement.clone(),
        };
        let task = tokio::spawn(exchange.run(requests, metadata).instrument(span.clone()));

        let abort = task.abort_handle();
        buffer.on_drain_end(move || {
            let _enter = span.enter();
            debug!("drain ended, aborting request");
            abort.abort();
            settlement.drain_ended();
        });

        RpcCall::new(buffer.drain(), header_settled, trailer_settled)
    }
}

/// Promise state shared by the request task and the drain-end hook.
struct Settlement {
    header: Deferred<Header>,
    trailer: Deferred<Trailer>,
    /// Trailer entries received so far.
    received: Mutex<Metadata>,
}

impl Settlement {
    fn record_trailer(&self, key: String, value: String) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    fn take_received(&self) -> Metadata {
        std::mem::take(&mut *self.received.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn complete(&self) {
        self.trailer.resolve(self.take_received());
    }

    fn fail(&self, error: RpcError) {
        let mut trailer = self.take_received();
        trailer.insert(STATUS_KEY, error.code().as_i32().to_string());
        trailer.insert(STATUS_MESSAGE_KEY, error.message());
        self.header.reject(error);
        self.trailer.resolve(trailer);
    }

    fn drain_ended(&self) {
        self.header
            .reject(RpcError::Canceled("drain ended before header".into()));
        let trailer = self.take_received();
        if trailer.contains_key(STATUS_KEY) {
            self.trailer.resolve(trailer);
        } else {
            self.trailer.reject(RpcError::Canceled("drain ended".into()));
        }
    }
}

/// Everything the request task owns.
struct Exchange<Req, Res> {
    transport: HyperTransport,
    url: String,
    defaults: Arc<DefaultMetadata>,
    request_type: BoxedMessageCodec<Req>,
    response_type: BoxedMessageCodec<Res>,
    buffer: EventBuffer<Res>,
    settlement: Arc<Settlement>,
}

impl<Req, Res> Exchange<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn run<S>(self, requests: S, metadata: Metadata)
    where
        S: Stream<Item = Req> + Send,
    {
        match self.exchange(requests, metadata).await {
            Ok(()) => {
                debug!("stream finished");
                self.settlement.complete();
            }
            Err(error) => {
                warn!(%error, "call failed");
                self.settlement.fail(error);
            }
        }
        self.buffer.finish();
    }

    async fn exchange<S>(&self, requests: S, metadata: Metadata) -> Result<(), RpcError>
    where
        S: Stream<Item = Req> + Send,
    {
        let headers = resolve_metadata(
            Metadata::from([("content-type", FRPC_CONTENT_TYPE)]),
            metadata,
            &self.defaults,
        )
        .await;

        // Only the first request value goes on the wire.
        let mut requests = pin!(requests);
        let request = requests
            .next()
            .await
            .ok_or_else(|| RpcError::invalid_argument("request stream produced no message"))?;
        let payload = self.request_type.serialize_binary(&request)?;
        drop(request);

        let request = build_request(&self.url, &headers, encode_message(&payload)?)?;
        let response = self.transport.request(request).await?;
        let (parts, mut body) = response.into_parts();

        debug!(status = parts.status.as_u16(), "header received");
        self.settlement.header.resolve(header_record(&parts));

        let mut assembler = FrameAssembler::new();
        while let Some(frame) = body.frame().await {
            if self.buffer.is_drain_ended() {
                return Ok(());
            }
            let frame =
                frame.map_err(|e| RpcError::Transport(format!("response body failed: {e}")))?;
            // HTTP trailers are not part of the protocol.
            let Ok(chunk) = frame.into_data() else {
                continue;
            };

            let mut decode_error = None;
            assembler.feed(
                &chunk,
                |payload| match self.response_type.deserialize_binary(&payload) {
                    Ok(message) => self.buffer.push(message),
                    Err(e) => {
                        decode_error.get_or_insert(e);
                    }
                },
                |key, value| self.settlement.record_trailer(key, value),
            );
            if let Some(e) = decode_error {
                return Err(e);
            }
        }

        assembler.finish().inspect_err(|e| warn!(error = %e, "truncated frame"))?;
        Ok(())
    }
}

fn build_request(
    url: &str,
    headers: &Metadata,
    body: bytes::Bytes,
) -> Result<http::Request<TransportBody>, RpcError> {
    let mut builder = http::Request::post(url);
    for (key, value) in headers.iter() {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => warn!(key, "skipping metadata entry that is not a valid HTTP header"),
        }
    }
    builder
        .body(TransportBody::full(body))
        .map_err(|e| RpcError::Protocol(format!("invalid request: {e}")))
}

/// Flatten response headers into a record, adding the numeric HTTP status
/// under `status` unless the server sent that header itself.
fn header_record(parts: &http::response::Parts) -> Header {
    let mut header = Metadata::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let joined = match header.get(name.as_str()) {
            Some(existing) => format!("{existing}, {value}"),
            None => value.to_owned(),
        };
        header.insert(name.as_str(), joined);
    }
    if !header.contains_key(STATUS_KEY) {
        header.insert(STATUS_KEY, parts.status.as_u16().to_string());
    }
    header
}
