//! gRPC and gRPC-Web transports built on `tonic`.
//!
//! Every method is invoked as a bidi-streaming gRPC call carrying raw bytes;
//! the method's own codecs run at the edges. Response headers become the
//! header record. The trailer record is the trailing metadata plus `status`
//! (numeric code) and `statusMessage`.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};
use futures::{Stream, StreamExt};
use http::uri::PathAndQuery;
use http_body::Body;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tonic::client::{Grpc, GrpcService};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::{Channel, Endpoint};
use tonic_web::{GrpcWebCall, GrpcWebClientLayer, GrpcWebClientService};
use tower::Layer;
use tracing::{Instrument, debug, info_span, warn};

use frpc_core::{
    BoxedMessageCodec, Code, DefaultMetadata, Deferred, EventBuffer, Metadata, MetadataProvider,
    MethodDescriptor, RpcCall, RpcError, STATUS_KEY, STATUS_MESSAGE_KEY, resolve_metadata,
};

use crate::error::{ClientError, normalize_host};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Header metadata of a gRPC call.
pub type Header = Metadata;

/// Trailer metadata of a gRPC call, always carrying `status` and `statusMessage`.
pub type Trailer = Metadata;

/// gRPC-Web service stack: a hyper HTTP/1.1 client behind the gRPC-Web layer.
pub type GrpcWebChannel =
    GrpcWebClientService<Client<HttpConnector, GrpcWebCall<tonic::body::Body>>>;

/// Status message of the trailer produced when the consumer abandons a stream.
pub const DRAIN_ENDED_MESSAGE: &str = "Drain ended";

/// Pass-through codec; message (de)serialization happens outside tonic.
#[derive(Clone, Copy, Debug, Default)]
struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// Builder for [`GrpcClient`].
///
/// # Example
///
/// ```ignore
/// use frpc_client::GrpcClientBuilder;
///
/// let grpc = GrpcClientBuilder::new("http://localhost:50051").connect()?;
/// let grpc_web = GrpcClientBuilder::new("http://localhost:8080").grpc_web()?;
/// ```
#[derive(Debug)]
pub struct GrpcClientBuilder {
    host: String,
    metadata: DefaultMetadata,
}

impl GrpcClientBuilder {
    /// Create a builder for `host` (scheme and authority).
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            metadata: DefaultMetadata::new(),
        }
    }

    /// Add a default metadata entry.
    pub fn metadata<K, P>(mut self, key: K, provider: P) -> Self
    where
        K: Into<String>,
        P: Into<MetadataProvider>,
    {
        self.metadata.insert(key, provider);
        self
    }

    /// Build a gRPC client over a lazily connecting HTTP/2 channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(self) -> Result<GrpcClient<Channel>, ClientError> {
        let host = normalize_host(&self.host)?;
        let channel = Endpoint::from_shared(host.clone())
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .connect_lazy();
        self.finish(host, channel, "grpc")
    }

    /// Build a gRPC-Web client over HTTP/1.1.
    pub fn grpc_web(self) -> Result<GrpcClient<GrpcWebChannel>, ClientError> {
        let host = normalize_host(&self.host)?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        self.finish(host, GrpcWebClientLayer::new().layer(client), "grpc-web")
    }

    /// Build a gRPC client over any tonic-compatible service.
    pub fn with_service<S>(self, service: S) -> Result<GrpcClient<S>, ClientError> {
        let host = normalize_host(&self.host)?;
        self.finish(host, service, "grpc")
    }

    fn finish<S>(
        self,
        host: String,
        service: S,
        system: &'static str,
    ) -> Result<GrpcClient<S>, ClientError> {
        let origin = host
            .parse()
            .map_err(|e| ClientError::invalid_host(&host, e))?;
        Ok(GrpcClient {
            service,
            origin,
            metadata: Arc::new(self.metadata),
            system,
        })
    }
}

/// Client invoking methods over gRPC or gRPC-Web.
///
/// Calls must be started from within a Tokio runtime.
#[derive(Clone)]
pub struct GrpcClient<S> {
    service: S,
    origin: http::Uri,
    metadata: Arc<DefaultMetadata>,
    system: &'static str,
}

impl<S> std::fmt::Debug for GrpcClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcClient")
            .field("origin", &self.origin)
            .field("metadata", &self.metadata)
            .field("system", &self.system)
            .finish_non_exhaustive()
    }
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    S::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <S::ResponseBody as Body>::Error: Into<BoxError> + Send,
{
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

    /// Invoke `method`, streaming every request value.
    ///
    /// For server-streaming methods, dropping the response stream cancels the
    /// call: a pending header is rejected and the trailer resolves with
    /// status `1` (`canceled`).
    pub fn call<Req, Res, St>(
        &self,
        method: &MethodDescriptor<Req, Res>,
        requests: St,
        metadata: Metadata,
    ) -> RpcCall<Res, Header, Trailer>
    where
        Req: Send + 'static,
        Res: Send + 'static,
        St: Stream<Item = Req> + Send + 'static,
    {
        let span = info_span!(
            "rpc.call",
            rpc.system = self.system,
            rpc.service = %method.service_name(),
            rpc.method = %method.method_name(),
            otel.kind = "client",
        );

        let buffer = EventBuffer::new();
        let (header, header_settled) = Deferred::new();
        let (trailer, trailer_settled) = Deferred::new();

        let call = GrpcExchange {
            grpc: Grpc::with_origin(self.service.clone(), self.origin.clone()),
            path: method.path(),
            defaults: self.metadata.clone(),
            request_type: method.request_type().clone(),
            response_type: method.response_type().clone(),
            buffer: buffer.clone(),
            header: header.clone(),
            trailer: trailer.clone(),
        };
        let task = tokio::spawn(call.run(requests, metadata).instrument(span.clone()));

        if method.response_stream() {
            let abort = task.abort_handle();
            buffer.on_drain_end(move || {
                let _enter = span.enter();
                debug!("drain ended, canceling call");
                abort.abort();
                header.reject(RpcError::Canceled("drain ended before header".into()));
                trailer.resolve(drain_ended_trailer());
            });
        }

        RpcCall::new(buffer.drain(), header_settled, trailer_settled)
    }
}

/// Trailer reported for a call whose response stream was abandoned.
pub fn drain_ended_trailer() -> Trailer {
    Metadata::from([
        (STATUS_KEY, Code::Canceled.as_i32().to_string()),
        (STATUS_MESSAGE_KEY, DRAIN_ENDED_MESSAGE.to_string()),
    ])
}

struct GrpcExchange<S, Req, Res> {
    grpc: Grpc<S>,
    path: String,
    defaults: Arc<DefaultMetadata>,
    request_type: BoxedMessageCodec<Req>,
    response_type: BoxedMessageCodec<Res>,
    buffer: EventBuffer<Res>,
    header: Deferred<Header>,
    trailer: Deferred<Trailer>,
}

impl<S, Req, Res> GrpcExchange<S, Req, Res>
where
    S: GrpcService<tonic::body::Body> + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    S::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <S::ResponseBody as Body>::Error: Into<BoxError> + Send,
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn run<St>(mut self, requests: St, metadata: Metadata)
    where
        St: Stream<Item = Req> + Send + 'static,
    {
        match self.exchange(requests, metadata).await {
            Ok(trailer) => {
                debug!("stream finished");
                self.trailer.resolve(trailer);
            }
            Err(status) => {
                warn!(code = ?status.code(), error = status.message(), "call failed");
                self.header.reject(status_to_error(&status));
                self.trailer.resolve(status_trailer(&status));
            }
        }
        self.buffer.finish();
    }

    async fn exchange<St>(
        &mut self,
        requests: St,
        metadata: Metadata,
    ) -> Result<Trailer, tonic::Status>
    where
        St: Stream<Item = Req> + Send + 'static,
    {
        let metadata = resolve_metadata(Metadata::new(), metadata, &self.defaults).await;
        let path: PathAndQuery = self
            .path
            .parse()
            .map_err(|e| tonic::Status::internal(format!("invalid method path: {e}")))?;

        let codec = self.request_type.clone();
        let outbound = requests.scan((), move |(), request| {
            futures::future::ready(match codec.serialize_binary(&request) {
                Ok(bytes) => Some(bytes),
                Err(error) => {
                    warn!(%error, "request serialization failed, closing request stream");
                    None
                }
            })
        });

        let mut request = tonic::Request::new(outbound);
        for (key, value) in metadata.iter() {
            match (
                AsciiMetadataKey::from_bytes(key.as_bytes()),
                AsciiMetadataValue::try_from(value),
            ) {
                (Ok(key), Ok(value)) => {
                    request.metadata_mut().insert(key, value);
                }
                _ => warn!(key, "skipping metadata entry that is not valid ASCII metadata"),
            }
        }

        self.grpc.ready().await.map_err(|e| {
            let e: BoxError = e.into();
            tonic::Status::unavailable(format!("service was not ready: {e}"))
        })?;
        let response = self.grpc.streaming(request, path, RawCodec).await?;
        let (header, mut messages, _) = response.into_parts();
        debug!("header received");
        self.header.resolve(metadata_record(header));

        while let Some(payload) = messages.message().await? {
            if self.buffer.is_drain_ended() {
                return Err(tonic::Status::cancelled(DRAIN_ENDED_MESSAGE));
            }
            let message = self
                .response_type
                .deserialize_binary(&payload)
                .map_err(|e| tonic::Status::internal(e.to_string()))?;
            self.buffer.push(message);
        }

        let mut trailer = messages
            .trailers()
            .await?
            .map(metadata_record)
            .unwrap_or_default();
        trailer.insert(STATUS_KEY, Code::Ok.as_i32().to_string());
        trailer.insert(STATUS_MESSAGE_KEY, "");
        Ok(trailer)
    }
}

/// Flatten gRPC metadata to a string map. Repeated keys keep the last value
/// and values that are not valid strings are dropped.
fn metadata_record(metadata: MetadataMap) -> Metadata {
    let mut record = Metadata::new();
    for (name, value) in metadata.into_headers().iter() {
        if let Ok(value) = value.to_str() {
            record.insert(name.as_str(), value);
        }
    }
    record
}

fn status_to_error(status: &tonic::Status) -> RpcError {
    RpcError::new(
        Code::from_i32(i32::from(status.code())),
        status.message(),
    )
}

fn status_trailer(status: &tonic::Status) -> Trailer {
    let mut trailer = metadata_record(status.metadata().clone());
    trailer.insert(STATUS_KEY, i32::from(status.code()).to_string());
    trailer.insert(STATUS_MESSAGE_KEY, status.message());
    trailer
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use futures::stream::BoxStream;
    use http_body_util::StreamBody;

    type MockBody = StreamBody<BoxStream<'static, Result<http_body::Frame<Bytes>, Infallible>>>;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Echo {
        #[prost(string, tag = "1")]
        text: String,
    }

    fn grpc_frame(message: &Echo) -> Bytes {
        let payload = prost::Message::encode_to_vec(message);
        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.push(0);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Bytes::from(frame)
    }

    fn ok_trailers() -> http::HeaderMap {
        let mut trailers = http::HeaderMap::new();
        trailers.insert("grpc-status", http::HeaderValue::from_static("0"));
        trailers.insert("x-trailer", http::HeaderValue::from_static("done"));
        trailers
    }

    fn response(body: MockBody) -> http::Response<MockBody> {
        http::Response::builder()
            .header("content-type", "application/grpc")
            .header("x-header", "hi")
            .body(body)
            .unwrap()
    }

    fn method() -> MethodDescriptor<Echo, Echo> {
        MethodDescriptor::new("test.EchoService", "Echo")
    }

    #[tokio::test]
    async fn test_unary_over_grpc() {
        let service = tower::service_fn(|request: http::Request<tonic::body::Body>| async move {
            assert_eq!(request.uri().path(), "/test.EchoService/Echo");
            assert_eq!(request.headers()["x-token"], "secret");
            let frames: Vec<Result<_, Infallible>> = vec![
                Ok(http_body::Frame::data(grpc_frame(&Echo { text: "pong".into() }))),
                Ok(http_body::Frame::trailers(ok_trailers())),
            ];
            Ok::<_, Infallible>(response(StreamBody::new(
                futures::stream::iter(frames).boxed(),
            )))
        });
        let client = GrpcClientBuilder::new("http://localhost")
            .metadata("x-token", "secret")
            .with_service(service)
            .unwrap();

        let call = client.unary(&method(), Echo { text: "ping".into() }, Metadata::new());
        let (responses, header, trailer) = call.into_parts();

        let header = header.await.unwrap();
        assert_eq!(header.get("x-header"), Some("hi"));
        assert_eq!(
            responses.collect::<Vec<_>>().await,
            vec![Echo { text: "pong".into() }]
        );
        let trailer = trailer.await.unwrap();
        assert_eq!(trailer.get("x-trailer"), Some("done"));
        assert_eq!(trailer.get(STATUS_KEY), Some("0"));
        assert_eq!(trailer.get(STATUS_MESSAGE_KEY), Some(""));
    }

    #[tokio::test]
    async fn test_trailers_only_error() {
        let service = tower::service_fn(|_: http::Request<tonic::body::Body>| async move {
            let body: MockBody = StreamBody::new(futures::stream::empty().boxed());
            let response = http::Response::builder()
                .header("content-type", "application/grpc")
                .header("grpc-status", "5")
                .header("grpc-message", "missing")
                .body(body)
                .unwrap();
            Ok::<_, Infallible>(response)
        });
        let client = GrpcClientBuilder::new("http://localhost")
            .with_service(service)
            .unwrap();

        let call = client.unary(&method(), Echo::default(), Metadata::new());
        let (responses, header, trailer) = call.into_parts();

        assert_eq!(header.await.unwrap_err().code(), Code::NotFound);
        assert!(responses.collect::<Vec<_>>().await.is_empty());
        let trailer = trailer.await.unwrap();
        assert_eq!(trailer.get(STATUS_KEY), Some("5"));
        assert_eq!(trailer.get(STATUS_MESSAGE_KEY), Some("missing"));
    }

    #[tokio::test]
    async fn test_drain_end_cancels_server_stream() {
        let service = tower::service_fn(|_: http::Request<tonic::body::Body>| async move {
            let first = futures::stream::iter([Ok(http_body::Frame::data(grpc_frame(&Echo {
                text: "first".into(),
            })))]);
            let body = first.chain(futures::stream::pending()).boxed();
            Ok::<_, Infallible>(response(StreamBody::new(body)))
        });
        let client = GrpcClientBuilder::new("http://localhost")
            .with_service(service)
            .unwrap();

        let call = client.unary(
            &method().server_streaming(),
            Echo::default(),
            Metadata::new(),
        );
        let (mut responses, header, trailer) = call.into_parts();

        assert!(header.await.is_ok());
        assert_eq!(responses.next().await, Some(Echo { text: "first".into() }));
        drop(responses);

        assert_eq!(trailer.await.unwrap(), drain_ended_trailer());
    }

    #[test]
    fn test_metadata_record_keeps_last_value() {
        let mut metadata = MetadataMap::new();
        metadata.insert("x-a", "1".parse().unwrap());
        metadata.append("x-a", "2".parse().unwrap());
        metadata.insert("x-b", "3".parse().unwrap());

        let record = metadata_record(metadata);
        assert_eq!(record.get("x-a"), Some("2"));
        assert_eq!(record.get("x-b"), Some("3"));
    }

    #[test]
    fn test_status_trailer() {
        let status = tonic::Status::permission_denied("nope");
        let trailer = status_trailer(&status);
        assert_eq!(trailer.get(STATUS_KEY), Some("7"));
        assert_eq!(trailer.get(STATUS_MESSAGE_KEY), Some("nope"));
        assert_eq!(status_to_error(&status).code(), Code::PermissionDenied);
    }
}
