//! Fixtures shared by the end-to-end tests: the `PingPongService` messages
//! and descriptors, loopback frpc and tonic servers, and raw TCP peers that
//! misbehave on purpose.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use frpc_core::{Metadata, MethodDescriptor};
use frpc_server::{FrpcRouter, ServerHeader, responder_fn};
use futures::StreamExt;
use futures::future::BoxFuture;
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::AsciiMetadataValue;
use tonic::server::NamedService;
use tonic::transport::Server;
use tonic::transport::server::TcpIncoming;
use tonic_web::GrpcWebLayer;

pub const SERVICE: &str = "riiid.pingpong.PingPongService";

#[derive(Clone, PartialEq, prost::Message)]
pub struct Ping {
    #[prost(string, tag = "1")]
    pub hello: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Pong {
    #[prost(string, tag = "1")]
    pub world: String,
}

impl Ping {
    pub fn new(hello: &str) -> Self {
        Self {
            hello: hello.to_string(),
        }
    }
}

impl Pong {
    pub fn new(world: &str) -> Self {
        Self {
            world: world.to_string(),
        }
    }
}

/// Unary `PingPong`.
pub fn ping_pong() -> MethodDescriptor<Ping, Pong> {
    MethodDescriptor::new(SERVICE, "PingPong")
}

/// Server-streaming `PingStream`.
pub fn ping_stream() -> MethodDescriptor<Ping, Pong> {
    MethodDescriptor::new(SERVICE, "PingStream").server_streaming()
}

/// Router answering `PingPong` with status 200, `{world: "world"}` and an
/// empty trailer.
pub fn ping_pong_router() -> FrpcRouter {
    FrpcRouter::new().register(
        ping_pong(),
        responder_fn(|mut requests, _context, responder| async move {
            let ping: Option<Ping> = requests.next().await;
            if ping.is_none() {
                responder.fail(frpc_core::RpcError::invalid_argument("missing ping"));
                return;
            }
            responder.header(ServerHeader::ok());
            responder.send(Pong::new("world"));
            responder.end(Metadata::new());
        }),
    )
}

/// `hello` that [`PingPongGrpc`] answers with `NOT_FOUND`.
pub const UNKNOWN_PING: &str = "nobody";

/// Server-side codec for `PingPong`: decodes [`Ping`], encodes [`Pong`].
#[derive(Clone, Copy, Debug, Default)]
struct PingPongCodec;

impl Codec for PingPongCodec {
    type Encode = Pong;
    type Decode = Ping;
    type Encoder = PingPongCodec;
    type Decoder = PingPongCodec;

    fn encoder(&mut self) -> Self::Encoder {
        PingPongCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        PingPongCodec
    }
}

impl Encoder for PingPongCodec {
    type Item = Pong;
    type Error = tonic::Status;

    fn encode(&mut self, item: Pong, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }
}

impl Decoder for PingPongCodec {
    type Item = Ping;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Ping>, Self::Error> {
        Ping::decode(src)
            .map(Some)
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }
}

/// Answers a ping with `world`, echoing the `x-client` request metadata as
/// the `x-client-echo` response header.
async fn answer_ping(
    request: tonic::Request<Ping>,
) -> Result<tonic::Response<Pong>, tonic::Status> {
    let client = request
        .metadata()
        .get("x-client")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    if request.get_ref().hello == UNKNOWN_PING {
        return Err(tonic::Status::not_found("gone"));
    }

    let mut response = tonic::Response::new(Pong::new("world"));
    let echo = client
        .parse::<AsciiMetadataValue>()
        .map_err(|_| tonic::Status::invalid_argument("x-client is not ASCII"))?;
    response.metadata_mut().insert("x-client-echo", echo);
    Ok(response)
}

/// `PingPongService` as a plain tonic service, serving only `PingPong`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PingPongGrpc;

impl NamedService for PingPongGrpc {
    const NAME: &'static str = SERVICE;
}

impl tower::Service<http::Request<tonic::body::Body>> for PingPongGrpc {
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<tonic::body::Body>) -> Self::Future {
        Box::pin(async move {
            let response = if request.uri().path() == ping_pong().path() {
                let mut grpc = tonic::server::Grpc::new(PingPongCodec);
                grpc.unary(tower::service_fn(answer_ping), request).await
            } else {
                tonic::Status::unimplemented("no such method").into_http()
            };
            Ok(response)
        })
    }
}

/// Opt into log output with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An axum server on an ephemeral loopback port. Stops when dropped.
pub struct TestServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(router: FrpcRouter) -> anyhow::Result<Self> {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router.into_router();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("test server error: {e}");
            }
        });
        Ok(Self { addr, task })
    }

    /// A tonic server hosting [`PingPongGrpc`] over HTTP/2.
    pub async fn spawn_grpc() -> anyhow::Result<Self> {
        let (addr, incoming) = bind_tonic().await?;
        let router = Server::builder().add_service(PingPongGrpc);
        let task = tokio::spawn(async move {
            if let Err(e) = router.serve_with_incoming(incoming).await {
                eprintln!("test grpc server error: {e}");
            }
        });
        Ok(Self { addr, task })
    }

    /// A tonic server hosting [`PingPongGrpc`] behind the gRPC-Web layer,
    /// accepting HTTP/1.1.
    pub async fn spawn_grpc_web() -> anyhow::Result<Self> {
        let (addr, incoming) = bind_tonic().await?;
        let router = Server::builder()
            .accept_http1(true)
            .layer(GrpcWebLayer::new())
            .add_service(PingPongGrpc);
        let task = tokio::spawn(async move {
            if let Err(e) = router.serve_with_incoming(incoming).await {
                eprintln!("test grpc-web server error: {e}");
            }
        });
        Ok(Self { addr, task })
    }

    /// `http://127.0.0.1:{port}`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn bind_tonic() -> anyhow::Result<(SocketAddr, TcpIncoming)> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((addr, TcpIncoming::from(listener)))
}

/// A plain TCP peer that reads one HTTP/1.1 request, writes `response`
/// verbatim and closes the connection.
pub async fn spawn_raw_server(response: Vec<u8>) -> anyhow::Result<(String, JoinHandle<()>)> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let task = tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        if read_request(&mut stream).await.is_err() {
            return;
        }
        let _ = stream.write_all(&response).await;
        let _ = stream.shutdown().await;
    });
    Ok((url, task))
}

/// Read request headers and a `content-length` body.
async fn read_request(stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk)).await??;
        if n == 0 {
            anyhow::bail!("connection closed before request headers");
        }
        data.extend_from_slice(&chunk[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while data.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data.split_off(head_end))
}
