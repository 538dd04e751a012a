//! Clients for frpc services.
//!
//! Every transport returns the same [`RpcCall`]: a lazy stream of responses
//! plus header and trailer promises. Code written against it does not care
//! which transport carried the call.
//!
//! - [`FrpcClient`]: the frame-based protocol over HTTP (hyper + rustls)
//! - [`GrpcClient`]: gRPC over a tonic channel, or gRPC-Web via `tonic-web`
//!
//! ## Example
//!
//! ```ignore
//! use frpc_client::{FrpcClient, Metadata};
//! use futures::StreamExt;
//!
//! let client = FrpcClient::builder("http://localhost:3000").build()?;
//!
//! let call = client.unary(&ping_pong, Ping { hello: "hello".into() }, Metadata::new());
//! let header = call.header.await?;
//! let responses: Vec<Pong> = call.responses.collect().await;
//! let trailer = call.trailer.await?;
//! ```
//!
//! ## Cancellation
//!
//! Dropping `responses` before it ends cancels the call. The frame-based
//! client aborts the HTTP request and rejects a pending header. The gRPC
//! clients do the same for server-streaming methods and resolve the trailer
//! with status `1`.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` | ring crypto provider for rustls |
//! | `tls-native-roots` | System root certificates |
//! | `tls-webpki-roots` | Bundled Mozilla root certificates |

mod builder;
mod client;
mod error;
pub mod grpc;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::FrpcClient;
pub use error::ClientError;
pub use grpc::{GrpcClient, GrpcClientBuilder, GrpcWebChannel};

pub use transport::{HyperTransport, HyperTransportBuilder, TlsClientConfig, TransportBody};

pub use frpc_core::{
    Code, Drain, Metadata, MetadataProvider, MethodDescriptor, RpcCall, RpcError, Settled,
};
