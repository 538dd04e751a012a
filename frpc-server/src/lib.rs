//! # frpc server
//!
//! Serves frpc methods from an [axum](https://github.com/tokio-rs/axum)
//! router over the frame-based protocol.
//!
//! A handler receives the request messages as a lazy stream and returns an
//! [`RpcCall`](frpc_core::RpcCall): response messages plus header and trailer
//! promises. The router writes the header as the HTTP status line and
//! headers, one message frame per response, then one trailer frame per
//! trailer entry.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use frpc_core::{Metadata, MethodDescriptor};
//! use frpc_server::{FrpcRouter, ServerHeader, responder_fn};
//! use futures::StreamExt;
//!
//! # async fn run(ping_pong: MethodDescriptor<String, String>) {
//! let app = FrpcRouter::new()
//!     .register(ping_pong, responder_fn(|mut requests, _context, responder| async move {
//!         let _ping = requests.next().await;
//!         responder.header(ServerHeader::ok());
//!         responder.send("world".to_string());
//!         responder.end(Metadata::new());
//!     }))
//!     .into_router();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```
//!
//! Requests must use `POST`. A `content-type` other than
//! `application/frpc+proto` is answered with `415`. A handler that rejects its
//! header gets a `500` whose body carries `status` and `statusMessage` trailer
//! frames; a failure after the header aborts the response.

mod context;
mod dispatch;
mod handler;
mod router;

pub use context::{CallContext, ServerHeader};
pub use handler::{FrpcHandler, ResponderFn, ServerCall, ServerResponder, responder_fn};
pub use router::FrpcRouter;

pub use frpc_core::{Drain, Metadata, MethodDescriptor, Responder, RpcCall, RpcError};
