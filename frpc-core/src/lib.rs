//! Core types for frpc.
//!
//! This crate provides the pieces shared by the client (`frpc-client`) and
//! server (`frpc-server`) crates.
//!
//! ## Modules
//!
//! - [`error`]: Status codes and error types
//! - [`frame`]: Length-prefixed frame encoding and the incremental [`FrameAssembler`]
//! - [`event_buffer`]: Push-to-pull conduit with drain-end cancellation
//! - [`deferred`]: Settle-once header/trailer promises
//! - [`metadata`]: Metadata maps and default-metadata providers
//! - [`method`]: Method descriptors and message codecs
//! - [`call`]: The `(responses, header, trailer)` call handle

pub mod call;
pub mod deferred;
pub mod error;
pub mod event_buffer;
pub mod frame;
pub mod metadata;
pub mod method;
mod responder;

pub use call::RpcCall;
pub use deferred::{Deferred, Settled};
pub use error::{Code, FrameError, ParseCodeError, RpcError};
pub use event_buffer::{BufferState, Drain, EventBuffer};
pub use frame::{
    FRAME_HEADER_SIZE, Frame, FrameAssembler, decode_frame, encode_frame, encode_message,
    encode_trailer, frame_type, parse_frame_header, parse_trailer,
};
pub use metadata::{
    DefaultMetadata, Metadata, MetadataProvider, ProviderFuture, STATUS_KEY, STATUS_MESSAGE_KEY,
    resolve_metadata,
};
pub use method::{BoxedMessageCodec, MessageCodec, MethodDescriptor, ProstCodec};
pub use responder::Responder;

/// Content type of the frame-based protocol.
pub const FRPC_CONTENT_TYPE: &str = "application/frpc+proto";
