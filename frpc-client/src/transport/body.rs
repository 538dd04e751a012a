//! Request body for the frame-based transport.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

/// A request body holding a fully encoded frame sequence.
///
/// frpc requests are a single `MESSAGE` frame, so the body is always known
/// up front.
pub struct TransportBody {
    data: Option<Bytes>,
}

impl TransportBody {
    /// Create a body with the given data.
    pub fn full(data: Bytes) -> Self {
        Self { data: Some(data) }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().data.take().map(|d| Ok(Frame::data(d))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.as_ref().map_or(0, |d| d.len() as u64))
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBody")
            .field("data_len", &self.data.as_ref().map(|d| d.len()))
            .finish()
    }
}
