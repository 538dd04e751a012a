//! Route table for frpc methods.

use axum::{
    Router,
    extract::Request,
    routing::{MethodRouter, post},
};
use frpc_core::MethodDescriptor;

use crate::dispatch::dispatch;
use crate::handler::FrpcHandler;

/// Collects method handlers and turns them into an axum [`Router`].
///
/// Every method is served at `POST /{prefix}/{service}/{method}`, or
/// `POST /{service}/{method}` without a prefix. Other HTTP methods get `405`.
///
/// # Example
///
/// ```rust,no_run
/// use frpc_core::{Drain, Metadata, MethodDescriptor};
/// use frpc_server::{CallContext, FrpcRouter, ServerCall, ServerHeader};
///
/// # async fn run(method: MethodDescriptor<String, String>) {
/// let router = FrpcRouter::new()
///     .path_prefix("api")
///     .register(method, |_requests: Drain<String>, _context: CallContext| {
///         let (responder, call) = ServerCall::responder();
///         responder.header(ServerHeader::ok());
///         responder.send("pong".to_string());
///         responder.end(Metadata::new());
///         call
///     })
///     .into_router();
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
/// axum::serve(listener, router).await.unwrap();
/// # }
/// ```
#[derive(Default)]
pub struct FrpcRouter {
    prefix: String,
    routes: Vec<(String, MethodRouter)>,
}

impl std::fmt::Debug for FrpcRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrpcRouter")
            .field("prefix", &self.prefix)
            .field("routes", &self.routes.iter().map(|(path, _)| path).collect::<Vec<_>>())
            .finish()
    }
}

impl FrpcRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every method under `prefix`. Surrounding slashes are ignored.
    pub fn path_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.as_ref().trim_matches('/').to_string();
        self
    }

    /// Serve `method` with `handler`.
    ///
    /// Registering the same service and method again replaces the earlier
    /// handler.
    pub fn register<Req, Res, H>(mut self, method: MethodDescriptor<Req, Res>, handler: H) -> Self
    where
        Req: Send + 'static,
        Res: Send + 'static,
        H: FrpcHandler<Req, Res>,
    {
        let key = method.path();
        let route = post(move |request: Request| dispatch(method, handler, request));
        self.routes.retain(|(path, _)| *path != key);
        self.routes.push((key, route));
        self
    }

    /// Paths this router serves, prefix included.
    pub fn paths(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|(path, _)| self.full_path(path))
            .collect()
    }

    /// Build the axum router.
    pub fn into_router(self) -> Router {
        let paths = self.paths();
        paths
            .iter()
            .zip(self.routes)
            .fold(Router::new(), |router, (path, (_, route))| router.route(path, route))
    }

    fn full_path(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("/{}{}", self.prefix, path)
        }
    }
}

impl From<FrpcRouter> for Router {
    fn from(router: FrpcRouter) -> Self {
        router.into_router()
    }
}
