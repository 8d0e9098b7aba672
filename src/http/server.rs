//! HTTP server implementation.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::dispatcher::Dispatcher;
use crate::error::Result;

/// HTTP server for the record service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The routes to serve
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server from a dispatcher.
    pub fn new(addr: SocketAddr, dispatcher: &Dispatcher) -> Self {
        Self {
            addr,
            router: dispatcher.router(),
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server stops accepting connections when the provided signal
    /// resolves and returns once in-flight requests have finished.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::http::RecordStore;
    use crate::ratelimit::{default_policies, PolicyRegistry};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_server_serves_until_shutdown() {
        let registry = PolicyRegistry::from_config(&default_policies()).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(RecordStore::new()),
            &registry,
            &RouteConfig::default(),
        )
        .unwrap();

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, &dispatcher);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
