//! HTTP frontend
//!
//! Serves a public asset directory plus `GET /generate`, which renders the
//! `html` query parameter and streams the image back. The listener, config
//! and renderer all live in an owned [`Server`]; nothing is registered
//! globally.
//!
//! ```no_run
//! # async fn run() -> htmlshot::Result<()> {
//! use htmlshot::{start_server, RendererConfig, ServerConfig};
//! use std::sync::Arc;
//!
//! let renderer = Arc::new(htmlshot::new_renderer(RendererConfig::default())?);
//! let server = start_server(ServerConfig::default(), renderer)?;
//! server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod artifact;
pub mod handlers;
pub mod query;

pub use query::{QueryError, RenderRequest};

use crate::{Error, Renderer, Result};
use handlers::AppContext;
use log::{error, info};
use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Startup parameters for the HTTP frontend
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Preferred port; higher ports are tried when it is taken
    pub port: u16,
    /// How many further ports to try after the preferred one
    pub max_attempts: u32,
    /// Static asset root, also the parent of the default output directory
    pub public_dir: PathBuf,
    /// Where generated images are written; `{public_dir}/generated` when `None`
    pub output_dir: Option<PathBuf>,
    /// Largest accepted width or height
    pub max_dimension: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_attempts: 10,
            public_dir: PathBuf::from("public"),
            output_dir: None,
            max_dimension: 16384,
        }
    }
}

impl ServerConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.public_dir.join("generated"))
    }
}

/// Bind `host:port`, moving to the next port while the current one is in use.
///
/// Up to `max_attempts` retries follow the first attempt. Any error other
/// than "address in use" aborts immediately.
pub fn bind_with_retry(host: &str, port: u16, max_attempts: u32) -> Result<TcpListener> {
    let mut candidate = port;
    let mut retries = 0u32;

    loop {
        match TcpListener::bind((host, candidate)) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if retries >= max_attempts || candidate == u16::MAX {
                    return Err(Error::PortsExhausted {
                        start: port,
                        last: candidate,
                        attempts: retries,
                    });
                }
                info!("Port {} is already in use. Trying the next available port...", candidate);
                candidate += 1;
                retries += 1;
            }
            Err(e) => {
                return Err(Error::Bind {
                    port: candidate,
                    source: e,
                })
            }
        }
    }
}

/// A bound, not yet serving HTTP frontend
pub struct Server {
    http: Arc<tiny_http::Server>,
    addr: SocketAddr,
    context: Arc<AppContext>,
}

/// Bind the listener (with port negotiation) and assemble the server.
pub fn start_server(config: ServerConfig, renderer: Arc<dyn Renderer>) -> Result<Server> {
    let listener = bind_with_retry(&config.host, config.port, config.max_attempts)?;
    let addr = listener.local_addr()?;

    let http = tiny_http::Server::from_listener(listener, None)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

    info!("Server running at http://localhost:{}", addr.port());

    let context = AppContext {
        output_dir: config.output_dir(),
        public_dir: config.public_dir,
        max_dimension: config.max_dimension,
        renderer,
    };

    Ok(Server {
        http: Arc::new(http),
        addr,
        context: Arc::new(context),
    })
}

impl Server {
    /// Address actually bound, after port negotiation
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Accept requests until `shutdown` resolves.
    ///
    /// Each request runs on its own blocking task, so a slow render never
    /// holds up other requests. Renders already in progress at shutdown are
    /// left to finish.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Handle::current();
        let stopping = Arc::new(AtomicBool::new(false));

        let http = Arc::clone(&self.http);
        let context = Arc::clone(&self.context);
        let stop_flag = Arc::clone(&stopping);
        let accept = tokio::task::spawn_blocking(move || loop {
            match http.recv() {
                Ok(request) => {
                    let context = Arc::clone(&context);
                    runtime.spawn_blocking(move || handlers::handle(request, &context));
                }
                Err(_) if stop_flag.load(Ordering::SeqCst) => break,
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        });

        shutdown.await;
        info!("Shutting down");
        stopping.store(true, Ordering::SeqCst);
        self.http.unblock();

        accept
            .await
            .map_err(|e| Error::Other(format!("Accept loop failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.output_dir(), PathBuf::from("public").join("generated"));
    }

    #[test]
    fn binds_preferred_port_when_free() {
        let spare = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = spare.local_addr().unwrap().port();
        drop(spare);

        let listener = bind_with_retry("127.0.0.1", port, 0).unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[test]
    fn moves_past_occupied_port() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind_with_retry("127.0.0.1", port, 10).unwrap();
        let bound = listener.local_addr().unwrap().port();
        assert!(bound > port && bound <= port.saturating_add(10), "bound {}", bound);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_with_retry("127.0.0.1", port, 0).unwrap_err();
        assert!(matches!(err, Error::PortsExhausted { start, attempts: 0, .. } if start == port));
    }

    #[test]
    fn other_bind_errors_are_fatal() {
        // Not an address on this host
        let err = bind_with_retry("203.0.113.7", 3000, 10).unwrap_err();
        assert!(matches!(err, Error::Bind { port: 3000, .. }));
    }
}
