//! HTTP server lifecycle.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{routes::create_router, shutdown, state::AppState};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// How long open connections get to close after a shutdown signal
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the shutdown timeout
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listener
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address attempted
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// The gateway HTTP server
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind the configured address and serve until a shutdown signal
    ///
    /// # Errors
    /// Returns error if binding fails or the server stops with an I/O error
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;

        self.run_with_listener(listener, async {
            shutdown::shutdown_signal().await;
        })
        .await
    }

    /// Serve on `listener` until `signal` resolves
    ///
    /// # Errors
    /// Returns error if the server stops with an I/O error
    pub async fn run_with_listener<F>(
        self,
        listener: TcpListener,
        signal: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr: SocketAddr = listener.local_addr()?;
        let token = self.state.shutdown.clone();
        let grace = self.config.shutdown_timeout;
        let app = create_router(self.state);

        info!(address = %local_addr, "Gateway listening");

        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::cancel_on(token.clone(), signal))
            .into_future();

        tokio::select! {
            result = serve => result?,
            () = async {
                token.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!(
                    timeout_secs = grace.as_secs(),
                    "Connections still open after shutdown timeout, exiting"
                );
            }
        }

        info!("Server stopped");
        Ok(())
    }
}
