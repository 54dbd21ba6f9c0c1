//! Accept loop and shutdown coordination.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::handler::{ConnectionSettings, handle};
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::transport::Acceptor;

/// Default cap on concurrently served connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Largest connection cap the permit semaphore can hold.
const CONNECTION_LIMIT_CEILING: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// Listener-level failures. Per-connection failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Server tuning.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_connections: usize,
    /// How long to wait for in-flight connections once accepting stops.
    pub drain_timeout: Duration,
    pub connection: ConnectionSettings,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            drain_timeout: Duration::from_secs(5),
            connection: ConnectionSettings::default(),
        }
    }
}

/// Owns a bound listener and serves it until shutdown.
pub struct Server<A: Acceptor> {
    acceptor: A,
    options: ServerOptions,
}

impl<A: Acceptor> Server<A> {
    /// `max_connections` is clamped to at least 1 and at most what the permit
    /// semaphore supports.
    pub fn new(acceptor: A, mut options: ServerOptions) -> Self {
        options.max_connections = options
            .max_connections
            .clamp(1, CONNECTION_LIMIT_CEILING);
        Self { acceptor, options }
    }

    /// Run until `stop` resolves or the listener fails.
    ///
    /// The accept loop runs on its own task; each connection gets another.
    /// Connections already in flight are not cancelled: they get up to
    /// `drain_timeout` to finish before this returns. Completion is logged
    /// whether the stop came from `stop` or from an accept failure.
    pub async fn run<F>(self, stop: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self { acceptor, options } = self;

        match acceptor.local_address() {
            Ok(addr) => info!(address = %addr, "Server listening"),
            Err(e) => debug!(error = %e, "Listener address unavailable"),
        }

        let max_connections = options.max_connections;
        let permits = Arc::new(Semaphore::new(max_connections));
        let settings = Arc::new(options.connection);
        let shutdown = Shutdown::new();

        // Single slot: the loop reports at most one terminal error.
        let (err_tx, mut err_rx) = mpsc::channel::<ServerError>(1);

        let accept_task = tokio::spawn(accept_loop(
            acceptor,
            Arc::clone(&permits),
            settings,
            shutdown.subscribe(),
            err_tx,
        ));

        let result = tokio::select! {
            _ = stop => {
                info!("Shutdown signal received, closing server...");
                Ok(())
            }
            Some(e) = err_rx.recv() => {
                error!(error = %e, "Server error");
                Err(e)
            }
        };

        shutdown.trigger();
        if let Err(e) = accept_task.await {
            error!(error = %e, "Accept loop panicked");
        }

        drain(&permits, max_connections, options.drain_timeout).await;
        info!("Server shutdown complete");
        result
    }
}

async fn accept_loop<A: Acceptor>(
    mut acceptor: A,
    permits: Arc<Semaphore>,
    settings: Arc<ConnectionSettings>,
    mut shutdown: ShutdownSignal,
    errors: mpsc::Sender<ServerError>,
) {
    loop {
        // Wait for a free slot before accepting.
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = acceptor.accept() => accepted,
        };

        match accepted {
            Ok(conn) => {
                let settings = Arc::clone(&settings);
                tokio::spawn(async move {
                    handle(conn, &settings).await;
                    drop(permit);
                });
            }
            Err(e) => {
                let _ = errors.try_send(ServerError::Accept(e));
                break;
            }
        }
    }

    acceptor.close();
    debug!("Accept loop stopped");
}

/// Wait until every connection permit is back, or the timeout elapses.
async fn drain(permits: &Semaphore, max_connections: usize, timeout: Duration) {
    let in_flight = max_connections - permits.available_permits();
    if in_flight == 0 {
        return;
    }
    if timeout.is_zero() {
        debug!(in_flight, "Not waiting for in-flight connections");
        return;
    }

    let Ok(all) = u32::try_from(max_connections) else {
        warn!(max_connections, "Connection cap too large to drain");
        return;
    };

    info!(in_flight, "Waiting for in-flight connections");
    match tokio::time::timeout(timeout, permits.acquire_many(all)).await {
        Ok(_) => debug!("All connections finished"),
        Err(_) => warn!(
            remaining = max_connections - permits.available_permits(),
            "Drain timeout elapsed, leaving connections running"
        ),
    }
}
