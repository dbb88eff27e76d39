//! Process lifecycle: connect the store client, serve, wait for a signal,
//! then tear down in order (client first, then the HTTP server).

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use configs::{AppConfig, StoreBackend};
use service::StateStore;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::admin_http::admin_router;
use crate::errors::{LifecycleError, ShutdownError, StartupError, StatusPolicy};
use crate::routes::build_router;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
    Running,
    ShuttingDown,
    Stopped,
}

/// Tracks the process phase and rejects out-of-order transitions.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { phase: Phase::Uninitialized }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), LifecycleError> {
        use Phase::*;
        let allowed = matches!(
            (self.phase, next),
            (Uninitialized, Ready)
                | (Ready, Running)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        );
        if !allowed {
            return Err(LifecycleError::InvalidTransition { from: self.phase, to: next });
        }
        info!(event = "phase", from = ?self.phase, to = ?next, "lifecycle transition");
        self.phase = next;
        Ok(())
    }
}

/// An HTTP server running on a background task.
pub struct RunningServer {
    local_addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    /// Start serving `router` on `listener`; returns without waiting.
    pub fn start(listener: TcpListener, router: Router) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();
        let signal = token.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });
        Ok(Self { local_addr, token, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections; in-flight requests keep running.
    pub fn stop_accepting(&self) {
        self.token.cancel();
    }

    /// Wait for the serve task to finish draining.
    pub async fn wait(&mut self) -> Result<(), ShutdownError> {
        match (&mut self.handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ShutdownError::Serve(e.to_string())),
            Err(e) => Err(ShutdownError::Join(e.to_string())),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Stop accepting connections and wait up to `deadline` for in-flight
    /// requests. On timeout the serve task is aborted.
    pub async fn shutdown(self, deadline: Duration) -> Result<(), ShutdownError> {
        shutdown_together(self, None, deadline).await
    }
}

/// Stop both servers at once and drain them under one shared `deadline`.
/// Admin drain errors are logged; only the main server's outcome is returned.
pub async fn shutdown_together(
    mut main: RunningServer,
    mut admin: Option<RunningServer>,
    deadline: Duration,
) -> Result<(), ShutdownError> {
    main.stop_accepting();
    if let Some(admin) = &admin {
        admin.stop_accepting();
    }
    let drain = async {
        let admin_wait = async {
            match admin.as_mut() {
                Some(admin) => admin.wait().await,
                None => Ok(()),
            }
        };
        tokio::join!(main.wait(), admin_wait)
    };
    let outcome = tokio::time::timeout(deadline, drain).await;
    match outcome {
        Ok((result, admin_result)) => {
            if let Err(e) = admin_result {
                warn!(error = %e, "admin listener shutdown failed");
            }
            result
        }
        Err(_) => {
            main.abort();
            if let Some(admin) = &admin {
                admin.abort();
            }
            Err(ShutdownError::Timeout(deadline))
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// The service as a whole, driven through its lifecycle phases.
pub struct App {
    cfg: AppConfig,
    lifecycle: Lifecycle,
    store: Option<Arc<dyn StateStore>>,
}

impl App {
    pub fn new(cfg: AppConfig) -> Self {
        Self { cfg, lifecycle: Lifecycle::new(), store: None }
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Uninitialized -> Ready, building the store client from configuration.
    pub async fn connect(&mut self) -> Result<(), StartupError> {
        let store = service::connect(&self.cfg.store).await?;
        self.attach_store(store)
    }

    /// Uninitialized -> Ready with an already-built store client.
    pub fn attach_store(&mut self, store: Arc<dyn StateStore>) -> Result<(), StartupError> {
        self.lifecycle.advance(Phase::Ready)?;
        self.store = Some(store);
        Ok(())
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, StartupError> {
        let addr = self
            .cfg
            .server
            .bind_addr()
            .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
        TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr: addr.to_string(), source })
    }

    /// Ready -> Running -> (signal) -> ShuttingDown -> Stopped.
    pub async fn serve<F>(mut self, listener: TcpListener, signal: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send,
    {
        let store = self
            .store
            .clone()
            .ok_or(LifecycleError::MissingStore(self.lifecycle.phase()))?;
        let policy = StatusPolicy::from_strict(self.cfg.http.strict_status_codes);
        let router = build_router(AppState::new(Arc::clone(&store), policy));

        let addr = listener.local_addr().ok();
        let server = RunningServer::start(listener, router).map_err(|source| StartupError::Bind {
            addr: addr.map(|a| a.to_string()).unwrap_or_default(),
            source,
        })?;
        let admin = match self.start_admin().await {
            Ok(admin) => admin,
            Err(e) => {
                if let Err(err) = server.shutdown(self.cfg.server.shutdown_timeout()).await {
                    warn!(error = %err, "main listener shutdown failed");
                }
                store.close().await;
                return Err(e);
            }
        };
        self.lifecycle.advance(Phase::Running)?;
        self.log_listening(server.local_addr(), store.name());

        signal.await;
        info!(service = "server", event = "shutdown_signal", "shutdown requested");
        self.lifecycle.advance(Phase::ShuttingDown)?;

        store.close().await;
        let result = shutdown_together(server, admin, self.cfg.server.shutdown_timeout()).await;
        self.lifecycle.advance(Phase::Stopped)?;
        result?;

        info!(service = "server", event = "stop", "Server exiting");
        Ok(())
    }

    async fn start_admin(&self) -> Result<Option<RunningServer>, StartupError> {
        if !self.cfg.admin.enabled {
            return Ok(None);
        }
        let addr = self.cfg.admin.addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind { addr: addr.clone(), source })?;
        let admin = RunningServer::start(listener, admin_router())
            .map_err(|source| StartupError::Bind { addr, source })?;
        info!(addr = %admin.local_addr(), "admin server listening");
        Ok(Some(admin))
    }

    fn log_listening(&self, addr: SocketAddr, backend: &str) {
        info!(service = "server", event = "listening", %addr, backend, "server listening");
        if self.cfg.store.backend == StoreBackend::Dapr {
            info!(
                service = "server",
                event = "sidecar",
                endpoint = %self.cfg.store.dapr_base_url(),
                "using dapr sidecar state API"
            );
        }
    }
}

/// Public entry: build the store client, serve on the configured address and
/// stop on SIGINT/SIGTERM.
pub async fn run(cfg: AppConfig) -> Result<(), StartupError> {
    let mut app = App::new(cfg);
    app.connect().await?;
    let listener = app.bind().await?;
    app.serve(listener, shutdown_signal()).await
}

/// Process exit status for the outcome of [`run`].
pub fn exit_code(outcome: &Result<(), StartupError>) -> u8 {
    match outcome {
        Ok(()) => 0,
        Err(_) => 1,
    }
}
