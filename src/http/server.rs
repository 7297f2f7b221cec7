//! HTTP/HTTPS server startup logic.
//!
//! Startup order matters: the served directory is resolved, the TLS identity is
//! provisioned, and the key guard is built into the router before either
//! listener exists. Each listener then runs as its own task; both are joined on
//! shutdown.

use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::guard::KeyGuard;
use crate::tls::{obtain_identity, IdentityPaths, IdentitySource};

use super::shutdown::ShutdownHandle;
use super::static_files::create_router;

/// A configured server whose TLS identity and router are ready.
pub struct Server {
    config: ServerConfig,
    served_root: PathBuf,
    router: Router,
    tls: Option<ActiveTls>,
}

struct ActiveTls {
    rustls_config: RustlsConfig,
    source: IdentitySource,
}

impl Server {
    /// Resolve the served directory, provision the TLS identity (if HTTPS is
    /// enabled) and assemble the guarded router.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let served_root = resolve_served_dir(&config.dir)?;
        tracing::info!(path = %served_root.display(), "Serving directory");

        let (tls, guard) = if config.tls.is_active() {
            let paths = IdentityPaths::new(&config.tls.cert_path, &config.tls.key_path);
            let persist_to = config.tls.save_generated.then_some(&paths);
            let (identity, source) = obtain_identity(&paths, persist_to)?;

            let guard = KeyGuard::new(&served_root, &paths.key);
            if guard.protected_key().is_some() {
                tracing::info!(key = %paths.key.display(), "Private key is inside the served directory; blocking access");
            }

            let tls = ActiveTls {
                rustls_config: RustlsConfig::from_config(identity.server_config()),
                source,
            };
            (Some(tls), guard)
        } else {
            (None, KeyGuard::disabled())
        };

        let router = create_router(&served_root, Arc::new(guard));

        Ok(Self {
            config,
            served_root,
            router,
            tls,
        })
    }

    /// Canonical path of the served directory.
    pub fn served_root(&self) -> &Path {
        &self.served_root
    }

    /// How the TLS identity was obtained, or `None` without HTTPS.
    pub fn identity_source(&self) -> Option<IdentitySource> {
        self.tls.as_ref().map(|tls| tls.source)
    }

    /// Bind the configured addresses and start serving.
    pub fn start(self) -> Result<RunningServer, ServerError> {
        let http = self
            .config
            .http_addr()?
            .map(|addr| bind("HTTP", addr))
            .transpose()?;
        let https = self
            .config
            .https_addr()?
            .map(|addr| bind("HTTPS", addr))
            .transpose()?;
        self.start_on(http, https)
    }

    /// Start serving on already-bound listeners.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_on(
        self,
        http: Option<TcpListener>,
        https: Option<TcpListener>,
    ) -> Result<RunningServer, ServerError> {
        if https.is_some() && self.tls.is_none() {
            return Err(ServerError::TlsDisabled);
        }

        let mut tasks = JoinSet::new();
        let mut handles = Vec::new();
        let mut http_addr = None;
        let mut https_addr = None;

        if let Some(listener) = http {
            let addr = prepare_listener("HTTP", &listener)?;
            let handle = Handle::new();
            let server = axum_server::from_tcp(listener).handle(handle.clone());
            let app = self.router.clone();

            tracing::info!(%addr, "HTTP listening");
            tasks.spawn(async move {
                server
                    .serve(app.into_make_service())
                    .await
                    .map_err(|source| ServerError::Serve {
                        listener: "HTTP",
                        source,
                    })
            });
            handles.push(handle);
            http_addr = Some(addr);
        }

        if let (Some(listener), Some(tls)) = (https, self.tls.as_ref()) {
            let addr = prepare_listener("HTTPS", &listener)?;
            let handle = Handle::new();
            let server = axum_server::from_tcp_rustls(listener, tls.rustls_config.clone())
                .handle(handle.clone());
            let app = self.router.clone();

            match tls.source {
                IdentitySource::Loaded => tracing::info!(
                    %addr,
                    cert = %self.config.tls.cert_path.display(),
                    key = %self.config.tls.key_path.display(),
                    "HTTPS listening"
                ),
                IdentitySource::Generated { .. } => tracing::info!(
                    %addr,
                    "HTTPS listening (using generated self-signed certificate)"
                ),
            }
            tasks.spawn(async move {
                server
                    .serve(app.into_make_service())
                    .await
                    .map_err(|source| ServerError::Serve {
                        listener: "HTTPS",
                        source,
                    })
            });
            handles.push(handle);
            https_addr = Some(addr);
        }

        Ok(RunningServer {
            http_addr,
            https_addr,
            shutdown: ShutdownHandle::new(handles),
            tasks,
        })
    }
}

/// Listeners that are accepting connections.
pub struct RunningServer {
    http_addr: Option<SocketAddr>,
    https_addr: Option<SocketAddr>,
    shutdown: ShutdownHandle,
    tasks: JoinSet<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    /// A handle that can stop this server from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Begin graceful shutdown of all listeners.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for all listeners to stop.
    ///
    /// If one listener fails, the others are shut down and the first error is
    /// returned.
    pub async fn wait(mut self) -> Result<(), ServerError> {
        let mut result = Ok(());
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined
                .map_err(|e| ServerError::Task(e.to_string()))
                .and_then(|served| served);
            if let Err(e) = outcome {
                if result.is_ok() {
                    tracing::error!(error = %e, "Listener stopped, shutting down");
                    self.shutdown.shutdown();
                    result = Err(e);
                } else {
                    tracing::error!(error = %e, "Listener stopped");
                }
            }
        }
        result
    }
}

fn resolve_served_dir(dir: &Path) -> Result<PathBuf, ServerError> {
    let served_dir_error = |source| ServerError::ServedDir {
        path: dir.to_path_buf(),
        source,
    };
    let resolved = std::fs::canonicalize(dir).map_err(served_dir_error)?;
    if !resolved.is_dir() {
        return Err(served_dir_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }
    Ok(resolved)
}

fn bind(listener: &'static str, addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).map_err(|source| ServerError::Bind { listener, source })
}

fn prepare_listener(
    listener: &'static str,
    socket: &TcpListener,
) -> Result<SocketAddr, ServerError> {
    let bind_error = |source| ServerError::Bind { listener, source };
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.local_addr().map_err(bind_error)
}
