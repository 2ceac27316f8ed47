//! HTTP host for hothost applications.
//!
//! [`HttpHost`] serves the built-in endpoints next to whatever routes the application
//! merges in with [`HttpHost::with_routes`]:
//!
//! | Route | Guard | Answer |
//! |---|---|---|
//! | `GET /version` | none | version document |
//! | `GET /infos` | allow-list | diagnostics report |
//! | `PUT /autoupdate` | allow-list + `UpdateSecret` | `update received`, then hand-off |
//!
//! When `Http:IgnorePrefix` is set (e.g. `/billing` behind a reverse proxy) every route is
//! answered both at the root and under the prefix. The prefix is read on each request.
//!
//! `Http:Listen` lists one or more socket addresses separated by `;`. When the
//! configuration reports a change (see [`ConfigReader::changes`]) and the list differs,
//! the listeners are drained and bound again.

mod routes;

use crate::config::ConfigReader;
use crate::constants::{DEFAULT_LISTEN, keys};
use crate::update::{AccessGuard, PlatformUpdateApplier, TempExecutable, UpdatePayloadReceiver};
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::Uri;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::Layer;
use tower::util::MapRequestLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use routes::builtin_routes;

/// Receives a staged upload once the HTTP response has been sent.
///
/// Called from a blocking thread, so implementations may do file and process work.
pub trait UpdateSink: Send + Sync + 'static {
    fn deliver(&self, staged: TempExecutable);
}

impl UpdateSink for PlatformUpdateApplier {
    fn deliver(&self, staged: TempExecutable) {
        match self.apply(&staged.path) {
            Ok(handoff) => handoff.finish(),
            Err(err) => error!("Could not apply update {}: {}", staged.path.display(), err),
        }
    }
}

/// State shared by the built-in handlers.
pub struct AppState {
    pub config: Arc<dyn ConfigReader>,
    pub guard: AccessGuard,
    pub receiver: UpdatePayloadReceiver,
    pub sink: Arc<dyn UpdateSink>,
}

impl AppState {
    pub fn new(config: Arc<dyn ConfigReader>, sink: Arc<dyn UpdateSink>) -> Self {
        Self {
            guard: AccessGuard::new(Arc::clone(&config)),
            receiver: UpdatePayloadReceiver::new(Arc::clone(&config)),
            config,
            sink,
        }
    }
}

/// Builder and runner for the HTTP listener.
pub struct HttpHost {
    config: Arc<dyn ConfigReader>,
    sink: Arc<dyn UpdateSink>,
    extra: Router,
}

impl HttpHost {
    /// Host whose uploads are applied by a [`PlatformUpdateApplier`].
    pub fn new(config: Arc<dyn ConfigReader>) -> Self {
        let sink = Arc::new(PlatformUpdateApplier::new(Arc::clone(&config)));
        Self {
            config,
            sink,
            extra: Router::new(),
        }
    }

    /// Merge application routes.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra = self.extra.merge(routes);
        self
    }

    /// Replace what happens to staged uploads.
    pub fn with_update_sink(mut self, sink: Arc<dyn UpdateSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The complete router, without prefix handling.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState::new(Arc::clone(&self.config), Arc::clone(&self.sink)));

        Router::new()
            .merge(builtin_routes())
            .with_state(state)
            .merge(self.extra.clone())
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind every configured listen address.
    pub async fn bind(self) -> Result<BoundHost> {
        let router = self.router();
        let addresses = listen_addresses(&self.config.get_or_empty(keys::HTTP_LISTEN));
        let listeners = bind_all(&addresses).await?;

        Ok(BoundHost {
            listeners,
            addresses,
            router,
            config: self.config,
        })
    }

    /// Bind and serve until Ctrl-C (or SIGTERM on Unix).
    pub async fn serve(self) -> Result<()> {
        self.bind().await?.run_until(shutdown_signal()).await
    }
}

/// Listeners that are bound but not yet serving.
pub struct BoundHost {
    listeners: Vec<TcpListener>,
    addresses: Vec<String>,
    router: Router,
    config: Arc<dyn ConfigReader>,
}

impl BoundHost {
    /// Actual addresses, useful when binding port 0.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().filter_map(|l| l.local_addr().ok()).collect()
    }

    /// Serve all listeners until `shutdown` completes, then drain in-flight requests.
    ///
    /// A change of `Http:Listen` drains the current listeners and binds the new list. If
    /// the new list cannot be bound the host stops with that error.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let BoundHost {
            mut listeners,
            mut addresses,
            router,
            config,
        } = self;
        let mut changes = config.changes();
        tokio::pin!(shutdown);

        loop {
            let (stop_tx, mut servers) = spawn_servers(listeners, &router, &config);

            let rebind = loop {
                tokio::select! {
                    () = &mut shutdown => break None,
                    () = next_change(&mut changes) => {
                        let wanted = listen_addresses(&config.get_or_empty(keys::HTTP_LISTEN));
                        if wanted != addresses {
                            break Some(wanted);
                        }
                    }
                    Some(joined) = servers.join_next() => {
                        joined
                            .context("HTTP listener task panicked")?
                            .context("HTTP listener failed")?;
                    }
                }
            };

            let _ = stop_tx.send(true);
            while let Some(joined) = servers.join_next().await {
                joined.context("HTTP listener task panicked")?.context("HTTP listener failed")?;
            }

            match rebind {
                None => {
                    info!("HTTP listeners stopped");
                    return Ok(());
                }
                Some(wanted) => {
                    warn!("Http:Listen changed, restarting listeners on {}", wanted.join(";"));
                    listeners = bind_all(&wanted).await?;
                    addresses = wanted;
                }
            }
        }
    }
}

async fn bind_all(addresses: &[String]) -> Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(addresses.len());
    for addr in addresses {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen on {addr}"))?;
        info!("Listening on http://{}", listener.local_addr()?);
        listeners.push(listener);
    }
    Ok(listeners)
}

fn spawn_servers(
    listeners: Vec<TcpListener>,
    router: &Router,
    config: &Arc<dyn ConfigReader>,
) -> (watch::Sender<bool>, JoinSet<std::io::Result<()>>) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut servers = JoinSet::new();

    for listener in listeners {
        let config = Arc::clone(config);
        let app = MapRequestLayer::new(move |request: Request| {
            strip_ignore_prefix(config.as_ref(), request)
        })
        .layer(router.clone());
        let service =
            axum::ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app);

        let mut stop = stop_rx.clone();
        servers.spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                })
                .await
        });
    }

    (stop_tx, servers)
}

/// Resolves on the next configuration change; never when the reader cannot change.
async fn next_change(changes: &mut Option<watch::Receiver<u64>>) {
    let closed = match changes.as_mut() {
        Some(rx) => rx.changed().await.is_err(),
        None => true,
    };
    if closed {
        *changes = None;
        std::future::pending::<()>().await;
    }
}

/// Split `Http:Listen`; empty means the default address.
pub fn listen_addresses(value: &str) -> Vec<String> {
    let addrs: Vec<String> = value
        .split([';', ','])
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if addrs.is_empty() {
        vec![DEFAULT_LISTEN.to_string()]
    } else {
        addrs
    }
}

/// Normalise `Http:IgnorePrefix` to `/segment[/segment]`, `None` when unset or `/`.
fn ignore_prefix(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// Remove the configured `Http:IgnorePrefix` from the request path before routing.
fn strip_ignore_prefix(config: &dyn ConfigReader, mut request: Request) -> Request {
    let Some(prefix) = ignore_prefix(&config.get_or_empty(keys::HTTP_IGNORE_PREFIX)) else {
        return request;
    };

    let uri = request.uri();
    let rest = match uri.path().strip_prefix(prefix.as_str()) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => return request,
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    if let Ok(path_and_query) = path_and_query.parse() {
        parts.path_and_query = Some(path_and_query);
        if let Ok(stripped) = Uri::from_parts(parts) {
            *request.uri_mut() = stripped;
        }
    }
    request
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
