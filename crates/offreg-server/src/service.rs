//! Lifecycle of the HTTP listener.

use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use offreg_config::config::Config;
use offreg_core::{Registry, UrlProvider};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{Result, ServiceError},
    routes,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: offreg_config::config::DEFAULT_HOST.to_string(),
            port: offreg_config::config::DEFAULT_PORT,
        }
    }
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.host().to_string(),
            port: config.port(),
        }
    }
}

/// Where a running service can be reached.
///
/// `host` is the configured name; `url` uses the address actually bound, since
/// a name like `localhost` may resolve to an address family nobody listens on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceBinding {
    pub host: String,
    pub port: u16,
    pub url: Url,
}

impl ServiceBinding {
    fn new(host: &str, addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            host: host.to_string(),
            port: addr.port(),
            url: Url::parse(&format!("http://{addr}/"))?,
        })
    }
}

/// The current binding, shared with the registry to build tarball links.
#[derive(Default)]
struct SharedBinding(RwLock<Option<ServiceBinding>>);

impl SharedBinding {
    fn get(&self) -> Option<ServiceBinding> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, binding: Option<ServiceBinding>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = binding;
    }
}

impl UrlProvider for SharedBinding {
    fn base_url(&self) -> Option<String> {
        self.get().map(|binding| binding.url.to_string())
    }
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

enum State {
    Created,
    Bound(Running),
    Stopped,
}

impl State {
    fn label(&self) -> &'static str {
        match self {
            State::Created => "created",
            State::Bound(_) => "bound",
            State::Stopped => "stopped",
        }
    }
}

/// HTTP front end of a [`Registry`].
///
/// A service is started at most once: `Created -> Bound -> Stopped`.
pub struct Service {
    config: ServiceConfig,
    state: Mutex<State>,
    binding: Arc<SharedBinding>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .field("binding", &self.binding.get())
            .finish()
    }
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Created),
            binding: Arc::default(),
        }
    }

    /// Binds the listener and starts answering requests for `registry`.
    ///
    /// The returned binding is usable right away: the socket is listening
    /// before this resolves. The service also becomes the registry's URL
    /// provider.
    pub async fn run(&self, registry: Arc<Registry>) -> Result<ServiceBinding> {
        {
            let state = self.lock_state();
            if !matches!(*state, State::Created) {
                return Err(ServiceError::InvalidState {
                    action: "run",
                    state: state.label(),
                });
            }
        }

        let ServiceConfig { host, port } = &self.config;
        let listener = TcpListener::bind((host.as_str(), *port))
            .await
            .map_err(|source| {
                ServiceError::BindFailure {
                    addr: format!("{host}:{port}"),
                    source,
                }
            })?;
        let local_addr = listener.local_addr().map_err(|source| {
            ServiceError::BindFailure {
                addr: format!("{host}:{port}"),
                source,
            }
        })?;
        let binding = ServiceBinding::new(host, local_addr)?;

        let mut state = self.lock_state();
        // Another caller may have won the race while we were binding.
        if !matches!(*state, State::Created) {
            return Err(ServiceError::InvalidState {
                action: "run",
                state: state.label(),
            });
        }

        self.binding.set(Some(binding.clone()));
        registry.set_service_provider(self.url_provider());

        let (shutdown, shutdown_rx) = oneshot::channel();
        let app = routes::router(registry);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        *state = State::Bound(Running { shutdown, task });
        info!("listening on {}", binding.url);

        Ok(binding)
    }

    /// `http://<host>:<port>/` while bound.
    pub fn url(&self) -> Option<Url> {
        self.binding.get().map(|binding| binding.url)
    }

    /// A handle resolving to this service's URL, for [`Registry::set_service_provider`].
    pub fn url_provider(&self) -> Arc<dyn UrlProvider> {
        self.binding.clone()
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        matches!(*self.lock_state(), State::Bound(_))
    }

    /// Stops accepting connections and waits for in-flight responses.
    ///
    /// Does nothing unless the service is bound.
    pub async fn stop(&self) -> Result<()> {
        let running = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Bound(running) => running,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        self.binding.set(None);
        let _ = running.shutdown.send(());

        match running.task.await {
            Ok(Ok(())) => {
                debug!("service stopped");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!("server exited with error: {err}");
                Ok(())
            }
            Err(err) => Err(ServiceError::Task(err.to_string())),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
