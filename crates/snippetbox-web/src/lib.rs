pub mod csrf;
mod error;
pub mod form;
pub mod middleware;
pub mod render;
mod routes;
pub mod session;
pub mod templates;
pub mod validator;

use std::future::Future;
use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Duration;
use std::{io, result};

use snafu::{Report, ResultExt as _, Snafu};
use snippetbox_db::{Database, DbError, SnippetRepository, UserRepository};
use snippetbox_session_store::{RedbSessionStore, SessionStoreError};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use self::error::{RequestError, RequestResult, status_response};
pub use self::routes::{
    SnippetCreateForm, UserLoginForm, UserSignupForm, make_router, session_layer,
};
use self::session::SessionLocks;
use self::templates::{TemplateCache, TemplateError};

pub const LOG_TARGET: &str = "snippetbox::web";

const SESSION_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub fn default_ui_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("ui")
}

#[derive(Clone, Debug)]
pub struct Opts {
    pub listen: String,
    pub data_dir: PathBuf,
    ui_dir: PathBuf,
    pub session_lifetime: time::Duration,
    pub secure_cookies: bool,
    pub reuseport: bool,
}

impl Opts {
    pub fn new(listen: String, data_dir: PathBuf, ui_dir: Option<PathBuf>) -> Self {
        Self {
            listen,
            data_dir,
            ui_dir: ui_dir.unwrap_or_else(default_ui_dir),
            session_lifetime: time::Duration::hours(12),
            secure_cookies: false,
            reuseport: false,
        }
    }

    pub fn ui_dir(&self) -> &Path {
        &self.ui_dir
    }

    pub fn html_dir(&self) -> PathBuf {
        self.ui_dir.join("html")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.ui_dir.join("static")
    }
}

/// Process-wide state handed to every request.
///
/// Storage sits behind the repository traits so tests can swap in fakes.
pub struct UiState {
    pub snippets: Arc<dyn SnippetRepository>,
    pub users: Arc<dyn UserRepository>,
    pub templates: TemplateCache,
    pub session_locks: SessionLocks,
}

impl UiState {
    pub fn new(
        snippets: Arc<dyn SnippetRepository>,
        users: Arc<dyn UserRepository>,
        templates: TemplateCache,
    ) -> Self {
        Self {
            snippets,
            users,
            templates,
            session_locks: SessionLocks::default(),
        }
    }
}

pub type SharedState = Arc<UiState>;

#[derive(Debug, Snafu)]
pub enum WebServerError {
    #[snafu(transparent)]
    Io { source: io::Error },
    ListenAddr { source: AddrParseError },
    #[snafu(display("Failed to open database"))]
    Db { source: DbError },
    #[snafu(display("Failed to open session store"))]
    SessionStore { source: SessionStoreError },
    #[snafu(display("Failed to load templates"))]
    Templates { source: TemplateError },
}
pub type ServerResult<T> = result::Result<T, WebServerError>;

pub struct Server {
    listener: TcpListener,
    state: SharedState,
    session_store: RedbSessionStore,
    opts: Opts,
}

impl Server {
    /// Bind, open storage and compile templates. Any failure here is fatal.
    pub async fn init(opts: Opts) -> ServerResult<Server> {
        let listener = Self::get_listener(&opts).await?;

        let db_path = Database::mk_db_path(&opts.data_dir).await?;
        let db = Database::open(db_path).await.context(DbSnafu)?;
        let shared_db = db.shared();
        let session_store = tokio::task::block_in_place(|| RedbSessionStore::new(shared_db))
            .context(SessionStoreSnafu)?;

        let templates = TemplateCache::load(&opts.html_dir()).context(TemplatesSnafu)?;
        info!(target: LOG_TARGET, pages = templates.len(), "Templates loaded");

        let db = Arc::new(db);
        let state = Arc::new(UiState::new(db.clone(), db, templates));

        info!(target: LOG_TARGET, addr = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            state,
            session_store,
            opts,
        })
    }

    pub async fn get_listener(opts: &Opts) -> ServerResult<TcpListener> {
        let socket = {
            let addr = SocketAddr::from_str(&opts.listen).context(ListenAddrSnafu)?;

            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            if opts.reuseport {
                #[cfg(unix)]
                socket.set_reuseport(true)?;
            }
            socket.set_nodelay(true)?;

            socket.bind(addr)?;

            socket
        };

        Ok(socket.listen(1024)?)
    }

    pub fn addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn run(self) -> ServerResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        let reaper = spawn_session_reaper(self.session_store.clone());

        let router = make_router(
            self.state.clone(),
            session_layer(
                self.session_store,
                self.opts.session_lifetime,
                self.opts.secure_cookies,
            ),
            &self.opts.static_dir(),
        );

        info!(target: LOG_TARGET, "Starting server");
        let res = axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        reaper.abort();
        info!(target: LOG_TARGET, "Server stopped");
        Ok(res?)
    }
}

fn spawn_session_reaper(store: RedbSessionStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_REAP_INTERVAL);
        loop {
            interval.tick().await;
            match store.delete_expired().await {
                Ok(0) => {}
                Ok(count) => debug!(target: LOG_TARGET, count, "Expired sessions removed"),
                Err(err) => warn!(
                    target: LOG_TARGET,
                    err = %Report::from_error(&err),
                    "Failed to remove expired sessions"
                ),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
