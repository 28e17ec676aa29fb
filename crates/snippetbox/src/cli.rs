use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::Parser;

/// Snippetbox: share snippets of text
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// Listen address
    #[arg(long, short, default_value = "127.0.0.1:4000", env = "SNIPPETBOX_LISTEN")]
    pub listen: String,

    /// Where the database lives
    #[arg(long, env = "SNIPPETBOX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Root of the `html/` templates and `static/` assets
    #[arg(long, env = "SNIPPETBOX_UI_DIR")]
    pub ui_dir: Option<PathBuf>,

    /// Sessions idle for longer than this are logged out
    #[arg(long, default_value = "12", env = "SNIPPETBOX_SESSION_LIFETIME_HOURS")]
    pub session_lifetime_hours: u32,

    /// Only send the session cookie over https
    #[arg(long, env = "SNIPPETBOX_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Set SO_REUSEPORT
    #[arg(long, env = "SNIPPETBOX_REUSEPORT")]
    pub reuseport: bool,
}

static PROJECT_DIRS: LazyLock<directories::ProjectDirs> = LazyLock::new(|| {
    directories::ProjectDirs::from("org", "Snippetbox", "snippetbox")
        .expect("Unable to determine project's dir")
});

impl Opts {
    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_deref().unwrap_or_else(|| {
            PROJECT_DIRS
                .state_dir()
                .unwrap_or_else(|| PROJECT_DIRS.data_local_dir())
        })
    }

    pub fn to_web_opts(&self) -> snippetbox_web::Opts {
        let mut opts = snippetbox_web::Opts::new(
            self.listen.clone(),
            self.data_dir().to_owned(),
            self.ui_dir.clone(),
        );
        opts.session_lifetime = time::Duration::hours(self.session_lifetime_hours.into());
        opts.secure_cookies = self.secure_cookies;
        opts.reuseport = self.reuseport;
        opts
    }
}
