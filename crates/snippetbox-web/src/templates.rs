//! Startup-compiled page templates.
//!
//! Layout of the html directory:
//!
//! ```text
//! base.html          shared layout, defines the blocks pages fill in
//! partials/*.html    fragments included by the layout or pages
//! pages/*.html       one file per page, `{% extends "base.html" %}`
//! ```
//!
//! Every page gets its own [`TemplateSet`] holding the layout, all partials
//! and that one page. Block inheritance resolves the most specific
//! definition, so a page overrides the layout's defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{fs, io};

use minijinja::{Environment, ErrorKind};
use serde::Serialize;
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};

use crate::LOG_TARGET;

pub const BASE_TEMPLATE: &str = "base.html";
const PARTIALS_DIR: &str = "partials";
const PAGES_DIR: &str = "pages";
const TEMPLATE_EXT: &str = "html";

#[derive(Debug, Snafu)]
pub enum TemplateError {
    #[snafu(display("Could not read directory {}", path.display()))]
    ReadDir { path: PathBuf, source: io::Error },
    #[snafu(display("Could not read template {}", path.display()))]
    ReadFile { path: PathBuf, source: io::Error },
    #[snafu(display("Invalid template file name {}", path.display()))]
    FileName { path: PathBuf },
    #[snafu(display("Failed to compile `{name}` for page `{page}`"))]
    Compile {
        page: String,
        name: String,
        source: minijinja::Error,
    },
    #[snafu(display("No page templates found in {}", path.display()))]
    NoPages { path: PathBuf },
}
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// A fully composed layout + partials + page, ready to render.
#[derive(Debug)]
pub struct TemplateSet {
    page: String,
    env: Environment<'static>,
}

impl TemplateSet {
    fn compose(
        page: &str,
        page_source: &str,
        base_source: &str,
        partials: &[(String, String)],
    ) -> TemplateResult<Self> {
        let mut env = Environment::new();
        env.add_filter("human_date", human_date);

        let mut add = |name: &str, source: &str| {
            env.add_template_owned(name.to_owned(), source.to_owned())
                .context(CompileSnafu { page, name })
        };
        add(BASE_TEMPLATE, base_source)?;
        for (name, source) in partials {
            add(name, source)?;
        }
        add(page, page_source)?;

        Ok(Self {
            page: page.to_owned(),
            env,
        })
    }

    pub fn render<S: Serialize>(&self, ctx: &S) -> Result<String, minijinja::Error> {
        self.env.get_template(&self.page)?.render(ctx)
    }
}

/// Page name to composed template set. Built once, then only read.
#[derive(Debug)]
pub struct TemplateCache(HashMap<String, TemplateSet>);

impl TemplateCache {
    /// Compile every page under `html_dir`. Any failure aborts the whole
    /// load; a partially populated cache is never returned.
    pub fn load(html_dir: &Path) -> TemplateResult<Self> {
        info!(target: LOG_TARGET, dir = %html_dir.display(), "Loading templates");

        let base_path = html_dir.join(BASE_TEMPLATE);
        let base_source = fs::read_to_string(&base_path).context(ReadFileSnafu { path: base_path })?;

        let mut partials = vec![];
        let partials_dir = html_dir.join(PARTIALS_DIR);
        if partials_dir.is_dir() {
            for path in list_templates(&partials_dir)? {
                let name = format!("{PARTIALS_DIR}/{}", file_name(&path)?);
                let source = fs::read_to_string(&path).context(ReadFileSnafu { path })?;
                partials.push((name, source));
            }
        }

        let pages_dir = html_dir.join(PAGES_DIR);
        let mut cache = HashMap::new();
        for path in list_templates(&pages_dir)? {
            let page = file_name(&path)?.to_owned();
            let source = fs::read_to_string(&path).context(ReadFileSnafu { path: &path })?;

            let set = TemplateSet::compose(&page, &source, &base_source, &partials)?;
            debug!(target: LOG_TARGET, %page, "Template compiled");
            cache.insert(page, set);
        }

        if cache.is_empty() {
            return NoPagesSnafu { path: pages_dir }.fail();
        }

        Ok(Self(cache))
    }

    pub fn get(&self, page: &str) -> Option<&TemplateSet> {
        self.0.get(page)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Template files in `dir`, sorted for a deterministic build order.
fn list_templates(dir: &Path) -> TemplateResult<Vec<PathBuf>> {
    let mut paths = vec![];
    for entry in fs::read_dir(dir).context(ReadDirSnafu { path: dir })? {
        let path = entry.context(ReadDirSnafu { path: dir })?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == TEMPLATE_EXT) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> TemplateResult<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .context(FileNameSnafu { path })
}

/// `{{ snippet.created | human_date }}`: unix seconds to a UTC display date.
fn human_date(unix_secs: i64) -> Result<String, minijinja::Error> {
    let format = format_description!("[day] [month repr:short] [year] at [hour]:[minute]");
    OffsetDateTime::from_unix_timestamp(unix_secs)
        .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))?
        .format(format)
        .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))
}
