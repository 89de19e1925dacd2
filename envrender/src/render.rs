//! Template rendering with environment and file lookups.
//!
//! Templates can call four lookup functions:
//!
//! - `env(name)`: the value of an environment variable or an empty string.
//! - `envDefault(name, default)`: the value of a variable or `default` if it
//!   is not set.
//! - `requiredEnv(name)`: the value of a variable.  A missing variable is
//!   logged and counted as a failed lookup.
//! - `readFile(path)`: the contents of a file.  A file that cannot be read is
//!   logged and counted as a failed lookup.
//!
//! Failed lookups render as empty strings so that every problem in a template
//! is reported in one run.  The caller decides what to do with the count.
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Error};
use minijinja::{context, Environment, Value};

use crate::config::Config;

/// The result of rendering a template.
#[derive(Debug)]
pub struct Rendered {
    pub output: String,
    pub failed_lookups: usize,
}

impl Rendered {
    pub fn has_errors(&self) -> bool {
        self.failed_lookups > 0
    }
}

/// Renders templates against a snapshot of the environment.
pub struct Renderer<'a> {
    config: &'a Config,
    vars: Arc<BTreeMap<String, String>>,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a Config, vars: BTreeMap<String, String>) -> Renderer<'a> {
        Renderer {
            config,
            vars: Arc::new(vars),
        }
    }

    /// Creates a renderer that reads the current process environment.
    pub fn from_process_env(config: &'a Config) -> Renderer<'a> {
        Renderer::new(config, snapshot_env(std::env::vars_os()))
    }

    /// Reads and renders the template at `path`.
    pub fn render_file(&self, path: &Path) -> Result<Rendered, Error> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("couldn't read template {}", path.display()))?;
        let name = path.display().to_string();
        self.render_named_str(&name, &source)
    }

    /// Renders a template from a string.
    pub fn render_named_str(&self, name: &str, source: &str) -> Result<Rendered, Error> {
        let failed_lookups = Arc::new(AtomicUsize::new(0));
        let env = self.create_env(failed_lookups.clone())?;
        let tmpl = env
            .template_from_named_str(name, source)
            .context("couldn't parse template")?;
        let output = tmpl.render(context! {}).context("couldn't render template")?;
        Ok(Rendered {
            output,
            failed_lookups: failed_lookups.load(Ordering::Relaxed),
        })
    }

    fn create_env<'source>(
        &self,
        failed_lookups: Arc<AtomicUsize>,
    ) -> Result<Environment<'source>, Error> {
        let mut env = Environment::new();
        env.set_debug(true);
        env.set_keep_trailing_newline(true);
        self.config.apply_to_env(&mut env)?;

        if self.config.expose_env() {
            env.add_global("ENV", Value::from_serialize(&*self.vars));
        }

        let vars = self.vars.clone();
        env.add_function("env", move |name: &str| -> String {
            vars.get(name).cloned().unwrap_or_default()
        });

        let vars = self.vars.clone();
        env.add_function("envDefault", move |name: &str, default: &str| -> String {
            match vars.get(name) {
                Some(value) => value.clone(),
                None => default.to_string(),
            }
        });

        let vars = self.vars.clone();
        let failed = failed_lookups.clone();
        env.add_function("requiredEnv", move |name: &str| -> String {
            match vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    tracing::error!("requiredEnv: environment variable {} is required", name);
                    failed.fetch_add(1, Ordering::Relaxed);
                    String::new()
                }
            }
        });

        let failed = failed_lookups;
        env.add_function("readFile", move |path: &str| -> String {
            // only I/O errors count as failures, content is taken as is
            match fs::read(path) {
                Ok(contents) => String::from_utf8_lossy(&contents).into_owned(),
                Err(err) => {
                    tracing::error!("readFile: error while reading {}: {}", path, err);
                    failed.fetch_add(1, Ordering::Relaxed);
                    String::new()
                }
            }
        });

        Ok(env)
    }
}

/// Copies environment variables into a map.  Values that are not valid
/// unicode are converted lossily.
pub fn snapshot_env<I>(vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect()
}
