//! Log handles passed to fixtures.
//!
//! A [`LogHandle`] owns the `tracing` dispatcher that a fixture's events go to. It is
//! opened when created, every event is written straight through to its sink, and it is
//! never explicitly closed: the sink lives as long as the last clone of the handle.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

#[derive(Debug, Clone)]
pub struct LogHandle {
    dispatch: Dispatch,
}

impl LogHandle {
    /// Whatever subscriber is the default for the calling thread.
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(|dispatch| dispatch.clone()),
        }
    }

    /// Discard every event.
    pub fn none() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Log to a file at info level, truncating it.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Self::file_with_filter(path, "info")
    }

    /// Log to a file using `EnvFilter` directives, e.g. `info,sqlx=debug`.
    ///
    /// Writers share one `Mutex<File>`, so fixtures logging through clones of the same
    /// handle never interleave within a line.
    pub fn file_with_filter(path: impl AsRef<Path>, directives: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;

        let subscriber = fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            .with_env_filter(EnvFilter::new(directives))
            .finish();

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this handle as the thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for LogHandle {
    fn default() -> Self {
        Self::current()
    }
}

/// Console subscriber for the CLI.
///
/// `RUST_LOG` wins over the level derived from the flags.
pub fn initialize_cli_logging(level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
