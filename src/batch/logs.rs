//! Per-attempt log capture.
//!
//! Every attempt writes `out_<n>.txt` (all pipeline events) and
//! `err_<n>.txt` (warnings, errors and the failure report) into the
//! sample output folder, so a failure can be traced to one attempt.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::util::{Error, Result};

/// Log file pair of one attempt.
#[derive(Debug)]
pub struct AttemptLog {
    out_path: PathBuf,
    err_path: PathBuf,
    out: Arc<File>,
    err: Arc<File>,
    /// Also echo events to the console at this level.
    echo: Option<LevelFilter>,
}

impl AttemptLog {
    /// Create (truncate) the log pair for attempt `attempt` in `folder`.
    pub fn create(folder: &Path, attempt: u32, echo: Option<LevelFilter>) -> Result<Self> {
        std::fs::create_dir_all(folder)?;
        let out_path = folder.join(format!("out_{}.txt", attempt));
        let err_path = folder.join(format!("err_{}.txt", attempt));
        Ok(Self {
            out: Arc::new(File::create(&out_path)?),
            err: Arc::new(File::create(&err_path)?),
            out_path,
            err_path,
            echo,
        })
    }

    #[inline]
    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    #[inline]
    pub fn err_path(&self) -> &Path {
        &self.err_path
    }

    /// Run `f` with every tracing event on this thread routed to the log pair.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let out = fmt::layer()
            .with_writer(self.out.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::DEBUG);
        let err = fmt::layer()
            .with_writer(self.err.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::WARN);
        let console = self.echo.map(|level| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(level)
        });

        let subscriber = tracing_subscriber::registry().with(out).with(err).with(console);
        tracing::subscriber::with_default(subscriber, f)
    }

    /// Append the full error chain to the err log.
    pub fn write_failure(&self, error: &Error) -> Result<()> {
        let mut file = &*self.err;
        writeln!(file, "error")?;
        writeln!(file, "{}", error.report())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_events_routed_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let log = AttemptLog::create(dir.path(), 2, None).unwrap();
        log.scope(|| {
            tracing::info!("loading sample");
            tracing::warn!("vertex count mismatch");
        });
        log.write_failure(&Error::host("boom")).unwrap();

        assert!(log.out_path().ends_with("out_2.txt"));
        let out = fs::read_to_string(log.out_path()).unwrap();
        let err = fs::read_to_string(log.err_path()).unwrap();
        assert!(out.contains("loading sample"));
        assert!(out.contains("vertex count mismatch"));
        assert!(!err.contains("loading sample"));
        assert!(err.contains("vertex count mismatch"));
        assert!(err.contains("Scene host error: boom"));
    }

    #[test]
    fn test_create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("err_1.txt"), "stale").unwrap();
        let log = AttemptLog::create(dir.path(), 1, None).unwrap();
        assert_eq!(fs::read_to_string(log.err_path()).unwrap(), "");
    }
}
