use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::Result;

pub const RUN_LOG_NAME: &str = "run.log";

/// Append-only, timestamped progress log kept next to the outputs.
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(RUN_LOG_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, message: &str) -> Result<()> {
        log::info!("{}", message);
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.file, "[{}] {}", now, message)?;
        Ok(())
    }

    pub fn timing(&mut self, what: &str, elapsed: Duration) -> Result<()> {
        self.line(&format!(
            "{} in {:.4} second(s)",
            what,
            elapsed.as_secs_f64()
        ))
    }
}
