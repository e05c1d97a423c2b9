//! Line-oriented stdout report.
//!
//! ```text
//! ## alice@node01
//! # Computing <nlm> for 64 images of size 1024x1024
//! # Copy: total = 1.234567s
//! # Pass-through: total = 0.987654s
//! ```

use std::io::{self, Write};

use mgpu_common::LaunchDims;
use mgpu_opencl::{NLM_ENTRY, StrategyTiming};

pub fn identity_line(user: &str, host: &str) -> String {
    format!("## {user}@{host}")
}

pub fn config_line(num_images: usize, dims: &LaunchDims) -> String {
    format!(
        "# Computing <{NLM_ENTRY}> for {num_images} images of size {}x{}",
        dims.width(),
        dims.height()
    )
}

pub fn summary_line(timing: &StrategyTiming) -> String {
    format!("# {}: total = {:.6}s", timing.strategy.name(), timing.seconds())
}

/// Login name from the environment.
pub fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn current_host() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// Writes report lines, flushing after each so they interleave sanely with
/// stderr logging.
pub struct Report<W: Write> {
    out: W,
}

impl<W: Write> Report<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn identity(&mut self, user: &str, host: &str) -> io::Result<()> {
        self.line(&identity_line(user, host))
    }

    pub fn configuration(&mut self, num_images: usize, dims: &LaunchDims) -> io::Result<()> {
        self.line(&config_line(num_images, dims))
    }

    pub fn summary(&mut self, timing: &StrategyTiming) -> io::Result<()> {
        self.line(&summary_line(timing))
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }
}
