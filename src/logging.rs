use std::fs::File;
use std::io::Write;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn log_line(log: &mut File, message: &str, print: bool) -> Result<()> {
    if print {
        info!("{message}");
    }
    writeln!(log, "{message}")?;
    Ok(())
}

pub fn warn_line(log: &mut File, message: &str) -> Result<()> {
    warn!("{message}");
    writeln!(log, "{message}")?;
    Ok(())
}

pub fn sec_to_str(seconds: f64) -> String {
    let total = seconds.max(0.0);
    let hours = (total / 3600.0).floor();
    let minutes = ((total - hours * 3600.0) / 60.0).floor();
    let secs = total - hours * 3600.0 - minutes * 60.0;
    if hours > 0.0 {
        format!("{hours:.0}h {minutes:.0}m {secs:.2}s")
    } else if minutes > 0.0 {
        format!("{minutes:.0}m {secs:.2}s")
    } else {
        format!("{secs:.2}s")
    }
}
