use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Tag management sidecar. Reads one JSON request per line on stdin and writes
/// one JSON response per line on stdout; logs go to stderr.
#[derive(Debug, Clone, Parser)]
#[command(name = "tagd", version, about)]
pub struct Config {
    /// Workspace directory to open at start-up.
    #[arg(long, env = "TAGD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Tracing filter directive, e.g. `info` or `tagd=debug`.
    #[arg(long = "log", env = "TAGD_LOG", default_value = "info")]
    pub log_filter: String,

    /// How long a write waits on another connection's lock.
    #[arg(long, env = "TAGD_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let cfg = Config::try_parse_from(["tagd"]).expect("parse");
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.busy_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = Config::try_parse_from([
            "tagd",
            "--workspace",
            "/tmp/ws",
            "--log",
            "tagd=debug",
            "--busy-timeout-ms",
            "250",
        ])
        .expect("parse");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.log_filter, "tagd=debug");
        assert_eq!(cfg.busy_timeout_ms, 250);
    }
}
