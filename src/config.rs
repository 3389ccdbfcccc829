use std::net::SocketAddr;

use clap::Parser;

/// Log filter used when neither `--log-filter` nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "points_ledger_service=debug,tower_http=debug";

#[derive(Parser, Debug, Clone)]
#[command(name = "points-ledger-service")]
#[command(about = "Points ledger that spends the oldest points first")]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "LEDGER_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Tracing filter directives, e.g. `points_ledger_service=info`
    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,
}

impl Config {
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
