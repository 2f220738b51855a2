//! Unified logging for codetrace.
//!
//! Provides compact timestamped logging, honoring `RUST_LOG` over the
//! configured level so operators can override verbosity without editing
//! `.codetrace/settings.toml`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize logging with configuration. Call once at startup; safe to call
/// multiple times, only the first call takes effect. `RUST_LOG` always wins
/// over `config.level`.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(&config.level)
        };

        if config.json {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_timer(CompactTime)
                .with_level(true)
                .json()
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_timer(CompactTime)
                .with_level(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).init();
        }
    });
}

pub fn init() {
    init_with_config(&LoggingConfig::default());
}
