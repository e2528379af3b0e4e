use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber.
///
/// Console output is filtered by `RUST_LOG` (default
/// `myrvm=info,myrvm_cache=info,myrvm_session=info,redis=warn`). When
/// `LOG_DIR` is set, structured JSON is also written to a daily-rolling
/// `myrvm.*.json` file there.
pub fn init_tracing() {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}=info,myrvm_cache=info,myrvm_session=info,redis=warn",
            env!("CARGO_CRATE_NAME")
        ))
    });

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .with_filter(console_filter);

    // JSON file layer for structured logs (can be ingested by Loki)
    let json_layer = std::env::var("LOG_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .and_then(|dir| {
            match RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("myrvm")
                .filename_suffix("json")
                .build(&dir)
            {
                Ok(appender) => Some(appender),
                Err(e) => {
                    eprintln!("⚠️  Failed to open log directory {}: {}. Logging to console only", dir, e);
                    None
                }
            }
        })
        .map(|appender| {
            fmt::layer()
                .json()
                .with_writer(appender)
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(EnvFilter::new("info"))
        });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(json_layer)
        .init();
}
