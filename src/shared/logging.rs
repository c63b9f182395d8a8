use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking log writers flushing; hold it until exit.
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Console logs go to stderr so they never interleave with a command's
/// stdout. With `log_dir` set, logs are also written to a daily rotated
/// `{service_name}.log` in that directory.
pub fn init_logging(log_dir: Option<&str>, service_name: &str) -> Result<LoggingGuard, anyhow::Error> {
    let mut guards = Vec::new();

    let (non_blocking_stderr, stderr_guard) = non_blocking(std::io::stderr());
    guards.push(stderr_guard);

    let console_layer = fmt::layer()
        .with_writer(non_blocking_stderr)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = rolling::daily(dir, format!("{service_name}.log"));
            let (non_blocking_file, file_guard) = non_blocking(file_appender);
            guards.push(file_guard);

            Some(
                fmt::layer()
                    .with_writer(non_blocking_file)
                    .with_ansi(false) // No colors in file logs
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = log_dir {
        info!("Logging initialized - logs will be written to {dir}/{service_name}.log");
    }

    Ok(LoggingGuard { _guards: guards })
}
