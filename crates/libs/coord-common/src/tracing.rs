use tracing_subscriber::{EnvFilter, fmt};

/// Initialize process-wide structured logging.
///
/// Respects `RUST_LOG` for filtering, falling back to `default_filter` when
/// unset, and switches between human-readable and JSON output depending on
/// `json`. Safe to call once per process; a second call is a no-op since
/// `tracing_subscriber`'s global default can only be set once.
pub fn init(json: bool, default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr);

    let result = if json {
        subscriber.json().try_init()
    } else {
        subscriber.pretty().try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing already initialized: {err}");
    }
}
