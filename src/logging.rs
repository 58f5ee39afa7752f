use tracing_subscriber::EnvFilter;

/// Environment variable that switches the log formatter to JSON lines.
pub const LOG_FORMAT_ENV: &str = "LINKHARVEST_LOG_FORMAT";

/// Initialise the global tracing subscriber. Logs go to stderr so that stdout
/// only carries rendered panel output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A subscriber may already be installed (tests, embedding hosts).
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
