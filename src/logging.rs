use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes structured logging on stderr (stdout is left for reports).
///
/// `RUST_LOG` wins when set; otherwise this crate logs at info.
pub fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lobby_panel=info,warn"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let json_layer = fmt::layer().json().with_writer(std::io::stderr);
        let _ = registry.with(json_layer).try_init();
    } else {
        let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
        let _ = registry.with(console_layer).try_init();
    }
}
