//! Process-wide logger installation.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install `env_logger` once per process.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. If the host already
/// installed a logger the call is a no-op.
pub fn init(default_filter: Option<&str>) {
    let filter = default_filter.unwrap_or("info").to_string();
    INIT.call_once(move || {
        let env = env_logger::Env::default().default_filter_or(filter);
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("logger already installed by host");
        }
    });
}
