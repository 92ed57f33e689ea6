//! Logging initialization utilities.

use env_logger::Env;

/// Initialize logging. `RUST_LOG` wins over the level picked here.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env = Env::default().default_filter_or(default_level);
    // A second init (tests, embedding) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
