// Logging setup
//
// env_logger behind the log facade. RUST_LOG always wins over the configured
// level. Safe to call more than once (tests do).

use crate::config::Config;
use env_logger::Builder;
use log::LevelFilter;

pub fn init_logging(config: &Config) {
    init_logging_with_level(config.log_level());
}

pub fn init_logging_with_level(level: LevelFilter) {
    let mut builder = Builder::new();
    builder.filter_level(level);
    // Environment applied last so RUST_LOG overrides the configured level
    builder.parse_default_env();
    builder.format_timestamp_millis();

    if builder.try_init().is_err() {
        log::trace!("Logger already initialised");
    }
}
