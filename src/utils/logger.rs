use env_logger;
use log;

/// Info by default; `RUST_LOG=debug` shows every command and path touched.
pub fn setup_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}
