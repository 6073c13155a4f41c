use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Convenience env_logger setup for embedding applications and tests.
/// Safe to call more than once; later calls are no-ops.
pub fn setup_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter(None, level);
    builder.target(Target::Stderr);

    builder.format(|buf, record| {
        writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
    });

    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    }

    let _ = builder.try_init();
}
