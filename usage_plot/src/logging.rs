use std::io::Write as _;

use chrono::Local;
use env_logger::Target;
use log::LevelFilter;

/// Logs go to stdout next to the regular program output. `RUST_LOG` directives are applied on
/// top of `level`.
pub fn init_logger(level: LevelFilter) {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_env("RUST_LOG")
        .target(Target::Stdout)
        .init();
}
