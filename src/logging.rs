//! Optional logging bootstrap for hosts that embed this crate as a binary
//! (or its own test/bench targets) rather than wiring `log` into an
//! existing subscriber themselves. As a library the crate never installs a
//! logger on its own; nothing here runs unless a caller opts in.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l} [{T}] {m}{n}";

/// Installs a console logger at `level`. Safe to call more than once; only
/// the first call takes effect (`log4rs::init_config` errors on a second
/// logger and that error is swallowed here).
pub fn init_default(level: LevelFilter) {
    let encoder = PatternEncoder::new(PATTERN);
    let appender = ConsoleAppender::builder().encoder(Box::new(encoder)).build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(appender)))
        .build(Root::builder().appender("console").build(level));

    if let Ok(config) = config {
        let _ = log4rs::init_config(config);
    }
}
