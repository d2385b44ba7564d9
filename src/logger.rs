use slog::Drain;
use slog_atomic::{AtomicSwitch, AtomicSwitchCtrl};
use slog_term::{CompactFormat, TermDecorator};
use std::io;
use std::sync::Mutex;
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use slog::*;

pub const DEFAULT_LOG_LEVEL: u8 = 3;

type TermDrain = Fuse<Mutex<Fuse<LevelFilter<CompactFormat<TermDecorator>>>>>;

/// Terminal logger behind the `log` facade, the level can be switched
/// at runtime from the console
pub struct Logger {
    log_level: Mutex<u8>,
    logger: slog::Logger,
    ctrl: AtomicSwitchCtrl,
}

/// Local time with millisecond precision
fn timestamp(w: &mut dyn io::Write) -> io::Result<()> {
    let mut now = OffsetDateTime::now_utc();
    let tz_offset_sec = chrono::Local::now().offset().local_minus_utc();
    if let Ok(offset) = UtcOffset::from_whole_seconds(tz_offset_sec) {
        now = now.to_offset(offset);
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    match now.format(format) {
        Ok(formatted) => write!(w, "{}", formatted),
        Err(_) => write!(w, "{}", now),
    }
}

fn level(log_level: u8) -> Level {
    match log_level {
        0 => Level::Critical,
        1 => Level::Error,
        2 => Level::Warning,
        3 => Level::Info,
        4 => Level::Debug,
        5 => Level::Trace,
        _ => Level::Debug,
    }
}

fn new_drain(log_level: u8) -> TermDrain {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator)
        .use_custom_timestamp(timestamp)
        .build()
        .filter_level(level(log_level))
        .fuse();
    Mutex::new(drain).fuse()
}

impl Logger {
    pub fn new(log_level: u8) -> Self {
        let drain = AtomicSwitch::new(new_drain(log_level));
        let ctrl = drain.ctrl();
        let logger = slog::Logger::root(drain, slog::o!("version" => env!("CARGO_PKG_VERSION")));
        Logger {
            log_level: Mutex::new(log_level),
            logger,
            ctrl,
        }
    }

    /// Route the `log` macros used across the crate into this logger
    pub fn set_global(&self) -> &Self {
        let guard = slog_scope::set_global_logger(self.logger.clone());
        // https://github.com/slog-rs/slog/issues/249
        guard.cancel_reset();
        if let Err(e) = slog_stdlog::init() {
            eprintln!("log init failed: {}", e);
        }
        self
    }

    pub fn set_log_level(&self, log_level: u8) -> &Self {
        self.ctrl.set(new_drain(log_level));
        if let Ok(mut ll) = self.log_level.lock() {
            *ll = log_level;
        }
        self
    }

    pub fn log_level(&self) -> u8 {
        self.log_level.lock().map(|ll| *ll).unwrap_or(DEFAULT_LOG_LEVEL)
    }
}
