use std::io::Write;

use env_logger::{fmt::Color, Builder, Env};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{Level, LevelFilter};
use once_cell::sync::OnceCell;

static INSTANCE: OnceCell<Logger> = OnceCell::new();

/// Process-wide logger: an `env_logger` with timestamps and level
/// colours, bridged through a shared [`MultiProgress`] so progress bars
/// and log lines interleave without clobbering each other.
///
/// The `CAIRN_LOG` environment variable overrides the verbosity set from
/// the command line.
#[derive(Debug)]
pub struct Logger {
    multi_pg: MultiProgress,
}

impl Logger {
    /// Build and install the global logger. Call once, before any log
    /// macro fires.
    pub fn init(verbosity: u8) {
        let log_level = Self::verbosity_to_level(verbosity);
        let env = Env::default().filter("CAIRN_LOG");

        let logger = Builder::new()
            .filter_level(log_level)
            .format(|buf, record| {
                // Errors additionally carry their call site.
                let traceback = match record.level() {
                    Level::Error => format!(
                        "(@ {}:{}) ",
                        record.file().unwrap_or("unknown"),
                        record.line().unwrap_or(0)
                    ),
                    _ => String::new(),
                };

                let mut level_style = buf.style();
                let color = match record.level() {
                    Level::Error => Color::Red,
                    Level::Warn  => Color::Yellow,
                    Level::Info  => Color::Green,
                    Level::Debug => Color::Blue,
                    Level::Trace => Color::Cyan,
                };
                level_style.set_color(color).set_bold(true);

                writeln!(
                    buf,
                    "[{} {: <5} {}] {traceback}{}",
                    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                    level_style.value(record.level()),
                    record.target(),
                    record.args()
                )
            })
            .parse_env(env)
            .build();

        let multi_pg = MultiProgress::new();
        LogWrapper::new(multi_pg.clone(), logger)
            .try_init()
            .expect("Failed to wrap logger with multiprogress");
        INSTANCE.set(Self { multi_pg }).expect("Logger was initialized twice");
    }

    fn verbosity_to_level(verbosity: u8) -> LevelFilter {
        match verbosity {
            0           => LevelFilter::Warn,
            1           => LevelFilter::Info,
            2           => LevelFilter::Debug,
            3..=u8::MAX => LevelFilter::Trace,
        }
    }

    /// Silence everything below the error level (`--quiet`).
    pub fn silence_warnings() {
        log::set_max_level(LevelFilter::Error);
    }

    /// Shared progress-bar handle; bars attached here render above the
    /// log stream.
    pub fn multi() -> &'static MultiProgress {
        &INSTANCE.get().expect("Uninitialized logger").multi_pg
    }
}
