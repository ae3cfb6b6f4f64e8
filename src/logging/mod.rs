//! Logging setup driven by the `log` section of the configuration.
//!
//! [`configure_logger`] installs one process-wide `tracing` subscriber the
//! first time it runs. The level filter and the output sink are both
//! swappable, so every later call (one per command invocation) re-applies
//! the level and output without reinstalling anything.
//!
//! Output goes to stdout unless `log.file` is set, in which case a
//! [`RotatingFile`] takes over. Human-readable lines are used when the
//! first sink is a terminal; everything else gets one JSON object per line.
//! `RUST_LOG` directives, when present, refine the configured level.

mod rotate;

pub use rotate::RotatingFile;

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::error::ClapwireError;

/// The level used when nothing valid is configured.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

/// Logging options, read from the `log` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LogConfig {
    /// `trace`, `debug`, `info`, `warn`, `error`, `fatal`, `panic`, `off`.
    pub level: String,
    /// Log file path; `~` expands to the home directory. Empty for stdout.
    pub file: String,
    /// Megabytes before the file rotates.
    pub max_size: u64,
    /// Days to keep rotated files. Zero keeps them forever.
    pub max_age: u64,
    /// Rotated files to keep. Zero keeps all of them.
    pub max_backups: usize,
    /// Timestamp rotated files in local time rather than UTC.
    pub use_local_time: bool,
    /// Gzip rotated files.
    pub compress: bool,
    /// Reserved.
    pub mode: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: String::new(),
            file: String::new(),
            max_size: 100,
            max_age: 0,
            max_backups: 0,
            use_local_time: false,
            compress: false,
            mode: String::new(),
        }
    }
}

impl LogConfig {
    /// Replace an empty or unparsable `level` with `level`.
    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        if parse_level(&self.level).is_none() {
            self.level = level.into();
        }
        self
    }

    /// The rotating writer this config asks for, if `file` is set.
    pub fn rotating_file(&self) -> Option<RotatingFile> {
        if self.file.trim().is_empty() {
            return None;
        }
        Some(
            RotatingFile::new(expand_home(self.file.trim()))
                .max_size_mb(self.max_size)
                .max_age_days(self.max_age)
                .max_backups(self.max_backups)
                .local_time(self.use_local_time)
                .compress(self.compress),
        )
    }
}

/// Parse a level name, ignoring case. `fatal` and `panic` map to `error`;
/// `off` and `disabled` turn logging off.
pub fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" | "fatal" | "panic" => Some(LevelFilter::ERROR),
        "off" | "disabled" | "none" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// `s` as a level, or `default` when `s` is empty or not a level. An
/// unrecognized name is reported as a warning, never an error.
pub fn resolve_level(s: &str, default: LevelFilter) -> LevelFilter {
    if s.trim().is_empty() {
        return default;
    }
    parse_level(s).unwrap_or_else(|| {
        tracing::warn!(level = s, fallback = %default, "Unknown log level, using fallback");
        default
    })
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match directories::UserDirs::new() {
        Some(dirs) if rest.is_empty() => dirs.home_dir().to_path_buf(),
        Some(dirs) => dirs.home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

type BoxedWriter = Box<dyn Write + Send>;

/// A writer the fmt layers share; the target behind it can be replaced.
#[derive(Clone)]
struct SharedSink(Arc<Mutex<BoxedWriter>>);

impl SharedSink {
    fn new(writer: BoxedWriter) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    fn lock(&self) -> MutexGuard<'_, BoxedWriter> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, writer: BoxedWriter) {
        let mut current = self.lock();
        let _ = current.flush();
        *current = writer;
    }
}

struct SinkGuard<'a>(MutexGuard<'a, BoxedWriter>);

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedSink {
    type Writer = SinkGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkGuard(self.lock())
    }
}

struct Logger {
    filter: reload::Handle<EnvFilter, Registry>,
    sink: SharedSink,
    level: Mutex<LevelFilter>,
}

/// `None` when another global subscriber was already installed.
static LOGGER: OnceLock<Option<Logger>> = OnceLock::new();

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn install(level: LevelFilter, writer: BoxedWriter, terminal: bool) -> Option<Logger> {
    let (filter, handle) = reload::Layer::new(env_filter(level));
    let sink = SharedSink::new(writer);

    let text = terminal.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(sink.clone())
            .with_target(false)
    });
    let json = (!terminal).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(sink.clone())
            .with_current_span(false)
            .with_span_list(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .ok()?;

    Some(Logger {
        filter: handle,
        sink,
        level: Mutex::new(level),
    })
}

/// Apply `config` to the global subscriber, installing it on first use.
///
/// The level comes from `config.level`, falling back to `default`. A log
/// file that cannot be opened is an error and leaves the current output in
/// place. Returns the level now in effect.
pub fn configure_logger(config: &LogConfig, default: LevelFilter) -> Result<LevelFilter, ClapwireError> {
    let level = resolve_level(&config.level, default);

    let (writer, terminal): (BoxedWriter, bool) = match config.rotating_file() {
        Some(file) => {
            let path = file.path().to_path_buf();
            let file = file
                .open()
                .map_err(|source| ClapwireError::LogFile { path, source })?;
            (Box::new(file), false)
        }
        None => (Box::new(io::stdout()), io::stdout().is_terminal()),
    };

    let mut writer = Some(writer);
    let logger = LOGGER.get_or_init(|| {
        let first = writer.take()?;
        install(level, first, terminal)
    });

    let Some(logger) = logger else {
        return Ok(level);
    };
    if let Some(writer) = writer {
        logger.sink.replace(writer);
        if let Err(e) = logger.filter.reload(env_filter(level)) {
            tracing::warn!(error = %e, "Failed to apply log level");
        }
    }
    *logger.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
    tracing::debug!(level = %level, file = config.file.as_str(), "Logging configured");
    Ok(level)
}

/// The level most recently applied by [`configure_logger`], or `tracing`'s
/// global maximum if it never ran.
pub fn global_level() -> LevelFilter {
    match LOGGER.get() {
        Some(Some(logger)) => *logger.level.lock().unwrap_or_else(PoisonError::into_inner),
        _ => LevelFilter::current(),
    }
}
