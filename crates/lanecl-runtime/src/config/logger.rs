use super::GlobalConfig;
use super::{execution::ExecutionLogLevel, planning::PlanningLogLevel};
use core::fmt::Display;
use hashbrown::HashMap;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

/// Configuration for logging in lanecl, parameterized by a log level type.
///
/// Note that you can use multiple loggers at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging configuration (e.g., info, debug, trace).
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Binary log level for enabling or disabling logging.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryLogLevel {
    /// Logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// Logging is fully enabled.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for BinaryLogLevel {}

/// Subsystems writing to the [Logger].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subsystem {
    Planning,
    Execution,
}

/// Fans planning and execution messages out to the sinks configured for them.
///
/// Sinks shared by both subsystems, like the same file or standard output, are opened once.
#[derive(Debug)]
pub struct Logger {
    sinks: Vec<Sink>,
    planning: Vec<usize>,
    execution: Vec<usize>,
    pub config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a logger for the global configuration. File sinks are opened right away.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let mut logger = Self {
            sinks: Vec::new(),
            planning: Vec::new(),
            execution: Vec::new(),
            config: config.clone(),
        };
        let mut opened = HashMap::new();

        if config.planning.logger.level != PlanningLogLevel::Disabled {
            logger.route(Subsystem::Planning, &config.planning.logger, &mut opened);
        }
        if config.execution.logger.level != ExecutionLogLevel::Disabled {
            logger.route(Subsystem::Execution, &config.execution.logger, &mut opened);
        }

        logger
    }

    pub fn log_planning<S: Display>(&mut self, msg: &S) {
        self.write(Subsystem::Planning, msg);
    }

    pub fn log_execution<S: Display>(&mut self, msg: &S) {
        self.write(Subsystem::Execution, msg);
    }

    pub fn log_level_planning(&self) -> PlanningLogLevel {
        self.config.planning.logger.level
    }

    pub fn log_level_execution(&self) -> ExecutionLogLevel {
        self.config.execution.logger.level
    }

    #[cfg(test)]
    fn routes(&self, subsystem: Subsystem) -> &[usize] {
        match subsystem {
            Subsystem::Planning => &self.planning,
            Subsystem::Execution => &self.execution,
        }
    }

    fn write<S: Display>(&mut self, subsystem: Subsystem, msg: &S) {
        let routes = match subsystem {
            Subsystem::Planning => &self.planning,
            Subsystem::Execution => &self.execution,
        };
        // Formatted once when several sinks receive it.
        if let [single] = routes.as_slice() {
            self.sinks[*single].write(msg);
            return;
        }
        let msg = msg.to_string();
        for sink in routes {
            self.sinks[*sink].write(&msg);
        }
    }

    fn route<L: LogLevel>(
        &mut self,
        subsystem: Subsystem,
        config: &LoggerConfig<L>,
        opened: &mut HashMap<SinkId, usize>,
    ) {
        let mut wanted = Vec::new();
        if let Some(file) = &config.file {
            wanted.push(SinkId::File(file.clone()));
        }
        if config.stdout {
            wanted.push(SinkId::Stdout);
        }
        if config.stderr {
            wanted.push(SinkId::Stderr);
        }
        if let Some(level) = config.log {
            wanted.push(SinkId::LogCrate(level));
        }

        for id in wanted {
            let index = match opened.get(&id) {
                Some(index) => *index,
                None => {
                    let Some(sink) = Sink::open(&id, config.append) else {
                        continue;
                    };
                    self.sinks.push(sink);
                    opened.insert(id, self.sinks.len() - 1);
                    self.sinks.len() - 1
                }
            };
            match subsystem {
                Subsystem::Planning => self.planning.push(index),
                Subsystem::Execution => self.execution.push(index),
            }
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum SinkId {
    File(PathBuf),
    Stdout,
    Stderr,
    LogCrate(LogCrateLevel),
}

#[derive(Debug)]
enum Sink {
    File(BufWriter<File>),
    Stdout,
    Stderr,
    LogCrate(LogCrateLevel),
}

impl Sink {
    // A file that can't be opened disables its sink instead of failing the launch.
    fn open(id: &SinkId, append: bool) -> Option<Self> {
        Some(match id {
            SinkId::File(path) => {
                let file = OpenOptions::new()
                    .write(true)
                    .append(append)
                    .truncate(!append)
                    .create(true)
                    .open(path);
                match file {
                    Ok(file) => Sink::File(BufWriter::new(file)),
                    Err(err) => {
                        log::warn!("Can't open log file {}: {err}", path.display());
                        return None;
                    }
                }
            }
            SinkId::Stdout => Sink::Stdout,
            SinkId::Stderr => Sink::Stderr,
            SinkId::LogCrate(level) => Sink::LogCrate(*level),
        })
    }

    fn write<S: Display>(&mut self, msg: &S) {
        match self {
            Sink::File(writer) => {
                if let Err(err) = writeln!(writer, "{msg}").and_then(|_| writer.flush()) {
                    log::warn!("Can't write to log file: {err}");
                }
            }
            Sink::Stdout => println!("{msg}"),
            Sink::Stderr => eprintln!("{msg}"),
            Sink::LogCrate(LogCrateLevel::Info) => log::info!("{msg}"),
            Sink::LogCrate(LogCrateLevel::Debug) => log::debug!("{msg}"),
            Sink::LogCrate(LogCrateLevel::Trace) => log::trace!("{msg}"),
        }
    }
}
