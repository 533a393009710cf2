use super::logger::{LogLevel, LoggerConfig};

/// Deepest scratch ring the planner may ever choose.
pub const MAX_DOUBLE_BUFFER_DEPTH: usize = 8;

/// Configuration for the lane execution phase.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ExecutionConfig {
    /// Logger for lane and tile events.
    #[serde(default)]
    pub logger: LoggerConfig<ExecutionLogLevel>,

    /// Upper bound on the number of scratch slots a lane cycles through.
    ///
    /// Values above [MAX_DOUBLE_BUFFER_DEPTH] are clamped.
    #[serde(default = "default_depth")]
    pub max_double_buffer_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            max_double_buffer_depth: default_depth(),
        }
    }
}

impl ExecutionConfig {
    /// The configured depth, clamped to `1..=MAX_DOUBLE_BUFFER_DEPTH`.
    pub fn buffer_depth(&self) -> usize {
        self.max_double_buffer_depth.clamp(1, MAX_DOUBLE_BUFFER_DEPTH)
    }
}

fn default_depth() -> usize {
    2
}

/// Verbosity of the execution logger.
#[derive(
    Default, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ExecutionLogLevel {
    /// Execution logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// One line per launch and per lane.
    #[serde(rename = "basic")]
    Basic,

    /// Every tile stage is logged.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for ExecutionLogLevel {}
