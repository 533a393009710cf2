use super::logger::{BinaryLogLevel, LoggerConfig};

/// Configuration for the planning phase.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PlanningConfig {
    /// Logger receiving every partition plan produced for a launch.
    #[serde(default)]
    pub logger: LoggerConfig<PlanningLogLevel>,
}

/// Planning logs are either off or describe every plan.
pub type PlanningLogLevel = BinaryLogLevel;
