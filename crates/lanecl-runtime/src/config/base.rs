use super::{execution::ExecutionConfig, planning::PlanningConfig, platform::PlatformConfig};
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static LANECL_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Represents the global configuration for lanecl, combining platform, planning and execution
/// settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Platform facts overriding what the host reports.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Configuration for the planning phase.
    #[serde(default)]
    pub planning: PlanningConfig,

    /// Configuration for the lane execution phase.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `lanecl.toml` or `LaneCL.toml` in the
    /// current directory or its parents. If no file is found, a default configuration is used.
    ///
    /// # Notes
    ///
    /// Calling this function takes a global lock. Planners should resolve what they need once,
    /// for instance through [DeviceProperties::query](crate::DeviceProperties::query), and pass
    /// the result along explicitly.
    pub fn get() -> Arc<Self> {
        let mut state = LANECL_GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<()> {
        use std::io::Write;

        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref()).map_err(std::io::Error::other)?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;

        Ok(())
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`. Attempting
    /// to set the configuration after it has been initialized will cause a panic.
    pub fn set(config: Self) {
        let mut state = LANECL_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(mut self) -> Self {
        use super::{execution::ExecutionLogLevel, planning::PlanningLogLevel};

        if let Ok(val) = std::env::var("LANECL_DEBUG_LOG") {
            self.planning.logger.level = PlanningLogLevel::Full;
            self.execution.logger.level = ExecutionLogLevel::Full;

            match val.as_str() {
                "stdout" => {
                    self.planning.logger.stdout = true;
                    self.execution.logger.stdout = true;
                }
                "stderr" => {
                    self.planning.logger.stderr = true;
                    self.execution.logger.stderr = true;
                }
                "1" | "true" => {
                    let file_path = "/tmp/lanecl.log";
                    self.planning.logger.file = Some(file_path.into());
                    self.execution.logger.file = Some(file_path.into());
                }
                "0" | "false" => {
                    self.planning.logger.level = PlanningLogLevel::Disabled;
                    self.execution.logger.level = ExecutionLogLevel::Disabled;
                }
                file_path => {
                    self.planning.logger.file = Some(file_path.into());
                    self.execution.logger.file = Some(file_path.into());
                }
            }
        };

        if let Some(lanes) = env_number("LANECL_LANE_COUNT") {
            self.platform.lane_count = Some(lanes);
        }

        if let Some(bytes) = env_number("LANECL_SCRATCH_BYTES") {
            self.platform.scratch_budget_bytes = Some(bytes);
        }

        if let Some(depth) = env_number("LANECL_BUFFER_DEPTH") {
            self.execution.max_double_buffer_depth = depth;
        }

        self
    }

    // Loads configuration from `lanecl.toml` or `LaneCL.toml` in the current directory or its parents.
    //
    // Traverses up the directory tree until a valid configuration file is found or the root is reached.
    // Returns a default configuration if no file is found.
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            if let Ok(content) = Self::from_file_path(dir.join("lanecl.toml")) {
                return content;
            }

            if let Ok(content) = Self::from_file_path(dir.join("LaneCL.toml")) {
                return content;
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    // Loads configuration from a specified file path.
    fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match toml::from_str(&content) {
            Ok(val) => val,
            Err(err) => panic!("The file provided doesn't have the right format => {err:?}"),
        };

        Ok(config)
    }
}

fn env_number<N: core::str::FromStr>(key: &str) -> Option<N> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(number) => Some(number),
        Err(_) => {
            log::warn!("Ignoring {key}={value}, expected a number");
            None
        }
    }
}
