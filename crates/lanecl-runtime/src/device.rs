use std::sync::Arc;

use lanecl_common::{DType, Element};

use crate::{
    ConfigurationError, PartitionPlan, TilingBuffer, TilingData,
    config::{
        GlobalConfig, Logger,
        execution::ExecutionLogLevel,
        planning::PlanningLogLevel,
        platform::{DEFAULT_SCRATCH_BUDGET_BYTES, PlatformConfig},
    },
};

/// Platform facts every planner needs. Queried once and passed along explicitly.
#[derive(new, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceProperties {
    /// Number of lanes that can run at the same time.
    pub lane_count: usize,
    /// Scratch bytes owned by each lane.
    pub scratch_budget_bytes: usize,
    /// Granularity of global memory transfers.
    pub block_bytes: usize,
    /// Size of the system workspace reserved next to user workspace regions.
    pub system_workspace_bytes: usize,
}

impl DeviceProperties {
    /// Resolves the properties from the global configuration, falling back on the host's
    /// available parallelism for the lane count.
    pub fn query() -> Self {
        Self::from_config(&GlobalConfig::get().platform)
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        let lane_count = config.lane_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|lanes| lanes.get())
                .unwrap_or(1)
        });

        Self {
            lane_count,
            scratch_budget_bytes: config
                .scratch_budget_bytes
                .unwrap_or(DEFAULT_SCRATCH_BUDGET_BYTES),
            block_bytes: config.block_bytes,
            system_workspace_bytes: config.system_workspace_bytes,
        }
    }

    /// Number of elements of `dtype` moved by one transfer block.
    pub fn block_elements(&self, dtype: DType) -> usize {
        dtype.elements_per_block(self.block_bytes)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.lane_count == 0 {
            return Err(ConfigurationError::NoLanes);
        }
        if self.scratch_budget_bytes == 0 {
            return Err(ConfigurationError::NoScratch);
        }
        Ok(())
    }
}

/// The body every lane of a launch runs.
pub trait LaneKernel: Sync {
    fn run(&self, lane: &LaneContext<'_>);
}

/// What a lane knows about itself while running.
pub struct LaneContext<'a> {
    pub lane_id: usize,
    pub used_lanes: usize,
    tiling: &'a TilingBuffer,
    properties: &'a DeviceProperties,
    logger: &'a spin::Mutex<Logger>,
    log_level: ExecutionLogLevel,
}

impl<'a> LaneContext<'a> {
    pub fn tiling(&self) -> &TilingBuffer {
        self.tiling
    }

    pub fn properties(&self) -> &DeviceProperties {
        self.properties
    }

    /// Decodes the launch's tiling layout.
    ///
    /// # Panics
    /// A buffer that can't be decoded is fatal to the launch.
    pub fn decode<T: TilingData>(&self) -> (T, PartitionPlan) {
        let tiling = match self.tiling.decode::<T>() {
            Ok(tiling) => tiling,
            Err(err) => panic!("Lane {} can't decode its tiling: {err}", self.lane_id),
        };
        let plan = match tiling.plan() {
            Ok(plan) => plan,
            Err(err) => panic!("Lane {} received an invalid plan: {err}", self.lane_id),
        };
        (tiling, plan)
    }

    /// Scratch of this lane for the whole launch.
    pub fn scratch(&self) -> ScratchArena {
        ScratchArena::new(self.properties.scratch_budget_bytes, self.properties.block_bytes)
    }

    /// Whether messages at `level` reach the execution logger.
    pub fn logs(&self, level: ExecutionLogLevel) -> bool {
        level != ExecutionLogLevel::Disabled && self.log_level >= level
    }

    /// Logs the message built by `message` when the execution logger is at least at `level`.
    pub fn log<S: core::fmt::Display, F: FnOnce() -> S>(
        &self,
        level: ExecutionLogLevel,
        message: F,
    ) {
        if self.logs(level) {
            let message = message();
            self.logger
                .lock()
                .log_execution(&format_args!("[lane {}] {message}", self.lane_id));
        }
    }
}

/// The per-lane scratch allocator.
///
/// Buffers are carved once, when a lane starts, and live for the whole launch. Exceeding the
/// budget means the plan and the kernel disagree, which is a bug.
#[derive(Debug)]
pub struct ScratchArena {
    budget: usize,
    block_bytes: usize,
    used: usize,
}

impl ScratchArena {
    pub fn new(budget: usize, block_bytes: usize) -> Self {
        Self {
            budget,
            block_bytes: block_bytes.max(1),
            used: 0,
        }
    }

    /// Carves a zeroed buffer of `len` elements, rounded up to whole blocks.
    ///
    /// # Panics
    /// When the buffer exceeds what's left of the budget.
    pub fn alloc<E: Element>(&mut self, len: usize) -> Vec<E> {
        let bytes = (len * E::size()).next_multiple_of(self.block_bytes);
        assert!(
            self.used + bytes <= self.budget,
            "Scratch overflow: {} bytes used, {bytes} requested, budget is {}",
            self.used,
            self.budget
        );
        self.used += bytes;
        vec![E::default(); len]
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.budget - self.used
    }
}

/// A device made of lanes, each running on its own thread for the duration of a launch.
pub struct LaneDevice {
    properties: DeviceProperties,
    config: Arc<GlobalConfig>,
    logger: spin::Mutex<Logger>,
}

impl core::fmt::Debug for LaneDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LaneDevice")
            .field("properties", &self.properties)
            .finish()
    }
}

impl LaneDevice {
    /// Creates a device with explicit properties.
    pub fn new(properties: DeviceProperties) -> Result<Self, ConfigurationError> {
        Self::with_config(properties, GlobalConfig::get())
    }

    /// Creates a device from the global configuration.
    pub fn query() -> Result<Self, ConfigurationError> {
        let config = GlobalConfig::get();
        Self::with_config(DeviceProperties::from_config(&config.platform), config)
    }

    pub fn with_config(
        properties: DeviceProperties,
        config: Arc<GlobalConfig>,
    ) -> Result<Self, ConfigurationError> {
        properties.validate()?;
        Ok(Self {
            properties,
            logger: spin::Mutex::new(Logger::from_config(config.clone())),
            config,
        })
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Deepest scratch ring allowed by the execution config.
    pub fn max_buffer_depth(&self) -> usize {
        self.config.execution.buffer_depth()
    }

    /// Records a plan produced for `operator` on the planning logger.
    pub fn log_plan(&self, operator: &str, plan: &PartitionPlan) {
        let mut logger = self.logger.lock();
        if logger.log_level_planning() == PlanningLogLevel::Full {
            logger.log_planning(&format_args!("{operator}: {plan}"));
        }
    }

    /// Runs `kernel` on `used_lanes` lanes and waits for all of them.
    ///
    /// Lanes that synchronize through a [`LaneExchange`](crate::LaneExchange) must hold its
    /// [`guard`](crate::LaneExchange::guard) while running. Otherwise a lane panicking before an
    /// `all_reduce` leaves the others blocked and the launch never returns.
    ///
    /// # Panics
    /// If more lanes are requested than the device has, or if any lane panics.
    pub fn launch<K: LaneKernel>(&self, used_lanes: usize, tiling: &TilingBuffer, kernel: &K) {
        assert!(
            used_lanes <= self.properties.lane_count,
            "Launch of {used_lanes} lanes on a device of {} lanes",
            self.properties.lane_count
        );
        if used_lanes == 0 {
            return;
        }

        let log_level = self.logger.lock().log_level_execution();
        if log_level >= ExecutionLogLevel::Basic {
            self.logger.lock().log_execution(&format_args!(
                "Launching {used_lanes} lanes for operator {:#x} variant {}",
                tiling.key().operator,
                tiling.key().variant
            ));
        }

        std::thread::scope(|scope| {
            for lane_id in 0..used_lanes {
                let context = LaneContext {
                    lane_id,
                    used_lanes,
                    tiling,
                    properties: &self.properties,
                    logger: &self.logger,
                    log_level,
                };
                scope.spawn(move || {
                    log::trace!("Lane {lane_id} started");
                    kernel.run(&context);
                    log::trace!("Lane {lane_id} done");
                });
            }
        });
    }
}
