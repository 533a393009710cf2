/// Default scratch budget per lane when neither the config nor the environment provide one.
pub const DEFAULT_SCRATCH_BUDGET_BYTES: usize = 192 * 1024;
/// Default system workspace reserved next to user workspace regions.
pub const DEFAULT_SYSTEM_WORKSPACE_BYTES: usize = 16 * 1024 * 1024;
/// Default transfer block between global memory and scratch.
pub const DEFAULT_BLOCK_BYTES: usize = 32;

/// Platform facts. Unset values are queried from the host once per process.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PlatformConfig {
    /// Number of lanes to expose. Defaults to the host's available parallelism.
    #[serde(default)]
    pub lane_count: Option<usize>,

    /// Scratch bytes owned by each lane.
    #[serde(default)]
    pub scratch_budget_bytes: Option<usize>,

    /// Granularity of global memory transfers.
    #[serde(default = "default_block_bytes")]
    pub block_bytes: usize,

    /// Size of the system workspace reserved for every launch needing a workspace.
    #[serde(default = "default_system_workspace_bytes")]
    pub system_workspace_bytes: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            lane_count: None,
            scratch_budget_bytes: None,
            block_bytes: default_block_bytes(),
            system_workspace_bytes: default_system_workspace_bytes(),
        }
    }
}

fn default_block_bytes() -> usize {
    DEFAULT_BLOCK_BYTES
}

fn default_system_workspace_bytes() -> usize {
    DEFAULT_SYSTEM_WORKSPACE_BYTES
}
