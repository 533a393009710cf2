use hashbrown::HashMap;
use lanecl_common::{DType, Element};

use crate::{ConfigurationError, GlobalTensor};

/// Alignment of every user workspace region, in bytes.
pub const WORKSPACE_ALIGNMENT: usize = 512;

/// A named region of the user workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRegion {
    pub name: &'static str,
    pub dtype: DType,
    /// Number of elements.
    pub len: usize,
    /// Offset in bytes from the start of the workspace, after the system workspace.
    pub offset: usize,
    pub bytes: usize,
}

/// Reserves the workspace of a launch: a fixed system area followed by aligned user regions.
///
/// The allocator only does bookkeeping. Memory is materialized from the resulting
/// [layout](WorkspaceLayout).
#[derive(Debug)]
pub struct WorkspaceAllocator {
    system_bytes: usize,
    cursor: usize,
    regions: Vec<WorkspaceRegion>,
}

impl WorkspaceAllocator {
    pub fn new(system_bytes: usize) -> Self {
        Self {
            system_bytes,
            cursor: system_bytes.next_multiple_of(WORKSPACE_ALIGNMENT),
            regions: Vec::new(),
        }
    }

    /// Reserves a region of `len` elements of `E`.
    pub fn reserve<E: Element>(
        &mut self,
        name: &'static str,
        len: usize,
    ) -> Result<&WorkspaceRegion, ConfigurationError> {
        if self.regions.iter().any(|region| region.name == name) {
            return Err(ConfigurationError::InvalidAttribute {
                name: "workspace",
                reason: format!("region `{name}` is reserved twice"),
            });
        }

        let bytes = len * E::size();
        let region = WorkspaceRegion {
            name,
            dtype: E::DTYPE,
            len,
            offset: self.cursor,
            bytes,
        };
        self.cursor = (self.cursor + bytes).next_multiple_of(WORKSPACE_ALIGNMENT);
        self.regions.push(region);

        Ok(&self.regions[self.regions.len() - 1])
    }

    pub fn finish(self) -> WorkspaceLayout {
        WorkspaceLayout {
            system_bytes: self.system_bytes,
            total_bytes: self.cursor,
            regions: self
                .regions
                .into_iter()
                .map(|region| (region.name, region))
                .collect(),
        }
    }
}

/// The reserved workspace of a launch.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    system_bytes: usize,
    total_bytes: usize,
    regions: HashMap<&'static str, WorkspaceRegion>,
}

impl WorkspaceLayout {
    pub fn system_bytes(&self) -> usize {
        self.system_bytes
    }

    /// Size of the whole workspace, system area included.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn user_bytes(&self) -> usize {
        self.total_bytes - self.system_bytes.next_multiple_of(WORKSPACE_ALIGNMENT)
    }

    pub fn region(&self, name: &str) -> Option<&WorkspaceRegion> {
        self.regions.get(name)
    }

    /// Allocates the global memory backing the region `name`.
    ///
    /// Returns `None` when the region doesn't exist or holds another data type.
    pub fn materialize<E: Element>(&self, name: &str) -> Option<GlobalTensor<E>> {
        let region = self.region(name)?;
        if region.dtype != E::DTYPE {
            return None;
        }
        Some(GlobalTensor::zeros([region.len]))
    }
}
