use bytemuck::{Pod, Zeroable};
use lanecl_common::DType;
use lanecl_runtime::{
    BufferRole, ConfigurationError, DeviceProperties, GlobalTensor, LaneContext, LaneDevice,
    LaneKernel, PartitionPlanRaw, TileDescriptor, TilingBuffer, TilingData, WorkPartitioner,
    WorkRequest,
    pipeline::{SlotRing, TileExecutor, TileKernel, copy_in, copy_out},
};

/// Tiling of the row scaling operator: `output[r, c] = scale * input[r, c] + r`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ScaleRowsTiling {
    pub plan: PartitionPlanRaw,
    pub row_len: u64,
    pub scale: f32,
    pub _padding: u32,
}

impl TilingData for ScaleRowsTiling {
    const OPERATOR: u32 = 0xD0;

    fn raw_plan(&self) -> &PartitionPlanRaw {
        &self.plan
    }
}

pub struct ScaleRows<'a> {
    pub input: &'a GlobalTensor<f32>,
    pub output: &'a GlobalTensor<f32>,
}

struct ScaleRowsLane<'a> {
    input: &'a GlobalTensor<f32>,
    output: &'a GlobalTensor<f32>,
    row_len: usize,
    scale: f32,
    block: usize,
}

impl TileKernel for ScaleRowsLane<'_> {
    type Slot = Vec<f32>;

    fn copy_in(&mut self, tile: &TileDescriptor, slot: &mut Vec<f32>) {
        let columns = tile.columns(self.row_len);
        let offset = tile.offset * self.row_len + columns.start;
        let len = tile.count * columns.len();
        copy_in::<f32, false>(self.input, offset, len, slot, self.block);
    }

    fn compute(&mut self, tile: &TileDescriptor, slot: &mut Vec<f32>) {
        let width = tile.columns(self.row_len).len();
        for (local, row) in tile.tasks().enumerate() {
            for value in &mut slot[local * width..(local + 1) * width] {
                *value = *value * self.scale + row as f32;
            }
        }
    }

    fn copy_out(&mut self, tile: &TileDescriptor, slot: &mut Vec<f32>) {
        let columns = tile.columns(self.row_len);
        let offset = tile.offset * self.row_len + columns.start;
        copy_out::<f32, false>(slot, self.output, offset, tile.count * columns.len(), self.block);
    }
}

impl LaneKernel for ScaleRows<'_> {
    fn run(&self, lane: &LaneContext<'_>) {
        let (tiling, plan) = lane.decode::<ScaleRowsTiling>();
        let assignment = plan.lane(lane.lane_id);
        let row_len = tiling.row_len as usize;
        let width = match plan.axis {
            lanecl_runtime::TileAxis::Tasks => plan.tile_size * row_len,
            lanecl_runtime::TileAxis::Tail { .. } => plan.tile_size,
        };

        let mut scratch = lane.scratch();
        let mut ring = SlotRing::from_fn(plan.double_buffer_depth, |_| scratch.alloc::<f32>(width));
        let mut kernel = ScaleRowsLane {
            input: self.input,
            output: self.output,
            row_len,
            scale: tiling.scale,
            block: lane.properties().block_elements(DType::F32),
        };

        TileExecutor::new(&assignment)
            .traced(lane)
            .run(&mut kernel, &mut ring);
    }
}

/// Plans and runs the row scaling operator.
pub fn scale_rows(
    device: &LaneDevice,
    input: &GlobalTensor<f32>,
    output: &GlobalTensor<f32>,
    scale: f32,
) -> Result<(), ConfigurationError> {
    let dims = input.shape().dims();
    let (rows, row_len) = (dims[0], dims[1]);
    let request = WorkRequest::new(rows)
        .with_role(BufferRole::per_tail_element("rows", DType::F32, 1))
        .with_tail(row_len, true)
        .with_max_depth(device.max_buffer_depth());
    let plan = WorkPartitioner::new(device.properties()).plan(&request)?;
    device.log_plan("scale_rows", &plan);

    let tiling = ScaleRowsTiling {
        plan: PartitionPlanRaw::from(&plan),
        row_len: row_len as u64,
        scale,
        _padding: 0,
    };
    let buffer = TilingBuffer::encode(&tiling, 0);
    device.launch(plan.used_lanes, &buffer, &ScaleRows { input, output });

    Ok(())
}

pub fn device(lane_count: usize, scratch_budget_bytes: usize) -> LaneDevice {
    LaneDevice::new(DeviceProperties::new(lane_count, scratch_budget_bytes, 32, 1 << 20)).unwrap()
}
