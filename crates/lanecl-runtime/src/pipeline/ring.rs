use super::TileStage;
use crate::config::execution::MAX_DOUBLE_BUFFER_DEPTH;

struct RingSlot<T> {
    data: T,
    stage: TileStage,
    tile: Option<usize>,
}

/// A ring of scratch slots cycled by consecutive tiles.
///
/// Tile `i` uses slot `i % depth`. A slot can only be handed to a new tile once the tile it held
/// was written back, so with two slots tile `i + 2` waits for tile `i`.
pub struct SlotRing<T> {
    slots: Vec<RingSlot<T>>,
}

impl<T> SlotRing<T> {
    /// Creates a ring from pre-allocated slot buffers.
    ///
    /// # Panics
    /// If there are no slots or more than the deepest supported ring.
    pub fn new(slots: Vec<T>) -> Self {
        assert!(
            (1..=MAX_DOUBLE_BUFFER_DEPTH).contains(&slots.len()),
            "A ring holds between 1 and {MAX_DOUBLE_BUFFER_DEPTH} slots, got {}",
            slots.len()
        );

        Self {
            slots: slots
                .into_iter()
                .map(|data| RingSlot {
                    data,
                    stage: TileStage::Done,
                    tile: None,
                })
                .collect(),
        }
    }

    /// Creates `depth` slots with `init`.
    pub fn from_fn<F: FnMut(usize) -> T>(depth: usize, init: F) -> Self {
        Self::new((0..depth).map(init).collect())
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Slot index used by `tile`.
    pub fn slot_of(&self, tile: usize) -> usize {
        tile % self.slots.len()
    }

    /// Hands the slot of `tile` over, moving it to [TileStage::PendingCopyIn].
    ///
    /// # Panics
    /// If the slot still holds an earlier tile.
    pub fn acquire(&mut self, tile: usize) -> &mut T {
        let index = self.slot_of(tile);
        let slot = &mut self.slots[index];
        assert_eq!(
            slot.stage,
            TileStage::Done,
            "Slot {index} is still held by tile {:?} when tile {tile} needs it",
            slot.tile
        );
        slot.stage.advance(TileStage::PendingCopyIn);
        slot.tile = Some(tile);
        &mut slot.data
    }

    /// Moves the slot holding `tile` to `stage` and returns its data.
    ///
    /// # Panics
    /// If the slot holds another tile or the transition skips a stage.
    pub fn advance(&mut self, tile: usize, stage: TileStage) -> &mut T {
        let index = self.slot_of(tile);
        let slot = &mut self.slots[index];
        assert_eq!(
            slot.tile,
            Some(tile),
            "Slot {index} doesn't hold tile {tile}"
        );
        slot.stage.advance(stage);
        &mut slot.data
    }

    /// Stage of the slot used by `tile`.
    pub fn stage(&self, tile: usize) -> TileStage {
        self.slots[self.slot_of(tile)].stage
    }

    /// Whether every slot is back to [TileStage::Done].
    pub fn is_drained(&self) -> bool {
        self.slots.iter().all(|slot| slot.stage == TileStage::Done)
    }

    /// Gives the slot buffers back.
    pub fn into_inner(self) -> Vec<T> {
        self.slots.into_iter().map(|slot| slot.data).collect()
    }
}
