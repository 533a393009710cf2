/// Where a tile stands in its copy-in, compute, copy-out sequence.
///
/// A scratch slot starts and ends at [Done](TileStage::Done); acquiring it for a tile moves it to
/// [PendingCopyIn](TileStage::PendingCopyIn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileStage {
    /// The slot waits for its data to land in scratch.
    PendingCopyIn,
    /// Data is in scratch, compute may run.
    Computing,
    /// Results are in scratch, waiting to be written back.
    PendingCopyOut,
    /// The slot is free for another tile.
    Done,
}

impl TileStage {
    /// The stage following this one.
    pub fn next(self) -> TileStage {
        match self {
            TileStage::PendingCopyIn => TileStage::Computing,
            TileStage::Computing => TileStage::PendingCopyOut,
            TileStage::PendingCopyOut => TileStage::Done,
            TileStage::Done => TileStage::PendingCopyIn,
        }
    }

    /// Moves to `target`, which must be the next stage.
    ///
    /// # Panics
    /// On any other transition: a stage ran before the one it depends on.
    pub fn advance(&mut self, target: TileStage) {
        assert_eq!(
            self.next(),
            target,
            "Invalid tile stage transition from {self:?} to {target:?}"
        );
        *self = target;
    }
}
