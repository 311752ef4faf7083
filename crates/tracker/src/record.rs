use crate::position::{Dimension, Position};

/// Ledger entry for one tracked node. A record exists exactly while the
/// node's position differs from its original one; `original` is absent for
/// nodes that entered the tree after tracking started, `mutated` is absent
/// while the node is detached.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct MovedNode {
    pub original: Option<Position>,
    pub mutated: Option<Position>,
}

impl MovedNode {
    pub fn position(&self, dim: Dimension) -> Option<Position> {
        match dim {
            Dimension::Original => self.original,
            Dimension::Mutated => self.mutated,
        }
    }

    pub fn position_mut(&mut self, dim: Dimension) -> &mut Option<Position> {
        match dim {
            Dimension::Original => &mut self.original,
            Dimension::Mutated => &mut self.mutated,
        }
    }
}
