//! Derived per-cell statistics, recomputed bottom-up.

use crate::node::{NodeKind, OctreeNode};

/// Cached terrain statistics of a cell.
///
/// Never authoritative: a fresh [`OctreeNode::aggregate`] pass overwrites it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellStats {
    pub contains_water: bool,
    pub tree_count: u32,
    pub average_height: f32,
    /// Resident chunks contributing to these stats.
    pub populated: u32,
}

/// Payloads that can report statistics for their leaf.
pub trait Summarize {
    /// Stats of this payload, `None` while nothing has been generated yet.
    fn summarize(&self) -> Option<CellStats>;
}

impl<T: Summarize> OctreeNode<T> {
    /// Recompute `stats` for this cell and all descendants.
    ///
    /// Average height is taken over populated children only.
    pub fn aggregate(&mut self) -> CellStats {
        self.stats = match &mut self.kind {
            NodeKind::Leaf(chunk) => chunk
                .as_ref()
                .and_then(Summarize::summarize)
                .map(|stats| CellStats {
                    populated: stats.populated.max(1),
                    ..stats
                })
                .unwrap_or_default(),
            NodeKind::Branch(children) => {
                let mut stats = CellStats::default();
                let mut height_sum = 0.0_f32;
                let mut contributing = 0_u32;
                for child in children.iter_mut() {
                    let child_stats = child.aggregate();
                    stats.contains_water |= child_stats.contains_water;
                    stats.tree_count += child_stats.tree_count;
                    stats.populated += child_stats.populated;
                    if child_stats.populated > 0 {
                        height_sum += child_stats.average_height;
                        contributing += 1;
                    }
                }
                if contributing > 0 {
                    stats.average_height = height_sum / contributing as f32;
                }
                stats
            }
        };
        self.stats
    }
}
