//! Tree nodes and the subdivision rule.

use glam::{DVec3, IVec3};
use terra_math::Aabb;

use crate::aggregate::CellStats;
use crate::error::OctreeError;

/// Leaf-or-branch payload of a node.
///
/// A branch statically owns exactly eight children; a leaf owns at most
/// one payload.
#[derive(Debug, Clone)]
pub enum NodeKind<T> {
    Leaf(Option<T>),
    Branch(Box<[OctreeNode<T>; 8]>),
}

/// One axis-aligned cell of the spatial index.
#[derive(Debug, Clone)]
pub struct OctreeNode<T> {
    pub(crate) bounds: Aabb,
    pub(crate) kind: NodeKind<T>,
    pub(crate) stats: CellStats,
}

impl<T> OctreeNode<T> {
    /// Create an empty leaf covering `bounds`.
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            kind: NodeKind::Leaf(None),
            stats: CellStats::default(),
        }
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Minimum corner; for a leaf this is the chunk anchor.
    pub fn anchor(&self) -> IVec3 {
        self.bounds.min
    }

    pub fn kind(&self) -> &NodeKind<T> {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn children(&self) -> Option<&[OctreeNode<T>; 8]> {
        match &self.kind {
            NodeKind::Branch(children) => Some(children),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Payload of a leaf, `None` for empty leaves and branches.
    pub fn chunk(&self) -> Option<&T> {
        match &self.kind {
            NodeKind::Leaf(chunk) => chunk.as_ref(),
            NodeKind::Branch(_) => None,
        }
    }

    pub fn chunk_mut(&mut self) -> Option<&mut T> {
        match &mut self.kind {
            NodeKind::Leaf(chunk) => chunk.as_mut(),
            NodeKind::Branch(_) => None,
        }
    }

    /// Payload slot of a leaf. Branches have no slot.
    pub fn slot_mut(&mut self) -> Option<&mut Option<T>> {
        match &mut self.kind {
            NodeKind::Leaf(chunk) => Some(chunk),
            NodeKind::Branch(_) => None,
        }
    }

    /// Remove and return the payload of a leaf.
    pub fn take_chunk(&mut self) -> Option<T> {
        self.slot_mut().and_then(Option::take)
    }

    /// Cached aggregate; refreshed by [`OctreeNode::aggregate`](crate::Summarize).
    pub fn stats(&self) -> &CellStats {
        &self.stats
    }

    /// Split this cell recursively until every leaf fits within one chunk.
    ///
    /// Cubes split into octants. Cells wider than they are tall keep their
    /// full height and split on x/z only: a square column into a 2x4 grid of
    /// 2:1 columns, a 2:1 column into a 4x2 grid of squares. Leaves that
    /// already hold a payload and branches are left untouched.
    pub fn subdivide(&mut self, chunk_size: i32) -> Result<(), OctreeError> {
        if !matches!(self.kind, NodeKind::Leaf(None)) {
            return Ok(());
        }
        let Some(grid) = split_grid(&self.bounds, chunk_size)? else {
            return Ok(());
        };

        let child_size = self.bounds.size() / grid;
        let mut children = grid_children(self.bounds.min, child_size, grid);
        for child in children.iter_mut() {
            child.subdivide(chunk_size)?;
        }
        self.kind = NodeKind::Branch(children);
        Ok(())
    }

    /// Index of the child containing `p`. Only meaningful on branches and
    /// for points inside `self.bounds`.
    fn child_index(&self, children: &[OctreeNode<T>; 8], p: IVec3) -> usize {
        let child_size = children[0].bounds.size();
        let grid = self.bounds.size() / child_size;
        let cell = (p - self.bounds.min) / child_size;
        (cell.x + grid.x * (cell.y + grid.y * cell.z)) as usize
    }

    /// Descend to the unique leaf containing `p`.
    pub fn find_leaf(&self, p: IVec3) -> Option<&OctreeNode<T>> {
        if !self.bounds.contains_point(p) {
            return None;
        }
        let mut node = self;
        loop {
            match &node.kind {
                NodeKind::Leaf(_) => return Some(node),
                NodeKind::Branch(children) => node = &children[node.child_index(children, p)],
            }
        }
    }

    pub fn find_leaf_mut(&mut self, p: IVec3) -> Option<&mut OctreeNode<T>> {
        if !self.bounds.contains_point(p) {
            return None;
        }
        if self.is_leaf() {
            return Some(self);
        }
        let index = match &self.kind {
            NodeKind::Branch(children) => self.child_index(children, p),
            NodeKind::Leaf(_) => return None,
        };
        match &mut self.kind {
            NodeKind::Branch(children) => children[index].find_leaf_mut(p),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Collect leaves whose bounds lie strictly closer than
    /// `sqrt(max_distance_sq)` to `center` on the x/z plane, pruning whole
    /// subtrees by bounds distance.
    ///
    /// The bound is exclusive so a circle that only touches the root edge
    /// never needs a leaf from outside the root.
    pub(crate) fn collect_within<'a>(
        &'a self,
        center: DVec3,
        max_distance_sq: f64,
        out: &mut Vec<&'a OctreeNode<T>>,
    ) {
        if self.bounds.horizontal_distance_squared(center) >= max_distance_sq {
            return;
        }
        match &self.kind {
            NodeKind::Leaf(_) => out.push(self),
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.collect_within(center, max_distance_sq, out);
                }
            }
        }
    }

    /// Visit every node depth-first, parents before children.
    pub fn traverse(&self, f: &mut impl FnMut(&OctreeNode<T>)) {
        f(self);
        if let NodeKind::Branch(children) = &self.kind {
            for child in children.iter() {
                child.traverse(f);
            }
        }
    }

    pub fn for_each_leaf(&self, f: &mut impl FnMut(&OctreeNode<T>)) {
        match &self.kind {
            NodeKind::Leaf(_) => f(self),
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.for_each_leaf(f);
                }
            }
        }
    }

    pub fn for_each_leaf_mut(&mut self, f: &mut impl FnMut(&mut OctreeNode<T>)) {
        if self.is_leaf() {
            f(self);
            return;
        }
        if let NodeKind::Branch(children) = &mut self.kind {
            for child in children.iter_mut() {
                child.for_each_leaf_mut(f);
            }
        }
    }

    /// Check that every branch equals the union of its children and that
    /// no leaf is larger than one chunk.
    pub fn validate(&self, chunk_size: i32) -> Result<(), OctreeError> {
        match &self.kind {
            NodeKind::Leaf(_) => {
                if self.bounds.size().cmpgt(IVec3::splat(chunk_size)).any() {
                    return Err(OctreeError::OversizedLeaf {
                        bounds: self.bounds,
                    });
                }
                Ok(())
            }
            NodeKind::Branch(children) => {
                let union = children[1..]
                    .iter()
                    .fold(children[0].bounds, |acc, child| acc.union(&child.bounds));
                let volume: i64 = children.iter().map(|c| c.bounds.volume()).sum();
                if union != self.bounds || volume != self.bounds.volume() {
                    return Err(OctreeError::BoundsMismatch {
                        bounds: self.bounds,
                        union,
                    });
                }
                children.iter().try_for_each(|c| c.validate(chunk_size))
            }
        }
    }

    /// Copy of the node structure without payloads.
    pub fn skeleton(&self) -> OctreeNode<()> {
        let kind = match &self.kind {
            NodeKind::Leaf(_) => NodeKind::Leaf(None),
            NodeKind::Branch(children) => {
                NodeKind::Branch(Box::new(std::array::from_fn(|i| children[i].skeleton())))
            }
        };
        OctreeNode {
            bounds: self.bounds,
            kind,
            stats: self.stats,
        }
    }
}

/// Child grid for a cell, or `None` when the cell is already chunk-sized.
pub(crate) fn split_grid(bounds: &Aabb, chunk_size: i32) -> Result<Option<IVec3>, OctreeError> {
    let size = bounds.size();
    if size.cmple(IVec3::splat(chunk_size)).all() {
        return Ok(None);
    }
    let grid = if size.x == size.y && size.y == size.z {
        IVec3::new(2, 2, 2)
    } else if size.x > size.y && size.x == size.z {
        IVec3::new(2, 1, 4)
    } else if size.x > size.y && size.x == 2 * size.z {
        IVec3::new(4, 1, 2)
    } else {
        return Err(OctreeError::InvalidShape { bounds: *bounds });
    };
    if size % grid != IVec3::ZERO {
        return Err(OctreeError::InvalidShape { bounds: *bounds });
    }
    Ok(Some(grid))
}

/// Eight empty leaves laid out x-fastest, then y, then z.
pub(crate) fn grid_children<T>(
    min: IVec3,
    child_size: IVec3,
    grid: IVec3,
) -> Box<[OctreeNode<T>; 8]> {
    Box::new(std::array::from_fn(|i| {
        let i = i as i32;
        let cell = IVec3::new(i % grid.x, (i / grid.x) % grid.y, i / (grid.x * grid.y));
        OctreeNode::new(Aabb::from_min_size(min + cell * child_size, child_size))
    }))
}
