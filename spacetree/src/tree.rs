use tracing::trace;

use crate::SpaceTreeError;
use crate::bound::HRectBound;
use crate::dataset::Dataset;

/// Default maximum number of points in a leaf.
pub const DEFAULT_LEAF_SIZE: usize = 20;

/// Index of a node in a [`Tree`] arena.
///
/// Children are always allocated after their parent, so a child's id is
/// strictly greater than its parent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Node {
    begin: usize,
    count: usize,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    bound: HRectBound,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A binary kd-tree over a [`Dataset`].
///
/// The tree never reorders the dataset. It keeps a permutation of point
/// indices in which every node owns a contiguous range, so
/// [`Tree::points`] of an internal node lists all of its descendants.
///
/// Child and parent links are mutable through [`Tree::set_left`],
/// [`Tree::set_right`] and [`Tree::set_parent`]. Counts, bounds and point
/// ranges always describe the tree as built.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    indices: Vec<usize>,
    leaf_size: usize,
}

impl Tree {
    /// Builds a tree with midpoint splits along the widest axis.
    ///
    /// A node becomes a leaf when it holds at most `leaf_size` points or when
    /// its bounding box has zero width. A `leaf_size` of zero means
    /// [`DEFAULT_LEAF_SIZE`].
    pub fn build(dataset: &Dataset, leaf_size: usize) -> Result<Self, SpaceTreeError> {
        if dataset.is_empty() {
            return Err(SpaceTreeError::EmptyDataset);
        }
        let leaf_size = if leaf_size == 0 {
            DEFAULT_LEAF_SIZE
        } else {
            leaf_size
        };

        let n = dataset.len();
        let mut tree = Tree {
            nodes: Vec::with_capacity(2 * n.div_ceil(leaf_size)),
            indices: (0..n).collect(),
            leaf_size,
        };
        let root = tree.push_node(dataset, 0, n, None);

        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some((left, right)) = tree.split(dataset, id) {
                stack.push(right);
                stack.push(left);
            }
        }

        trace!(
            points = n,
            nodes = tree.nodes.len(),
            leaf_size,
            "spacetree: built tree"
        );
        Ok(tree)
    }

    fn push_node(
        &mut self,
        dataset: &Dataset,
        begin: usize,
        count: usize,
        parent: Option<NodeId>,
    ) -> NodeId {
        let mut bound = HRectBound::new(dataset.dim());
        for &i in &self.indices[begin..begin + count] {
            bound.grow(dataset.point(i));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            begin,
            count,
            parent,
            left: None,
            right: None,
            bound,
        });
        id
    }

    fn split(&mut self, dataset: &Dataset, id: NodeId) -> Option<(NodeId, NodeId)> {
        let node = &self.nodes[id.index()];
        if node.count <= self.leaf_size {
            return None;
        }
        let (axis, width) = node.bound.widest_axis()?;
        if width <= 0.0 {
            return None;
        }
        let split = node.bound.ranges()[axis].mid();
        let (begin, count) = (node.begin, node.count);

        // Hoare-style partition: values below the split go left.
        let range = &mut self.indices[begin..begin + count];
        let mut lo = 0;
        let mut hi = range.len();
        while lo < hi {
            if dataset.point(range[lo])[axis] < split {
                lo += 1;
            } else {
                hi -= 1;
                range.swap(lo, hi);
            }
        }
        if lo == 0 || lo == count {
            return None;
        }

        let left = self.push_node(dataset, begin, lo, Some(id));
        let right = self.push_node(dataset, begin + lo, count - lo, Some(id));
        let node = &mut self.nodes[id.index()];
        node.left = Some(left);
        node.right = Some(right);
        Some((left, right))
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in allocation order. Parents come before children.
    pub fn node_ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + use<> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].left
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].right
    }

    /// Both children, or `None` for a leaf.
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        let node = &self.nodes[id.index()];
        node.left.zip(node.right)
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_none()
    }

    /// Number of points under the node as built.
    pub fn count(&self, id: NodeId) -> usize {
        self.nodes[id.index()].count
    }

    /// Dataset indices of every point under the node.
    pub fn points(&self, id: NodeId) -> &[usize] {
        let node = &self.nodes[id.index()];
        &self.indices[node.begin..node.begin + node.count]
    }

    pub fn bound(&self, id: NodeId) -> &HRectBound {
        &self.nodes[id.index()].bound
    }

    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.nodes[id.index()].parent = parent;
    }

    pub fn set_left(&mut self, id: NodeId, left: Option<NodeId>) {
        self.nodes[id.index()].left = left;
    }

    pub fn set_right(&mut self, id: NodeId, right: Option<NodeId>) {
        self.nodes[id.index()].right = right;
    }

    /// Reports whether `id` equals `ancestor` or lies below it, following
    /// the current parent links.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            if n < ancestor {
                return false;
            }
            cur = self.parent(n);
        }
        false
    }
}
