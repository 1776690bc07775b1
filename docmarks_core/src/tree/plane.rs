//! One level of the mark tree.
//!
//! A plane is an arena of nodes. Every node holds up to [`FANOUT`] entries;
//! at the leaf plane an entry stands for one mark, above it for one node of
//! the plane below. Entries store their offset and line distance to the
//! entry before them in document order, never an absolute position.

/// Maximum number of entries per node.
pub const FANOUT: usize = 16;

/// Nodes with fewer entries try to merge with a neighbour.
pub(super) const MIN_FILL: usize = FANOUT / 4;

/// Index of a node inside its plane.
pub(super) type NodeId = u32;

/// Relative bookkeeping for one mark (leaf plane) or one subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Entry {
    /// Offset distance from the previous mark to the last mark covered.
    pub rel_pos: usize,
    /// Line distance from the previous mark to the last mark covered.
    pub rel_line: usize,
    /// Number of marks covered.
    pub count: usize,
    /// Bias of the last mark covered.
    pub tail_after: bool,
    /// Mark slot at the leaf plane, child node id otherwise.
    pub target: u32,
}

impl Entry {
    pub fn leaf(slot: u32, rel_pos: usize, rel_line: usize, insert_after: bool) -> Self {
        Self {
            rel_pos,
            rel_line,
            count: 1,
            tail_after: insert_after,
            target: slot,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct Node {
    pub parent: Option<NodeId>,
    pub entries: Vec<Entry>,
}

impl Node {
    pub fn new(parent: Option<NodeId>, entries: Vec<Entry>) -> Self {
        Self { parent, entries }
    }

    /// Aggregates this node into the entry its parent keeps for it.
    pub fn summary(&self, id: NodeId) -> Entry {
        let mut summary = Entry {
            rel_pos: 0,
            rel_line: 0,
            count: 0,
            tail_after: false,
            target: id,
        };
        for entry in &self.entries {
            summary.rel_pos += entry.rel_pos;
            summary.rel_line += entry.rel_line;
            summary.count += entry.count;
            summary.tail_after = entry.tail_after;
        }
        summary
    }

    /// Position of the entry pointing at `target`.
    pub fn index_of(&self, target: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.target == target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct Plane {
    nodes: Vec<Node>,
    /// `in_use[id]` is false while `id` sits on the free list.
    in_use: Vec<bool>,
    free: Vec<NodeId>,
}

impl Plane {
    pub fn with_root() -> (Self, NodeId) {
        let mut plane = Self::default();
        let root = plane.alloc(Node::default());
        (plane, root)
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id as usize] = node;
                self.in_use[id as usize] = true;
                id
            }
            None => {
                self.nodes.push(node);
                self.in_use.push(true);
                (self.nodes.len() - 1) as NodeId
            }
        }
    }

    pub fn release(&mut self, id: NodeId) {
        let node = &mut self.nodes[id as usize];
        node.entries.clear();
        node.parent = None;
        self.in_use[id as usize] = false;
        self.free.push(id);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    /// Ids of nodes currently in use.
    pub fn live(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as NodeId).filter(move |id| self.in_use[*id as usize])
    }
}
