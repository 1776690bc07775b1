//! In-order traversal of the leaf plane.

use super::plane::NodeId;
use super::MarkTree;
use crate::mark::{MarkInfo, MarkPosition};

/// Iterator over marks in document order, yielding absolute positions.
///
/// Walking from one mark to the next costs O(1) amortized; crossing into the
/// next leaf climbs only as far as the first ancestor with a right sibling.
pub struct MarkIter<'a> {
    tree: &'a MarkTree,
    leaf: Option<NodeId>,
    slot_index: usize,
    base: MarkPosition,
}

impl<'a> MarkIter<'a> {
    pub(super) fn new(tree: &'a MarkTree, leaf: NodeId, slot_index: usize, base: MarkPosition) -> Self {
        Self {
            tree,
            leaf: Some(leaf),
            slot_index,
            base,
        }
    }

    pub(super) fn exhausted(tree: &'a MarkTree) -> Self {
        Self {
            tree,
            leaf: None,
            slot_index: 0,
            base: MarkPosition::default(),
        }
    }
}

impl Iterator for MarkIter<'_> {
    type Item = MarkInfo;

    fn next(&mut self) -> Option<MarkInfo> {
        loop {
            let leaf = self.leaf?;
            let node = self.tree.planes[0].node(leaf);
            if let Some(entry) = node.entries.get(self.slot_index) {
                let info = self.tree.info(entry, self.base);
                self.base = MarkPosition::new(info.offset, info.line);
                self.slot_index += 1;
                return Some(info);
            }
            self.leaf = self.tree.next_leaf(leaf);
            self.slot_index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::mark::MarkKind;
    use crate::tree::MarkTree;

    #[test]
    fn test_iterates_across_leaves() {
        let mut tree = MarkTree::new(1_000, 9);
        for i in 0..100 {
            tree.insert_new(i * 10, i / 10, i % 2 == 1, MarkKind::Plain).unwrap();
        }
        let marks: Vec<_> = tree.iter().collect();
        assert_eq!(marks.len(), 100);
        for (i, mark) in marks.iter().enumerate() {
            assert_eq!((mark.offset, mark.line), (i * 10, i / 10));
            assert_eq!(mark.insert_after, i % 2 == 1);
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = MarkTree::default();
        assert_eq!(tree.iter().next(), None);
        assert_eq!(tree.range(0, 10).count(), 0);
    }
}
