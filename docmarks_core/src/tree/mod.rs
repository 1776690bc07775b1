//! Multi-level mark tree.
//!
//! Marks are kept in document order in a B-tree of fixed fan-out
//! ([`FANOUT`]). Each level is a [`plane`] of arena-allocated nodes, so
//! parents and children refer to each other by index rather than pointer.
//! Every entry records only its distance (in characters and in lines) to the
//! mark before it. An edit therefore touches one leaf entry plus its
//! ancestors instead of every mark behind the edit point.
//!
//! Ordering at equal offsets: marks with `insert_after = true` sort before
//! marks with `insert_after = false`; within one bias insertion order is kept.

mod iter;
mod plane;

pub use iter::MarkIter;
pub use plane::FANOUT;

use crate::error::{Error, Result};
use crate::mark::{MarkId, MarkInfo, MarkKind, MarkPosition, NearestMark, TreeId};
use plane::{Entry, Node, NodeId, Plane, MIN_FILL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Created but not placed in the tree yet.
    Detached,
    /// Tracked; the value is the leaf node holding the mark.
    Linked(NodeId),
    /// Removed; the slot waits for reuse under a new generation.
    Free,
}

#[derive(Debug, Clone)]
struct MarkSlot {
    generation: u32,
    state: SlotState,
    insert_after: bool,
    kind: MarkKind,
}

/// Where a descent through the planes stopped.
#[derive(Debug, Clone, Copy)]
struct Seek {
    /// Global index of the first mark that was not skipped.
    index: usize,
    /// Leaf holding that mark (or the rightmost leaf if every mark was skipped).
    leaf: NodeId,
    /// Position of the mark inside `leaf`; may equal the leaf length.
    slot_index: usize,
    /// Position of the mark before `index`, or the document start.
    base: MarkPosition,
}

/// Ordered set of marks with relative offset/line bookkeeping.
#[derive(Debug)]
pub struct MarkTree {
    id: TreeId,
    /// `planes[0]` holds marks; the last plane holds only the root.
    planes: Vec<Plane>,
    root: NodeId,
    slots: Vec<MarkSlot>,
    free_slots: Vec<u32>,
    /// Document length and index of its last line.
    extent: MarkPosition,
}

impl Default for MarkTree {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl MarkTree {
    /// Creates an empty tree for a document of `len` characters whose last
    /// line has index `last_line`.
    pub fn new(len: usize, last_line: usize) -> Self {
        let (plane, root) = Plane::with_root();
        Self {
            id: TreeId::next(),
            planes: vec![plane],
            root,
            slots: Vec::new(),
            free_slots: Vec::new(),
            extent: MarkPosition::new(len, last_line),
        }
    }

    /// Identity stamped into every handle this tree issues.
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Number of tracked marks.
    pub fn len(&self) -> usize {
        self.root_node().summary(self.root).count
    }

    /// Returns true if no mark is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of planes, leaf plane included.
    pub fn depth(&self) -> usize {
        self.planes.len()
    }

    /// Document length and last line index as known to the tree.
    pub fn extent(&self) -> MarkPosition {
        self.extent
    }

    // ==================== Handles ====================

    /// Allocates a detached handle; place it with [`insert`](Self::insert).
    pub fn create(&mut self, insert_after: bool, kind: MarkKind) -> MarkId {
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.state = SlotState::Detached;
                entry.insert_after = insert_after;
                entry.kind = kind;
                slot
            }
            None => {
                self.slots.push(MarkSlot {
                    generation: 0,
                    state: SlotState::Detached,
                    insert_after,
                    kind,
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.handle(slot)
    }

    /// Places a detached mark at `offset`, which lies on line `line`.
    ///
    /// Fails with [`Error::InvalidMark`] if the handle is tracked already,
    /// was removed, or belongs to another tree, and with a bad-location error
    /// if the position is outside the document or contradicts the lines of
    /// the neighbouring marks.
    pub fn insert(&mut self, id: MarkId, offset: usize, line: usize) -> Result<()> {
        if self.slot(id)?.state != SlotState::Detached {
            return Err(Error::InvalidMark(id));
        }
        self.link(id.slot, offset, line)
    }

    /// Creates and places a mark in one step.
    pub fn insert_new(
        &mut self,
        offset: usize,
        line: usize,
        insert_after: bool,
        kind: MarkKind,
    ) -> Result<MarkId> {
        let id = self.create(insert_after, kind);
        if let Err(err) = self.link(id.slot, offset, line) {
            self.free_slot(id.slot);
            return Err(err);
        }
        Ok(id)
    }

    /// Stops tracking a mark. The handle is dead afterwards.
    pub fn remove(&mut self, id: MarkId) -> Result<()> {
        let leaf = self.linked_leaf(id)?;
        self.unlink(id.slot, leaf);
        self.free_slot(id.slot);
        Ok(())
    }

    /// Returns true if the handle refers to a tracked mark.
    pub fn is_valid(&self, id: MarkId) -> bool {
        self.linked_leaf(id).is_ok()
    }

    /// Payload of a mark.
    pub fn kind(&self, id: MarkId) -> Result<&MarkKind> {
        self.linked_leaf(id)?;
        Ok(&self.slots[id.slot as usize].kind)
    }

    /// Mutable payload of a mark.
    pub fn kind_mut(&mut self, id: MarkId) -> Result<&mut MarkKind> {
        self.linked_leaf(id)?;
        Ok(&mut self.slots[id.slot as usize].kind)
    }

    /// Bias of a mark.
    pub fn insert_after(&self, id: MarkId) -> Result<bool> {
        Ok(self.slot(id)?.insert_after)
    }

    // ==================== Lookups ====================

    /// Absolute offset and line of a mark.
    pub fn position(&self, id: MarkId) -> Result<MarkPosition> {
        let leaf = self.linked_leaf(id)?;
        Ok(self.resolve(leaf, id.slot).1)
    }

    /// Absolute offset of a mark.
    pub fn offset_of(&self, id: MarkId) -> Result<usize> {
        self.position(id).map(|p| p.offset)
    }

    /// Line of a mark.
    pub fn line_of(&self, id: MarkId) -> Result<usize> {
        self.position(id).map(|p| p.line)
    }

    /// Global index of a mark in document order.
    pub fn index(&self, id: MarkId) -> Result<usize> {
        let leaf = self.linked_leaf(id)?;
        Ok(self.resolve(leaf, id.slot).0)
    }

    /// Index at which a mark with the given bias would be inserted at
    /// `offset`: every mark before it lies before `offset` or sorts before
    /// the new mark at `offset`.
    pub fn locate(&self, offset: usize, insert_after: bool) -> usize {
        self.seek_offset(offset, insert_after).index
    }

    /// Number of marks strictly before `offset`.
    pub fn count_before(&self, offset: usize) -> usize {
        self.seek(|pos, _, _| pos < offset).index
    }

    /// Nearest mark at or before `offset`.
    pub fn left_mark(&self, offset: usize) -> NearestMark {
        self.nearest_before(self.seek(|pos, _, _| pos <= offset))
    }

    /// Nearest mark whose line is at most `line`.
    pub fn mark_from_line(&self, line: usize) -> NearestMark {
        self.nearest_before(self.seek(|_, l, _| l <= line))
    }

    /// Nearest mark on a line strictly before `line`.
    pub fn mark_before_line(&self, line: usize) -> NearestMark {
        self.nearest_before(self.seek(|_, l, _| l < line))
    }

    /// Mark at a global index.
    pub fn mark_at(&self, index: usize) -> Option<MarkInfo> {
        if index >= self.len() {
            return None;
        }
        let seek = self.seek_index(index);
        let entry = self.planes[0].node(seek.leaf).entries[seek.slot_index];
        Some(self.info(&entry, seek.base))
    }

    /// Iterates over all marks in document order.
    pub fn iter(&self) -> MarkIter<'_> {
        self.iter_from(0)
    }

    /// Iterates from the mark at `index` onwards.
    pub fn iter_from(&self, index: usize) -> MarkIter<'_> {
        if index >= self.len() {
            return MarkIter::exhausted(self);
        }
        let seek = self.seek_index(index);
        MarkIter::new(self, seek.leaf, seek.slot_index, seek.base)
    }

    /// Marks with `start <= offset < end`.
    pub fn range(&self, start: usize, end: usize) -> impl Iterator<Item = MarkInfo> + '_ {
        let seek = self.seek(|pos, _, _| pos < start);
        MarkIter::new(self, seek.leaf, seek.slot_index, seek.base).take_while(move |m| m.offset < end)
    }

    /// Runs `visit` against a consistent view of the marks; no structural
    /// change can happen while it runs.
    pub fn render<R>(&self, visit: impl FnOnce(&Self) -> R) -> R {
        visit(self)
    }

    // ==================== Edit propagation ====================

    /// Accounts for `length` characters containing `lines` line feeds
    /// inserted at `offset`.
    ///
    /// Marks after `offset`, and marks at `offset` with
    /// `insert_after = false`, move forward.
    pub fn insert_update(&mut self, offset: usize, length: usize, lines: usize) -> Result<()> {
        if offset > self.extent.offset {
            return Err(Error::BadLocation {
                offset,
                limit: self.extent.offset,
            });
        }
        self.extent.offset += length;
        self.extent.line += lines;
        if length == 0 && lines == 0 {
            return Ok(());
        }
        let seek = self.seek_offset(offset, true);
        self.shift_from(seek.leaf, seek.slot_index, length as isize, lines as isize);
        Ok(())
    }

    /// Accounts for `length` characters containing `lines` line feeds
    /// removed at `offset`, which lies on line `line`.
    ///
    /// Marks inside `(offset, offset + length]` collapse onto `offset` and
    /// are reported to `on_collapse`. Collapsed marks with
    /// `insert_after = true` are re-linked so they keep sorting before the
    /// `insert_after = false` marks at `offset`. A removal behind the last
    /// mark changes no mark.
    pub fn remove_update(
        &mut self,
        offset: usize,
        line: usize,
        length: usize,
        lines: usize,
        mut on_collapse: impl FnMut(MarkId),
    ) -> Result<()> {
        let end = offset + length;
        if end > self.extent.offset {
            return Err(Error::BadLocation {
                offset: end,
                limit: self.extent.offset,
            });
        }
        if lines > length || line + lines > self.extent.line {
            return Err(Error::BadLine {
                line: line + lines,
                limit: self.extent.line,
            });
        }
        self.extent.offset -= length;
        self.extent.line -= lines;
        if length == 0 {
            return Ok(());
        }

        let seek = self.seek_offset(offset, false);
        if seek.index == self.len() {
            return Ok(());
        }

        let tree = self.id;
        let mut leaf = seek.leaf;
        let mut slot_index = seek.slot_index;
        let mut prev = seek.base;
        let mut remaining = (length, lines);
        let mut first = true;
        let mut rehome = Vec::new();
        loop {
            let mut taken = (0usize, 0usize);
            let mut done = false;
            let slots = &self.slots;
            let entries = &mut self.planes[0].node_mut(leaf).entries;
            while slot_index < entries.len() {
                let entry = &mut entries[slot_index];
                let old = MarkPosition::new(prev.offset + entry.rel_pos, prev.line + entry.rel_line);
                if remaining == (0, 0) && old.offset > end {
                    done = true;
                    break;
                }
                // The first mark only gives up the part of its distance that
                // lies behind the removal offset.
                let room = if first {
                    debug_assert!(old.line >= line, "removal line ahead of the next mark");
                    (old.offset - offset, old.line.saturating_sub(line))
                } else {
                    (entry.rel_pos, entry.rel_line)
                };
                let take = (remaining.0.min(room.0), remaining.1.min(room.1));
                entry.rel_pos -= take.0;
                entry.rel_line -= take.1;
                remaining = (remaining.0 - take.0, remaining.1 - take.1);
                taken = (taken.0 + take.0, taken.1 + take.1);

                if old.offset <= end {
                    let slot = &slots[entry.target as usize];
                    on_collapse(MarkId {
                        tree,
                        slot: entry.target,
                        generation: slot.generation,
                    });
                    if slot.insert_after {
                        rehome.push(entry.target);
                    }
                }
                prev = old;
                first = false;
                slot_index += 1;
            }
            self.bubble(0, leaf, -(taken.0 as isize), -(taken.1 as isize));
            if done {
                break;
            }
            match self.next_leaf(leaf) {
                Some(next) => {
                    leaf = next;
                    slot_index = 0;
                }
                None => break,
            }
        }

        if !rehome.is_empty() {
            log::trace!("re-linking {} collapsed marks at {}", rehome.len(), offset);
        }
        // Seeking for the collapse point is only sound on an ordered tree, so
        // every collapsed right-biased mark leaves before any is linked back.
        for &slot in &rehome {
            let SlotState::Linked(leaf) = self.slots[slot as usize].state else {
                panic!("mark tree: collapsed mark {slot} is not linked");
            };
            self.unlink(slot, leaf);
        }
        for slot in rehome {
            self.link(slot, offset, line)?;
        }
        Ok(())
    }

    // ==================== Consistency ====================

    /// Audits the whole structure. Intended for tests and debug assertions.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let top = self.top();
        let roots: Vec<_> = self.planes[top].live().collect();
        if roots != [self.root] {
            return Err(format!("top plane holds {roots:?}, root is {}", self.root));
        }
        if self.root_node().parent.is_some() {
            return Err("root has a parent".into());
        }
        if top > 0 && self.root_node().len() < 2 {
            return Err("non-leaf root with a single child".into());
        }

        let mut linked = 0;
        for (level, plane) in self.planes.iter().enumerate() {
            for id in plane.live() {
                let node = plane.node(id);
                if node.len() > FANOUT {
                    return Err(format!("plane {level} node {id} holds {} entries", node.len()));
                }
                if level != top {
                    if node.entries.is_empty() {
                        return Err(format!("plane {level} node {id} is empty"));
                    }
                    let Some(parent) = node.parent else {
                        return Err(format!("plane {level} node {id} has no parent"));
                    };
                    let up = self.planes[level + 1].node(parent);
                    match up.index_of(id) {
                        Some(j) if up.entries[j] == node.summary(id) => {}
                        Some(_) => return Err(format!("stale summary for plane {level} node {id}")),
                        None => return Err(format!("plane {level} node {id} missing from parent")),
                    }
                }
                for entry in &node.entries {
                    if level == 0 {
                        let slot = &self.slots[entry.target as usize];
                        if slot.state != SlotState::Linked(id) {
                            return Err(format!("slot {} does not point at leaf {id}", entry.target));
                        }
                        if entry.count != 1 || entry.tail_after != slot.insert_after {
                            return Err(format!("leaf entry for slot {} is malformed", entry.target));
                        }
                        if entry.rel_line > entry.rel_pos {
                            return Err(format!("slot {} spans more lines than characters", entry.target));
                        }
                        linked += 1;
                    } else if self.planes[level - 1].node(entry.target).parent != Some(id) {
                        return Err(format!("plane {} node {} has a stale parent", level - 1, entry.target));
                    }
                }
            }
        }

        let tracked = self
            .slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Linked(_)))
            .count();
        if tracked != linked || linked != self.len() {
            return Err(format!("{tracked} linked slots, {linked} leaf entries, len {}", self.len()));
        }

        let mut prev: Option<MarkInfo> = None;
        for mark in self.iter() {
            if let Some(p) = prev {
                if p.offset == mark.offset && !p.insert_after && mark.insert_after {
                    return Err(format!("bias order broken at offset {}", mark.offset));
                }
            }
            prev = Some(mark);
        }
        if let Some(last) = prev {
            if last.offset > self.extent.offset || last.line > self.extent.line {
                return Err(format!("mark at {}:{} beyond the document", last.offset, last.line));
            }
        }
        Ok(())
    }

    // ==================== Internals ====================

    fn top(&self) -> usize {
        self.planes.len() - 1
    }

    fn root_node(&self) -> &Node {
        self.planes[self.top()].node(self.root)
    }

    fn handle(&self, slot: u32) -> MarkId {
        MarkId {
            tree: self.id,
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn info(&self, entry: &Entry, base: MarkPosition) -> MarkInfo {
        MarkInfo {
            id: self.handle(entry.target),
            offset: base.offset + entry.rel_pos,
            line: base.line + entry.rel_line,
            insert_after: self.slots[entry.target as usize].insert_after,
        }
    }

    fn slot(&self, id: MarkId) -> Result<&MarkSlot> {
        match self.slots.get(id.slot as usize) {
            Some(slot)
                if id.tree == self.id
                    && slot.generation == id.generation
                    && slot.state != SlotState::Free =>
            {
                Ok(slot)
            }
            _ => Err(Error::InvalidMark(id)),
        }
    }

    fn linked_leaf(&self, id: MarkId) -> Result<NodeId> {
        match self.slot(id)?.state {
            SlotState::Linked(leaf) => Ok(leaf),
            _ => Err(Error::InvalidMark(id)),
        }
    }

    fn free_slot(&mut self, slot: u32) {
        let entry = &mut self.slots[slot as usize];
        entry.generation = entry.generation.wrapping_add(1);
        entry.state = SlotState::Free;
        entry.kind = MarkKind::Plain;
        self.free_slots.push(slot);
    }

    fn check_location(&self, offset: usize, line: usize) -> Result<()> {
        if offset > self.extent.offset {
            return Err(Error::BadLocation {
                offset,
                limit: self.extent.offset,
            });
        }
        if line > self.extent.line {
            return Err(Error::BadLine {
                line,
                limit: self.extent.line,
            });
        }
        Ok(())
    }

    /// Global index and absolute position of a linked slot.
    fn resolve(&self, leaf: NodeId, slot: u32) -> (usize, MarkPosition) {
        let node = self.planes[0].node(leaf);
        let i = child_index(node, slot);
        let mut index = i;
        let mut pos = MarkPosition::default();
        for entry in &node.entries[..=i] {
            pos.offset += entry.rel_pos;
            pos.line += entry.rel_line;
        }
        let mut plane = 0;
        let mut child = leaf;
        while let Some(parent) = self.planes[plane].node(child).parent {
            let up = self.planes[plane + 1].node(parent);
            let j = child_index(up, child);
            for entry in &up.entries[..j] {
                index += entry.count;
                pos.offset += entry.rel_pos;
                pos.line += entry.rel_line;
            }
            child = parent;
            plane += 1;
        }
        (index, pos)
    }

    fn seek_offset(&self, offset: usize, insert_after: bool) -> Seek {
        if insert_after {
            self.seek(|pos, _, tail_after| pos < offset || (pos == offset && tail_after))
        } else {
            self.seek(|pos, _, _| pos <= offset)
        }
    }

    /// Descends to the first mark for which `skip(offset, line, insert_after)`
    /// is false. `skip` must hold for a prefix of the marks only.
    fn seek(&self, skip: impl Fn(usize, usize, bool) -> bool) -> Seek {
        let mut plane = self.top();
        let mut node = self.root;
        let mut base = MarkPosition::default();
        let mut index = 0;
        loop {
            let current = self.planes[plane].node(node);
            let mut chosen = None;
            for (i, entry) in current.entries.iter().enumerate() {
                let last = MarkPosition::new(base.offset + entry.rel_pos, base.line + entry.rel_line);
                if skip(last.offset, last.line, entry.tail_after) {
                    base = last;
                    index += entry.count;
                } else {
                    chosen = Some(i);
                    break;
                }
            }
            match chosen {
                Some(i) if plane > 0 => {
                    node = current.entries[i].target;
                    plane -= 1;
                }
                Some(i) => {
                    return Seek {
                        index,
                        leaf: node,
                        slot_index: i,
                        base,
                    }
                }
                None => {
                    let leaf = self.rightmost_leaf(plane, node);
                    return Seek {
                        index,
                        leaf,
                        slot_index: self.planes[0].node(leaf).len(),
                        base,
                    };
                }
            }
        }
    }

    /// Descends to the mark with global index `index` (< len).
    fn seek_index(&self, index: usize) -> Seek {
        let mut remaining = index;
        let mut plane = self.top();
        let mut node = self.root;
        let mut base = MarkPosition::default();
        loop {
            let current = self.planes[plane].node(node);
            let mut chosen = current.len();
            for (i, entry) in current.entries.iter().enumerate() {
                if plane == 0 {
                    if remaining == 0 {
                        chosen = i;
                        break;
                    }
                } else if remaining < entry.count {
                    chosen = i;
                    break;
                }
                remaining -= entry.count;
                base.offset += entry.rel_pos;
                base.line += entry.rel_line;
            }
            if plane == 0 {
                return Seek {
                    index,
                    leaf: node,
                    slot_index: chosen,
                    base,
                };
            }
            node = current.entries[chosen].target;
            plane -= 1;
        }
    }

    fn nearest_before(&self, seek: Seek) -> NearestMark {
        if seek.index == 0 {
            return NearestMark::document_start();
        }
        let id = if seek.slot_index > 0 {
            self.handle(self.planes[0].node(seek.leaf).entries[seek.slot_index - 1].target)
        } else {
            match self.mark_at(seek.index - 1) {
                Some(info) => info.id,
                None => return NearestMark::document_start(),
            }
        };
        NearestMark {
            mark: Some(id),
            offset: seek.base.offset,
            line: seek.base.line,
        }
    }

    fn rightmost_leaf(&self, mut plane: usize, mut node: NodeId) -> NodeId {
        while plane > 0 {
            let current = self.planes[plane].node(node);
            node = current.entries[current.len() - 1].target;
            plane -= 1;
        }
        node
    }

    fn next_leaf(&self, leaf: NodeId) -> Option<NodeId> {
        let mut plane = 0;
        let mut node = leaf;
        loop {
            let parent = self.planes[plane].node(node).parent?;
            let up = self.planes[plane + 1].node(parent);
            let j = child_index(up, node);
            if j + 1 < up.len() {
                let mut next = up.entries[j + 1].target;
                while plane > 0 {
                    next = self.planes[plane].node(next).entries[0].target;
                    plane -= 1;
                }
                return Some(next);
            }
            node = parent;
            plane += 1;
        }
    }

    /// Splices a detached slot in at `offset`/`line`.
    fn link(&mut self, slot: u32, offset: usize, line: usize) -> Result<()> {
        self.check_location(offset, line)?;
        let insert_after = self.slots[slot as usize].insert_after;
        let seek = self.seek_offset(offset, insert_after);
        let rel_pos = offset - seek.base.offset;

        // The line must fit between the neighbours: at most one line per
        // character in either direction.
        let next = self.mark_following(&seek);
        let mut low = seek.base.line;
        let mut high = (seek.base.line + rel_pos).min(self.extent.line);
        if let Some(next) = next {
            high = high.min(next.line);
            low = low.max(next.line.saturating_sub(next.offset - offset));
        }
        if line < low || line > high {
            return Err(Error::BadLine { line, limit: high });
        }
        let rel_line = line - seek.base.line;

        let entry = Entry::leaf(slot, rel_pos, rel_line, insert_after);
        self.planes[0].node_mut(seek.leaf).entries.insert(seek.slot_index, entry);
        self.slots[slot as usize].state = SlotState::Linked(seek.leaf);
        self.refresh(0, seek.leaf);
        if next.is_some() {
            self.shift_from(
                seek.leaf,
                seek.slot_index + 1,
                -(rel_pos as isize),
                -(rel_line as isize),
            );
        }
        self.split_if_needed(0, seek.leaf);
        Ok(())
    }

    /// Takes a linked slot out of the tree, leaving it detached.
    fn unlink(&mut self, slot: u32, leaf: NodeId) {
        let node = self.planes[0].node_mut(leaf);
        let i = child_index(node, slot);
        let removed = node.entries.remove(i);
        self.slots[slot as usize].state = SlotState::Detached;
        self.refresh(0, leaf);
        // The following mark now measures from the removed mark's predecessor.
        self.shift_from(leaf, i, removed.rel_pos as isize, removed.rel_line as isize);
        self.rebalance(0, leaf);
    }

    /// The mark at `seek.index`, if any.
    fn mark_following(&self, seek: &Seek) -> Option<MarkInfo> {
        let node = self.planes[0].node(seek.leaf);
        if seek.slot_index < node.len() {
            return Some(self.info(&node.entries[seek.slot_index], seek.base));
        }
        let next = self.next_leaf(seek.leaf)?;
        Some(self.info(&self.planes[0].node(next).entries[0], seek.base))
    }

    /// Adds a delta to the mark at `slot_index` of `leaf` (or the first mark
    /// of the next leaf when `slot_index` is past the end).
    fn shift_from(&mut self, leaf: NodeId, slot_index: usize, dpos: isize, dline: isize) {
        let (leaf, slot_index) = if slot_index < self.planes[0].node(leaf).len() {
            (leaf, slot_index)
        } else {
            match self.next_leaf(leaf) {
                Some(next) => (next, 0),
                None => return,
            }
        };
        let entry = &mut self.planes[0].node_mut(leaf).entries[slot_index];
        entry.rel_pos = apply(entry.rel_pos, dpos);
        entry.rel_line = apply(entry.rel_line, dline);
        self.bubble(0, leaf, dpos, dline);
    }

    /// Applies a delta to every ancestor entry above `node`.
    fn bubble(&mut self, mut plane: usize, mut node: NodeId, dpos: isize, dline: isize) {
        if dpos == 0 && dline == 0 {
            return;
        }
        while let Some(parent) = self.planes[plane].node(node).parent {
            let up = self.planes[plane + 1].node_mut(parent);
            let j = child_index(up, node);
            let entry = &mut up.entries[j];
            entry.rel_pos = apply(entry.rel_pos, dpos);
            entry.rel_line = apply(entry.rel_line, dline);
            node = parent;
            plane += 1;
        }
    }

    /// Recomputes the summaries on the path from `node` to the root.
    fn refresh(&mut self, mut plane: usize, mut node: NodeId) {
        while let Some(parent) = self.planes[plane].node(node).parent {
            let summary = self.planes[plane].node(node).summary(node);
            let up = self.planes[plane + 1].node_mut(parent);
            let j = child_index(up, node);
            up.entries[j] = summary;
            node = parent;
            plane += 1;
        }
    }

    /// Points the children of `node` back at it.
    fn adopt(&mut self, plane: usize, node: NodeId) {
        let targets: Vec<u32> = self.planes[plane]
            .node(node)
            .entries
            .iter()
            .map(|e| e.target)
            .collect();
        for target in targets {
            if plane == 0 {
                self.slots[target as usize].state = SlotState::Linked(node);
            } else {
                self.planes[plane - 1].node_mut(target).parent = Some(node);
            }
        }
    }

    fn split_if_needed(&mut self, mut plane: usize, mut node: NodeId) {
        while self.planes[plane].node(node).len() > FANOUT {
            let current = self.planes[plane].node_mut(node);
            let half = current.entries.len() / 2;
            let moved = current.entries.split_off(half);
            let parent = current.parent;
            let sibling = self.planes[plane].alloc(Node::new(parent, moved));
            self.adopt(plane, sibling);
            let left = self.planes[plane].node(node).summary(node);
            let right = self.planes[plane].node(sibling).summary(sibling);
            match parent {
                Some(parent) => {
                    let up = self.planes[plane + 1].node_mut(parent);
                    let j = child_index(up, node);
                    up.entries[j] = left;
                    up.entries.insert(j + 1, right);
                    self.refresh(plane + 1, parent);
                    node = parent;
                    plane += 1;
                }
                None => {
                    let mut top = Plane::default();
                    let root = top.alloc(Node::new(None, vec![left, right]));
                    self.planes.push(top);
                    self.planes[plane].node_mut(node).parent = Some(root);
                    self.planes[plane].node_mut(sibling).parent = Some(root);
                    self.root = root;
                    log::trace!("mark tree grew to {} planes", self.planes.len());
                    return;
                }
            }
        }
    }

    /// Restores fill and height invariants from `node` up to the root.
    fn rebalance(&mut self, mut plane: usize, mut node: NodeId) {
        loop {
            if plane == self.top() {
                if plane > 0 && self.planes[plane].node(node).len() == 1 {
                    let child = self.planes[plane].node(node).entries[0].target;
                    self.planes.pop();
                    self.planes[plane - 1].node_mut(child).parent = None;
                    self.root = child;
                    log::trace!("mark tree shrank to {} planes", self.planes.len());
                    plane -= 1;
                    node = child;
                    continue;
                }
                return;
            }
            let Some(parent) = self.planes[plane].node(node).parent else {
                panic!("mark tree: plane {plane} node {node} has no parent");
            };
            let len = self.planes[plane].node(node).len();
            if len == 0 {
                let up = self.planes[plane + 1].node_mut(parent);
                let j = child_index(up, node);
                up.entries.remove(j);
                self.planes[plane].release(node);
                self.refresh(plane + 1, parent);
            } else if len < MIN_FILL {
                self.merge_with_neighbour(plane, node, parent);
            }
            node = parent;
            plane += 1;
        }
    }

    fn merge_with_neighbour(&mut self, plane: usize, node: NodeId, parent: NodeId) {
        let up = self.planes[plane + 1].node(parent);
        let j = child_index(up, node);
        let (left, right) = if j > 0 {
            (up.entries[j - 1].target, node)
        } else if j + 1 < up.len() {
            (node, up.entries[j + 1].target)
        } else {
            return;
        };
        let combined = self.planes[plane].node(left).len() + self.planes[plane].node(right).len();
        if combined > FANOUT {
            return;
        }
        let moved = std::mem::take(&mut self.planes[plane].node_mut(right).entries);
        self.planes[plane].node_mut(left).entries.extend(moved);
        self.adopt(plane, left);
        self.planes[plane].release(right);

        let summary = self.planes[plane].node(left).summary(left);
        let up = self.planes[plane + 1].node_mut(parent);
        let r = child_index(up, right);
        up.entries.remove(r);
        let l = child_index(up, left);
        up.entries[l] = summary;
        self.refresh(plane + 1, parent);
    }
}

fn child_index(node: &Node, target: u32) -> usize {
    node.index_of(target)
        .unwrap_or_else(|| panic!("mark tree: entry {target} missing from its parent"))
}

fn apply(value: usize, delta: isize) -> usize {
    value
        .checked_add_signed(delta)
        .unwrap_or_else(|| panic!("mark tree: delta {delta} underflows {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(tree: &MarkTree) -> Vec<usize> {
        tree.iter().map(|m| m.offset).collect()
    }

    #[test]
    fn test_insert_and_position() {
        let mut tree = MarkTree::new(20, 3);
        let a = tree.insert_new(5, 1, false, MarkKind::Plain).unwrap();
        let b = tree.insert_new(2, 0, false, MarkKind::Plain).unwrap();
        let c = tree.insert_new(12, 2, true, MarkKind::Bookmark).unwrap();

        assert_eq!(tree.position(a).unwrap(), MarkPosition::new(5, 1));
        assert_eq!(tree.position(b).unwrap(), MarkPosition::new(2, 0));
        assert_eq!(tree.position(c).unwrap(), MarkPosition::new(12, 2));
        assert_eq!(offsets(&tree), vec![2, 5, 12]);
        assert_eq!(tree.index(a).unwrap(), 1);
        assert_eq!(tree.kind(c).unwrap(), &MarkKind::Bookmark);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_rejects_bad_location() {
        let mut tree = MarkTree::new(10, 1);
        assert!(matches!(
            tree.insert_new(11, 0, false, MarkKind::Plain),
            Err(Error::BadLocation { offset: 11, limit: 10 })
        ));
        assert!(matches!(
            tree.insert_new(3, 2, false, MarkKind::Plain),
            Err(Error::BadLine { .. })
        ));
        // A line that contradicts the neighbouring marks.
        tree.insert_new(6, 1, false, MarkKind::Plain).unwrap();
        assert!(tree.insert_new(8, 0, false, MarkKind::Plain).is_err());
        assert_eq!(tree.len(), 1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_twice_is_invalid() {
        let mut tree = MarkTree::new(10, 0);
        let mark = tree.create(false, MarkKind::Plain);
        tree.insert(mark, 3, 0).unwrap();
        assert_eq!(tree.insert(mark, 4, 0), Err(Error::InvalidMark(mark)));
    }

    #[test]
    fn test_removed_handle_is_dead() {
        let mut tree = MarkTree::new(10, 0);
        let mark = tree.insert_new(3, 0, false, MarkKind::Plain).unwrap();
        tree.remove(mark).unwrap();
        assert!(!tree.is_valid(mark));
        assert_eq!(tree.remove(mark), Err(Error::InvalidMark(mark)));
        assert_eq!(tree.offset_of(mark), Err(Error::InvalidMark(mark)));
        assert_eq!(tree.insert(mark, 3, 0), Err(Error::InvalidMark(mark)));

        // The recycled slot does not revive the old handle.
        let fresh = tree.insert_new(4, 0, false, MarkKind::Plain).unwrap();
        assert_eq!(fresh.slot, mark.slot);
        assert!(!tree.is_valid(mark));
        assert_eq!(tree.offset_of(fresh).unwrap(), 4);
    }

    #[test]
    fn test_foreign_handle_is_invalid() {
        let mut one = MarkTree::new(10, 0);
        let other = MarkTree::new(10, 0);
        let mark = one.insert_new(1, 0, false, MarkKind::Plain).unwrap();
        assert_eq!(other.position(mark), Err(Error::InvalidMark(mark)));
    }

    #[test]
    fn test_locate_tie_break() {
        let mut tree = MarkTree::new(10, 0);
        let f1 = tree.insert_new(5, 0, false, MarkKind::Plain).unwrap();
        let t1 = tree.insert_new(5, 0, true, MarkKind::Plain).unwrap();
        let f2 = tree.insert_new(5, 0, false, MarkKind::Plain).unwrap();
        let t2 = tree.insert_new(5, 0, true, MarkKind::Plain).unwrap();

        let order: Vec<_> = tree.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![t1, t2, f1, f2]);
        assert_eq!(tree.locate(5, true), 2);
        assert_eq!(tree.locate(5, false), 4);
        assert_eq!(tree.locate(4, false), 0);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_update_respects_bias() {
        let mut tree = MarkTree::new(10, 0);
        let stays = tree.insert_new(4, 0, true, MarkKind::Plain).unwrap();
        let moves = tree.insert_new(4, 0, false, MarkKind::Plain).unwrap();
        let before = tree.insert_new(2, 0, false, MarkKind::Plain).unwrap();
        let after = tree.insert_new(8, 0, true, MarkKind::Plain).unwrap();

        tree.insert_update(4, 3, 1).unwrap();

        assert_eq!(tree.position(stays).unwrap(), MarkPosition::new(4, 0));
        assert_eq!(tree.position(moves).unwrap(), MarkPosition::new(7, 1));
        assert_eq!(tree.position(before).unwrap(), MarkPosition::new(2, 0));
        assert_eq!(tree.position(after).unwrap(), MarkPosition::new(11, 1));
        assert_eq!(tree.extent(), MarkPosition::new(13, 1));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_merges_delta_into_next() {
        let mut tree = MarkTree::new(30, 0);
        let a = tree.insert_new(5, 0, false, MarkKind::Plain).unwrap();
        let b = tree.insert_new(10, 0, false, MarkKind::Plain).unwrap();
        let c = tree.insert_new(20, 0, false, MarkKind::Plain).unwrap();
        tree.remove(b).unwrap();
        assert_eq!(tree.offset_of(a).unwrap(), 5);
        assert_eq!(tree.offset_of(c).unwrap(), 20);
        tree.remove(c).unwrap();
        tree.remove(a).unwrap();
        assert!(tree.is_empty());
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_update_collapses_range() {
        // "ab\ncd\nef\n": lines start at 0, 3, 6.
        let mut tree = MarkTree::new(9, 3);
        let a = tree.insert_new(1, 0, false, MarkKind::Plain).unwrap();
        let inside = tree.insert_new(4, 1, false, MarkKind::Plain).unwrap();
        let edge = tree.insert_new(6, 2, false, MarkKind::Plain).unwrap();
        let beyond = tree.insert_new(7, 2, false, MarkKind::Plain).unwrap();

        // Remove "b\ncd\n" (offsets 1..6, two line feeds).
        let mut collapsed = Vec::new();
        tree.remove_update(1, 0, 5, 2, |id| collapsed.push(id)).unwrap();

        assert_eq!(collapsed, vec![inside, edge]);
        assert_eq!(tree.position(a).unwrap(), MarkPosition::new(1, 0));
        assert_eq!(tree.position(inside).unwrap(), MarkPosition::new(1, 0));
        assert_eq!(tree.position(edge).unwrap(), MarkPosition::new(1, 0));
        assert_eq!(tree.position(beyond).unwrap(), MarkPosition::new(2, 0));
        assert_eq!(tree.extent(), MarkPosition::new(4, 1));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_update_rehomes_right_biased_marks() {
        let mut tree = MarkTree::new(10, 0);
        let at = tree.insert_new(2, 0, false, MarkKind::Plain).unwrap();
        let sticky = tree.insert_new(5, 0, true, MarkKind::Plain).unwrap();
        tree.remove_update(2, 0, 3, 0, |_| {}).unwrap();

        assert_eq!(tree.offset_of(sticky).unwrap(), 2);
        assert!(tree.insert_after(sticky).unwrap());
        let order: Vec<_> = tree.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![sticky, at]);
        tree.check_invariants().unwrap();

        // Still sticky: an insertion at the collapse point leaves it there.
        tree.insert_update(2, 4, 0).unwrap();
        assert_eq!(tree.offset_of(sticky).unwrap(), 2);
        assert_eq!(tree.offset_of(at).unwrap(), 6);
    }

    #[test]
    fn test_remove_update_keeps_bias_order_across_leaves() {
        let mut tree = MarkTree::new(50, 0);
        let marks: Vec<_> = (1..=40)
            .map(|i| {
                let sticky = i % 2 == 1;
                (tree.insert_new(i, 0, sticky, MarkKind::Plain).unwrap(), sticky)
            })
            .collect();
        let mut collapsed = 0;
        tree.remove_update(0, 0, 50, 0, |_| collapsed += 1).unwrap();
        assert_eq!(collapsed, 40);
        tree.check_invariants().unwrap();

        let biases: Vec<_> = tree.iter().map(|m| m.insert_after).collect();
        assert_eq!(biases, [vec![true; 20], vec![false; 20]].concat());
        // Collapsed sticky marks keep their relative order.
        let sticky_order: Vec<_> = tree.iter().filter(|m| m.insert_after).map(|m| m.id).collect();
        let expected: Vec<_> = marks.iter().filter(|m| m.1).map(|m| m.0).collect();
        assert_eq!(sticky_order, expected);

        tree.insert_update(0, 5, 0).unwrap();
        for (mark, sticky) in &marks {
            let expected = if *sticky { 0 } else { 5 };
            assert_eq!(tree.offset_of(*mark).unwrap(), expected);
        }
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_update_behind_last_mark_is_noop() {
        let mut tree = MarkTree::new(10, 0);
        let a = tree.insert_new(3, 0, false, MarkKind::Plain).unwrap();
        tree.remove_update(5, 0, 5, 0, |_| panic!("nothing collapses")).unwrap();
        assert_eq!(tree.offset_of(a).unwrap(), 3);
        assert_eq!(tree.extent().offset, 5);
    }

    #[test]
    fn test_remove_update_rejects_overlong_range() {
        let mut tree = MarkTree::new(10, 0);
        assert!(tree.remove_update(8, 0, 3, 0, |_| {}).is_err());
        assert_eq!(tree.extent().offset, 10);
    }

    #[test]
    fn test_left_mark_and_mark_from_line() {
        let mut tree = MarkTree::new(40, 4);
        assert!(tree.left_mark(10).is_document_start());
        let a = tree.insert_new(5, 1, false, MarkKind::Plain).unwrap();
        let b = tree.insert_new(15, 2, false, MarkKind::Plain).unwrap();
        let c = tree.insert_new(25, 4, false, MarkKind::Plain).unwrap();

        assert!(tree.left_mark(4).is_document_start());
        assert_eq!(tree.left_mark(5).mark, Some(a));
        assert_eq!(tree.left_mark(24).mark, Some(b));
        assert_eq!(tree.left_mark(40).mark, Some(c));

        assert!(tree.mark_from_line(0).is_document_start());
        assert_eq!(tree.mark_from_line(1).mark, Some(a));
        let near = tree.mark_from_line(3);
        assert_eq!((near.mark, near.offset, near.line), (Some(b), 15, 2));
        assert_eq!(tree.mark_before_line(2).mark, Some(a));
    }

    #[test]
    fn test_grows_and_shrinks_planes() {
        let mut tree = MarkTree::new(10_000, 0);
        let marks: Vec<_> = (0..2_000)
            .map(|i| tree.insert_new(i * 5, 0, i % 3 == 0, MarkKind::Plain).unwrap())
            .collect();
        assert!(tree.depth() >= 3);
        tree.check_invariants().unwrap();
        for (i, mark) in marks.iter().enumerate() {
            assert_eq!(tree.offset_of(*mark).unwrap(), i * 5);
        }
        assert_eq!(tree.mark_at(1_234).map(|m| m.offset), Some(1_234 * 5));

        for mark in marks.iter().step_by(2) {
            tree.remove(*mark).unwrap();
        }
        tree.check_invariants().unwrap();
        for mark in marks.iter().skip(1).step_by(2) {
            tree.remove(*mark).unwrap();
        }
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_large_removal_across_leaves() {
        let mut tree = MarkTree::new(1_000, 0);
        let marks: Vec<_> = (0..200)
            .map(|i| tree.insert_new(i * 5, 0, i % 2 == 0, MarkKind::Plain).unwrap())
            .collect();
        let mut collapsed = 0;
        tree.remove_update(100, 0, 500, 0, |_| collapsed += 1).unwrap();
        tree.check_invariants().unwrap();
        assert_eq!(collapsed, 100);
        for (i, mark) in marks.iter().enumerate() {
            let old = i * 5;
            let expected = if old <= 100 {
                old
            } else if old <= 600 {
                100
            } else {
                old - 500
            };
            assert_eq!(tree.offset_of(*mark).unwrap(), expected, "mark {i}");
        }
    }

    #[test]
    fn test_range_and_iteration() {
        let mut tree = MarkTree::new(100, 0);
        for offset in [10, 20, 30, 40, 50] {
            tree.insert_new(offset, 0, false, MarkKind::Plain).unwrap();
        }
        let hits: Vec<_> = tree.range(20, 45).map(|m| m.offset).collect();
        assert_eq!(hits, vec![20, 30, 40]);
        let tail: Vec<_> = tree.iter_from(3).map(|m| m.offset).collect();
        assert_eq!(tail, vec![40, 50]);
        assert_eq!(tree.iter_from(9).count(), 0);
        assert_eq!(tree.render(|t| t.iter().count()), 5);
    }
}

/// Timing checks for the tree operations.
#[cfg(test)]
pub mod benchmarks {
    use super::*;
    use std::time::Instant;

    /// Benchmark: edits against a tree holding many marks.
    #[test]
    fn bench_updates_with_many_marks() {
        let mut tree = MarkTree::new(1_000_000, 0);
        for i in 0..50_000 {
            tree.insert_new(i * 20, 0, false, MarkKind::Plain).unwrap();
        }

        let start = Instant::now();
        for i in 0..20_000 {
            let offset = (i * 7_919) % 900_000;
            tree.insert_update(offset, 3, 0).unwrap();
            tree.remove_update(offset, 0, 3, 0, |_| {}).unwrap();
        }
        let elapsed = start.elapsed();

        println!(
            "Mark updates: 40000 edits over 50000 marks in {:.2}ms ({:.2}us/edit)",
            elapsed.as_secs_f64() * 1000.0,
            elapsed.as_secs_f64() * 1_000_000.0 / 40_000.0
        );

        // Generous bound for debug builds
        assert!(elapsed.as_secs_f64() < 5.0, "Mark updates too slow");
        tree.check_invariants().unwrap();
    }
}
