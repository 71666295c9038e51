//! Flat node table
//!
//! Traversal appends nodes to a table and records parent/child indices.
//! The nested `TraceNode` forest is built only once, at the end, without
//! recursion.

use crate::models::{GenealogyLink, LicensePlate, OperationType, TraceNode};

#[derive(Debug)]
struct Slot {
    lp: LicensePlate,
    depth: u32,
    /// `None` when the parent is the traversal root
    parent: Option<usize>,
    link_id: String,
    operation_type: OperationType,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct NodeTable {
    slots: Vec<Slot>,
    top_level: Vec<usize>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node under `parent` and return its slot index
    pub fn insert(&mut self, lp: LicensePlate, depth: u32, parent: Option<usize>, link: &GenealogyLink) -> usize {
        let idx = self.slots.len();
        self.slots.push(Slot {
            lp,
            depth,
            parent,
            link_id: link.id.clone(),
            operation_type: link.operation_type,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.slots[p].children.push(idx),
            None => self.top_level.push(idx),
        }
        idx
    }

    /// True if `lp_id` is the root or lies on the discovery path from the
    /// root down to `parent`, i.e. reaching it again from `parent` closes a loop.
    pub fn closes_cycle(&self, root_id: &str, parent: Option<usize>, lp_id: &str) -> bool {
        if lp_id == root_id {
            return true;
        }
        let mut cursor = parent;
        while let Some(idx) = cursor {
            let slot = &self.slots[idx];
            if slot.lp.id == lp_id {
                return true;
            }
            cursor = slot.parent;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn deepest(&self) -> u32 {
        self.slots.iter().map(|s| s.depth).max().unwrap_or(0)
    }

    /// Materialize the nested forest under the root
    pub fn into_tree(self) -> Vec<TraceNode> {
        let NodeTable { mut slots, top_level } = self;
        let mut built: Vec<Option<TraceNode>> = (0..slots.len()).map(|_| None).collect();

        // Children always sit at higher indices than their parent
        while let Some(slot) = slots.pop() {
            let idx = slots.len();
            let children = slot
                .children
                .iter()
                .filter_map(|child| built[*child].take())
                .collect();
            built[idx] = Some(TraceNode {
                lp: slot.lp,
                depth: slot.depth,
                link_id: slot.link_id,
                operation_type: slot.operation_type,
                children,
            });
        }

        top_level.iter().filter_map(|idx| built[*idx].take()).collect()
    }
}
