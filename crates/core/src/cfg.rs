//! The control-flow graph the optimizer walks (spec §3 "Cfg"/"BasicBlock").
//!
//! Nodes are hand-rolled rather than built on a graph crate: a `Cfg` owns a
//! flat `Vec<Option<CfgNode>>` indexed by `NodeId`, and `link`/`unlink` are
//! the only way to change an edge so the predecessor and successor sets stay
//! symmetric. A removed block leaves a `None` hole rather than shifting
//! every later `NodeId`, since `Object::Jump`/`Object::Branch` targets are
//! bare `NodeId`s and must stay valid across a pass's lifetime.

use std::collections::BTreeSet;

use crate::object::Object;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// One basic block: a straight-line run of `Object`s ending, once the graph
/// is well formed, in a terminator (`Jump`, `Branch`, or an error
/// `Message`).
#[derive(Debug, Clone, Default)]
pub struct CfgNode {
    pub id_hint: usize,
    pub instructions: Vec<Object>,
    predecessors: BTreeSet<NodeId>,
    successors: BTreeSet<NodeId>,
}

impl CfgNode {
    pub fn predecessors(&self) -> &BTreeSet<NodeId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<NodeId> {
        &self.successors
    }

    /// A block with no terminator instruction yet, or an explicit `Jump`
    /// with no predicate, falls straight through to its sole successor.
    pub fn is_terminated(&self) -> bool {
        self.instructions.last().is_some_and(Object::is_terminator)
    }
}

/// The CFG for one `meson.build` tree. `NodeId(0)` is always the entry
/// block of the whole configure run.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    nodes: Vec<Option<CfgNode>>,
}

pub const ENTRY: NodeId = NodeId(0);

impl Cfg {
    pub fn new() -> Self {
        let mut cfg = Cfg { nodes: Vec::new() };
        let entry = cfg.add_block();
        assert_eq!(entry, ENTRY);
        cfg
    }

    pub fn add_block(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(CfgNode {
            id_hint: id.0,
            ..CfgNode::default()
        }));
        id
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        self.nodes[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("node {id:?} was removed"))
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CfgNode {
        self.nodes[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("node {id:?} was removed"))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len() && self.nodes[id.0].is_some()
    }

    /// Directed edge `from -> to`; updates both sides' sets.
    pub fn link(&mut self, from: NodeId, to: NodeId) {
        self.node_mut(from).successors.insert(to);
        self.node_mut(to).predecessors.insert(from);
    }

    pub fn unlink(&mut self, from: NodeId, to: NodeId) {
        self.node_mut(from).successors.remove(&to);
        self.node_mut(to).predecessors.remove(&from);
    }

    /// Drops a block after unlinking it from every neighbor. Panics (a
    /// pass bug, not a user-facing error) if callers didn't unlink first —
    /// the point is to make dangling edges impossible to leave behind by
    /// accident.
    pub fn remove_block(&mut self, id: NodeId) {
        let (preds, succs) = {
            let node = self.node(id);
            (
                node.predecessors.clone().into_iter().collect::<Vec<_>>(),
                node.successors.clone().into_iter().collect::<Vec<_>>(),
            )
        };
        for p in preds {
            self.unlink(p, id);
        }
        for s in succs {
            self.unlink(id, s);
        }
        self.nodes[id.0] = None;
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| NodeId(i)))
    }

    pub fn len(&self) -> usize {
        self.node_ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Predecessor-first traversal from `ENTRY`: a node is visited only
    /// once every predecessor already reachable from the entry has been
    /// visited (spec §3 `graph_walker`). Unreachable nodes (no path from
    /// `ENTRY`) are appended at the end in `NodeId` order so the walker
    /// still covers every live block.
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![(ENTRY, false)];
        while let Some((id, processed)) = stack.pop() {
            if !self.contains(id) {
                continue;
            }
            if processed {
                order.push(id);
                continue;
            }
            if visited[id.0] {
                continue;
            }
            visited[id.0] = true;
            stack.push((id, true));
            for &succ in self.node(id).successors().iter().rev() {
                if !visited[succ.0] {
                    stack.push((succ, false));
                }
            }
        }
        order.reverse();
        for id in self.node_ids() {
            if !visited[id.0] {
                order.push(id);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cfg_has_single_entry_block() {
        let cfg = Cfg::new();
        assert_eq!(cfg.len(), 1);
        assert!(cfg.contains(ENTRY));
    }

    #[test]
    fn link_is_symmetric() {
        let mut cfg = Cfg::new();
        let b1 = cfg.add_block();
        cfg.link(ENTRY, b1);
        assert!(cfg.node(ENTRY).successors().contains(&b1));
        assert!(cfg.node(b1).predecessors().contains(&ENTRY));
    }

    #[test]
    fn unlink_removes_from_both_sides() {
        let mut cfg = Cfg::new();
        let b1 = cfg.add_block();
        cfg.link(ENTRY, b1);
        cfg.unlink(ENTRY, b1);
        assert!(!cfg.node(ENTRY).successors().contains(&b1));
        assert!(!cfg.node(b1).predecessors().contains(&ENTRY));
    }

    #[test]
    fn remove_block_unlinks_all_neighbors() {
        let mut cfg = Cfg::new();
        let b1 = cfg.add_block();
        let b2 = cfg.add_block();
        cfg.link(ENTRY, b1);
        cfg.link(b1, b2);
        cfg.remove_block(b1);
        assert!(!cfg.contains(b1));
        assert!(!cfg.node(ENTRY).successors().contains(&b1));
        assert!(!cfg.node(b2).predecessors().contains(&b1));
    }

    #[test]
    fn reverse_postorder_visits_entry_first() {
        let mut cfg = Cfg::new();
        let b1 = cfg.add_block();
        let b2 = cfg.add_block();
        cfg.link(ENTRY, b1);
        cfg.link(b1, b2);
        let order = cfg.reverse_postorder();
        assert_eq!(order[0], ENTRY);
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn reverse_postorder_includes_unreachable_blocks() {
        let mut cfg = Cfg::new();
        let orphan = cfg.add_block();
        let order = cfg.reverse_postorder();
        assert!(order.contains(&orphan));
    }
}
