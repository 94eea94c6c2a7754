use super::genome::{Genome, Innovation, NodeId};
use std::collections::HashMap;

/// Hands out innovation numbers and node ids for a whole run.
///
/// The same structural mutation always gets the same identity, which is what
/// lets crossover and speciation line genes up across genomes.
#[derive(Debug, Clone, Default)]
pub struct InnovationTracker {
    connections: HashMap<(NodeId, NodeId), Innovation>,
    splits: HashMap<Innovation, NodeId>,
    next_innovation: Innovation,
    next_node: NodeId,
}

impl InnovationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Innovation number of the connection `from -> to`
    pub fn connection(&mut self, from: NodeId, to: NodeId) -> Innovation {
        if let Some(&innovation) = self.connections.get(&(from, to)) {
            return innovation;
        }
        let innovation = self.next_innovation;
        self.next_innovation += 1;
        self.connections.insert((from, to), innovation);
        innovation
    }

    /// Id of the node created by splitting connection `innovation`
    pub fn split_node(&mut self, innovation: Innovation) -> NodeId {
        if let Some(&node) = self.splits.get(&innovation) {
            return node;
        }
        let node = self.fresh_node();
        self.splits.insert(innovation, node);
        node
    }

    /// A node id never handed out before
    pub fn fresh_node(&mut self) -> NodeId {
        let node = self.next_node;
        self.next_node += 1;
        node
    }

    /// Keeps fresh ids clear of `0..count`
    pub fn reserve_nodes(&mut self, count: NodeId) {
        self.next_node = self.next_node.max(count);
    }

    /// Registers the structure of a genome built elsewhere
    pub fn absorb(&mut self, genome: &Genome) {
        for node in genome.nodes() {
            self.next_node = self.next_node.max(node.id + 1);
        }
        for c in genome.connections() {
            self.connections.entry((c.from, c.to)).or_insert(c.innovation);
            self.next_innovation = self.next_innovation.max(c.innovation + 1);
        }
    }

    pub fn innovation_count(&self) -> Innovation {
        self.next_innovation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_structure_same_identity() {
        let mut tracker = InnovationTracker::new();
        tracker.reserve_nodes(3);
        let a = tracker.connection(0, 2);
        let b = tracker.connection(1, 2);
        assert_ne!(a, b);
        assert_eq!(tracker.connection(0, 2), a);

        let split = tracker.split_node(a);
        assert_eq!(split, 3);
        assert_eq!(tracker.split_node(a), split);
        assert_eq!(tracker.fresh_node(), 4);
    }
}
