use super::innovation::InnovationTracker;
use super::species::SpeciesId;
use crate::error::{EvotraderError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type NodeId = u32;
pub type Innovation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Input,
    Hidden,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: NodeId,
    pub role: NodeRole,
    pub bias: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub innovation: Innovation,
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    pub enabled: bool,
}

/// Encoded network: node genes plus connection genes sorted by innovation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub(crate) nodes: Vec<NodeGene>,
    pub(crate) connections: Vec<ConnectionGene>,
    #[serde(skip, default)]
    pub fitness: f64,
    #[serde(skip, default)]
    pub species: Option<SpeciesId>,
}

impl Genome {
    /// Every input wired to every output with weights drawn from `[-1, 1)`
    pub fn minimal<R: Rng>(inputs: usize, outputs: usize, tracker: &mut InnovationTracker, rng: &mut R) -> Self {
        let mut nodes = Vec::with_capacity(inputs + outputs);
        for id in 0..inputs {
            nodes.push(NodeGene { id: id as NodeId, role: NodeRole::Input, bias: 0.0 });
        }
        for id in inputs..inputs + outputs {
            nodes.push(NodeGene {
                id: id as NodeId,
                role: NodeRole::Output,
                bias: rng.gen_range(-1.0..1.0),
            });
        }
        tracker.reserve_nodes((inputs + outputs) as NodeId);

        let mut connections = Vec::with_capacity(inputs * outputs);
        for from in 0..inputs as NodeId {
            for to in inputs as NodeId..(inputs + outputs) as NodeId {
                connections.push(ConnectionGene {
                    innovation: tracker.connection(from, to),
                    from,
                    to,
                    weight: rng.gen_range(-1.0..1.0),
                    enabled: true,
                });
            }
        }
        connections.sort_by_key(|c| c.innovation);

        Self {
            nodes,
            connections,
            fitness: 0.0,
            species: None,
        }
    }

    pub fn nodes(&self) -> &[NodeGene] {
        &self.nodes
    }

    pub fn connections(&self) -> &[ConnectionGene] {
        &self.connections
    }

    pub fn input_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.role == NodeRole::Input).count()
    }

    pub fn output_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.role == NodeRole::Output).count()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeGene> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn connection_between(&self, from: NodeId, to: NodeId) -> Option<&ConnectionGene> {
        self.connections.iter().find(|c| c.from == from && c.to == to)
    }

    pub(crate) fn insert_connection(&mut self, gene: ConnectionGene) {
        let at = self.connections.partition_point(|c| c.innovation < gene.innovation);
        self.connections.insert(at, gene);
    }

    /// Whether an edge `from -> to` would close a loop, counting disabled
    /// connections since they can be re-enabled later.
    pub fn creates_cycle(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for c in &self.connections {
            outgoing.entry(c.from).or_default().push(c.to);
        }

        let mut stack = vec![to];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == from {
                return true;
            }
            if seen.insert(node) {
                if let Some(next) = outgoing.get(&node) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        false
    }

    /// Structural checks for genomes coming from outside the engine
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(EvotraderError::Generation(format!("Duplicate node id {}", node.id)));
            }
            if !node.bias.is_finite() {
                return Err(EvotraderError::Generation(format!("Node {} has a non-finite bias", node.id)));
            }
        }

        let mut pairs = HashSet::new();
        let mut innovations = HashSet::new();
        for c in &self.connections {
            let (from, to) = match (self.node(c.from), self.node(c.to)) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    return Err(EvotraderError::Generation(format!(
                        "Connection {} references a missing node",
                        c.innovation
                    )))
                }
            };
            if to.role == NodeRole::Input || from.role == NodeRole::Output {
                return Err(EvotraderError::Generation(format!(
                    "Connection {} runs {:?} -> {:?}",
                    c.innovation, from.role, to.role
                )));
            }
            if !pairs.insert((c.from, c.to)) || !innovations.insert(c.innovation) {
                return Err(EvotraderError::Generation(format!(
                    "Connection {} -> {} is duplicated",
                    c.from, c.to
                )));
            }
            if !c.weight.is_finite() {
                return Err(EvotraderError::Generation(format!(
                    "Connection {} has a non-finite weight",
                    c.innovation
                )));
            }
        }

        if self.connections.windows(2).any(|w| w[0].innovation > w[1].innovation) {
            return Err(EvotraderError::Generation("Connections are not sorted by innovation".to_string()));
        }
        Ok(())
    }
}
