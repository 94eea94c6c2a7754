use super::genome::{Genome, NodeId, NodeRole};
use crate::error::{EvotraderError, Result};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
struct Step {
    slot: usize,
    bias: f64,
    incoming: Vec<(usize, f64)>,
}

/// A genome compiled into a feed-forward evaluation plan
#[derive(Debug, Clone)]
pub struct Network {
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    plan: Vec<Step>,
    values: Vec<f64>,
}

impl Network {
    pub fn from_genome(genome: &Genome) -> Result<Self> {
        let slots: HashMap<NodeId, usize> = genome
            .nodes()
            .iter()
            .enumerate()
            .map(|(slot, node)| (node.id, slot))
            .collect();
        let slot_of = |id: NodeId| {
            slots.get(&id).copied().ok_or_else(|| {
                EvotraderError::Generation(format!("Connection references missing node {}", id))
            })
        };

        let count = genome.nodes().len();
        let mut incoming: Vec<Vec<(usize, f64)>> = vec![Vec::new(); count];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        for c in genome.connections().iter().filter(|c| c.enabled) {
            let (from, to) = (slot_of(c.from)?, slot_of(c.to)?);
            incoming[to].push((from, c.weight));
            outgoing[from].push(to);
            in_degree[to] += 1;
        }

        // Kahn's algorithm
        let mut ready: VecDeque<usize> = (0..count).filter(|&slot| in_degree[slot] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(slot) = ready.pop_front() {
            order.push(slot);
            for &next in &outgoing[slot] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        if order.len() != count {
            return Err(EvotraderError::Generation("Genome contains a cycle".to_string()));
        }

        let nodes = genome.nodes();
        let plan = order
            .into_iter()
            .filter(|&slot| nodes[slot].role != NodeRole::Input)
            .map(|slot| Step {
                slot,
                bias: nodes[slot].bias,
                incoming: std::mem::take(&mut incoming[slot]),
            })
            .collect();

        let with_role = |role: NodeRole| -> Vec<usize> {
            let mut picked: Vec<(NodeId, usize)> = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.role == role)
                .map(|(slot, n)| (n.id, slot))
                .collect();
            picked.sort_unstable();
            picked.into_iter().map(|(_, slot)| slot).collect()
        };

        Ok(Self {
            inputs: with_role(NodeRole::Input),
            outputs: with_role(NodeRole::Output),
            plan,
            values: vec![0.0; count],
        })
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Feeds `inputs` (ordered by input node id) through the network
    pub fn activate(&mut self, inputs: &[f64]) -> Result<Vec<f64>> {
        if inputs.len() != self.inputs.len() {
            return Err(EvotraderError::Generation(format!(
                "Network takes {} inputs, got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }

        for (&slot, &value) in self.inputs.iter().zip(inputs) {
            self.values[slot] = value;
        }
        for step in &self.plan {
            let sum: f64 = step
                .incoming
                .iter()
                .map(|&(from, weight)| self.values[from] * weight)
                .sum();
            self.values[step.slot] = (step.bias + sum).tanh();
        }
        Ok(self.outputs.iter().map(|&slot| self.values[slot]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::genome::{ConnectionGene, NodeGene};
    use crate::engines::generation::innovation::InnovationTracker;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_genome() -> Genome {
        Genome {
            nodes: vec![
                NodeGene { id: 0, role: NodeRole::Input, bias: 0.0 },
                NodeGene { id: 1, role: NodeRole::Input, bias: 0.0 },
                NodeGene { id: 2, role: NodeRole::Output, bias: 0.1 },
                NodeGene { id: 3, role: NodeRole::Hidden, bias: -0.2 },
            ],
            connections: vec![
                ConnectionGene { innovation: 0, from: 0, to: 2, weight: 0.5, enabled: false },
                ConnectionGene { innovation: 1, from: 1, to: 2, weight: -1.0, enabled: true },
                ConnectionGene { innovation: 2, from: 0, to: 3, weight: 1.0, enabled: true },
                ConnectionGene { innovation: 3, from: 3, to: 2, weight: 0.5, enabled: true },
            ],
            fitness: 0.0,
            species: None,
        }
    }

    #[test]
    fn test_activation_through_hidden_node() {
        let mut network = Network::from_genome(&fixed_genome()).unwrap();
        let out = network.activate(&[1.0, 0.5]).unwrap();

        let hidden = (-0.2f64 + 1.0).tanh();
        let expected = (0.1 + -0.5 + 0.5 * hidden).tanh();
        assert!((out[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let mut genome = fixed_genome();
        genome.connections.push(ConnectionGene { innovation: 4, from: 2, to: 3, weight: 1.0, enabled: true });
        assert!(matches!(Network::from_genome(&genome), Err(EvotraderError::Generation(_))));
    }

    #[test]
    fn test_wrong_input_count() {
        let mut tracker = InnovationTracker::new();
        let genome = Genome::minimal(3, 1, &mut tracker, &mut StdRng::seed_from_u64(0));
        let mut network = Network::from_genome(&genome).unwrap();
        assert!(network.activate(&[1.0]).is_err());
        assert_eq!(network.activate(&[0.0, 0.0, 0.0]).unwrap().len(), 1);
    }
}
