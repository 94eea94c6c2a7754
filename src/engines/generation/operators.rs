use super::genome::{ConnectionGene, Genome, NodeGene, NodeRole};
use super::innovation::InnovationTracker;
use crate::config::EvolutionConfig;
use rand::Rng;
use std::collections::HashMap;

/// Roulette wheel selection over `(index, weight)` pairs: probability
/// proportional to weight. Returns the chosen index.
pub fn roulette_selection<R: Rng>(candidates: &[(usize, f64)], rng: &mut R) -> usize {
    let total: f64 = candidates.iter().map(|(_, w)| w.max(0.0)).sum();

    if total <= 0.0 {
        // Nothing positive to weigh by, pick uniformly
        return candidates[rng.gen_range(0..candidates.len())].0;
    }

    let mut spin = rng.gen::<f64>() * total;
    for &(index, weight) in candidates {
        spin -= weight.max(0.0);
        if spin <= 0.0 {
            return index;
        }
    }

    // Fallback
    candidates[candidates.len() - 1].0
}

/// Applies every mutation operator with its configured probability
pub fn mutate<R: Rng>(genome: &mut Genome, tracker: &mut InnovationTracker, config: &EvolutionConfig, rng: &mut R) {
    if rng.gen::<f64>() < config.weight_mutation_rate {
        mutate_weights(genome, config, rng);
    }
    if rng.gen::<f64>() < config.toggle_connection_rate {
        toggle_connection(genome, rng);
    }
    if rng.gen::<f64>() < config.add_node_rate {
        add_node(genome, tracker, rng);
    }
    if rng.gen::<f64>() < config.add_connection_rate {
        add_connection(genome, tracker, rng);
    }
}

/// Perturbs every weight and bias by a bounded delta, occasionally replacing it
pub fn mutate_weights<R: Rng>(genome: &mut Genome, config: &EvolutionConfig, rng: &mut R) {
    let limit = config.weight_limit;
    let nudge = |value: &mut f64, rng: &mut R| {
        if rng.gen::<f64>() < config.weight_replace_rate {
            *value = rng.gen_range(-1.0..1.0);
        } else {
            *value += rng.gen_range(-config.weight_perturbation..config.weight_perturbation);
        }
        *value = value.clamp(-limit, limit);
    };

    for connection in genome.connections.iter_mut() {
        nudge(&mut connection.weight, &mut *rng);
    }
    for node in genome.nodes.iter_mut().filter(|n| n.role != NodeRole::Input) {
        nudge(&mut node.bias, &mut *rng);
    }
}

/// Flips the enabled flag of one connection
pub fn toggle_connection<R: Rng>(genome: &mut Genome, rng: &mut R) -> bool {
    if genome.connections.is_empty() {
        return false;
    }
    let index = rng.gen_range(0..genome.connections.len());
    let connection = &mut genome.connections[index];
    connection.enabled = !connection.enabled;
    true
}

/// Splits an enabled connection with a new hidden node.
///
/// The incoming half gets weight 1 and the outgoing half keeps the old weight,
/// so the network's behavior barely changes.
pub fn add_node<R: Rng>(genome: &mut Genome, tracker: &mut InnovationTracker, rng: &mut R) -> bool {
    let enabled: Vec<usize> = genome
        .connections
        .iter()
        .enumerate()
        .filter(|(_, c)| c.enabled)
        .map(|(i, _)| i)
        .collect();
    if enabled.is_empty() {
        return false;
    }

    let index = enabled[rng.gen_range(0..enabled.len())];
    let split = genome.connections[index].clone();
    genome.connections[index].enabled = false;

    let mut node = tracker.split_node(split.innovation);
    if genome.has_node(node) {
        // This genome split the same connection before
        node = tracker.fresh_node();
    }
    genome.nodes.push(NodeGene { id: node, role: NodeRole::Hidden, bias: 0.0 });

    genome.insert_connection(ConnectionGene {
        innovation: tracker.connection(split.from, node),
        from: split.from,
        to: node,
        weight: 1.0,
        enabled: true,
    });
    genome.insert_connection(ConnectionGene {
        innovation: tracker.connection(node, split.to),
        from: node,
        to: split.to,
        weight: split.weight,
        enabled: true,
    });
    true
}

/// Connects two unconnected nodes without closing a loop
pub fn add_connection<R: Rng>(genome: &mut Genome, tracker: &mut InnovationTracker, rng: &mut R) -> bool {
    let mut candidates = Vec::new();
    for from in genome.nodes.iter().filter(|n| n.role != NodeRole::Output) {
        for to in genome.nodes.iter().filter(|n| n.role != NodeRole::Input) {
            if genome.connection_between(from.id, to.id).is_none() && !genome.creates_cycle(from.id, to.id) {
                candidates.push((from.id, to.id));
            }
        }
    }
    if candidates.is_empty() {
        return false;
    }

    let (from, to) = candidates[rng.gen_range(0..candidates.len())];
    genome.insert_connection(ConnectionGene {
        innovation: tracker.connection(from, to),
        from,
        to,
        weight: rng.gen_range(-1.0..1.0),
        enabled: true,
    });
    true
}

/// Child of two parents: matching genes come from either parent at random,
/// disjoint and excess genes from the fitter one.
pub fn crossover<R: Rng>(a: &Genome, b: &Genome, rng: &mut R) -> Genome {
    let (fitter, other) = if b.fitness > a.fitness { (b, a) } else { (a, b) };

    let other_genes: HashMap<_, _> = other.connections.iter().map(|c| (c.innovation, c)).collect();
    let connections = fitter
        .connections
        .iter()
        .map(|gene| match other_genes.get(&gene.innovation) {
            Some(&matching) if rng.gen::<bool>() => matching.clone(),
            _ => gene.clone(),
        })
        .collect();

    let other_nodes: HashMap<_, _> = other.nodes.iter().map(|n| (n.id, n.bias)).collect();
    let nodes = fitter
        .nodes
        .iter()
        .map(|node| {
            let mut node = node.clone();
            if let Some(&bias) = other_nodes.get(&node.id) {
                if rng.gen::<bool>() {
                    node.bias = bias;
                }
            }
            node
        })
        .collect();

    Genome {
        nodes,
        connections,
        fitness: 0.0,
        species: None,
    }
}

/// `c1·E/N + c2·D/N + c3·W̄` over the innovation-aligned connection genes
pub fn compatibility_distance(a: &Genome, b: &Genome, config: &EvolutionConfig) -> f64 {
    let (xs, ys) = (&a.connections, &b.connections);
    let (mut i, mut j) = (0, 0);
    let (mut disjoint, mut matching, mut weight_diff) = (0usize, 0usize, 0.0);

    while i < xs.len() && j < ys.len() {
        match xs[i].innovation.cmp(&ys[j].innovation) {
            std::cmp::Ordering::Equal => {
                matching += 1;
                weight_diff += (xs[i].weight - ys[j].weight).abs();
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                disjoint += 1;
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                disjoint += 1;
                j += 1;
            }
        }
    }
    let excess = (xs.len() - i) + (ys.len() - j);

    let longest = xs.len().max(ys.len());
    // Small genomes are not normalized
    let n = if longest < 20 { 1.0 } else { longest as f64 };
    let mean_weight_diff = if matching > 0 { weight_diff / matching as f64 } else { 0.0 };

    config.excess_coefficient * excess as f64 / n
        + config.disjoint_coefficient * disjoint as f64 / n
        + config.weight_coefficient * mean_weight_diff
}
