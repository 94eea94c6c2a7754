use super::genome::Genome;
use super::operators::compatibility_distance;
use crate::config::EvolutionConfig;
use rand::Rng;

pub type SpeciesId = usize;

/// Genomes within `compatibility_threshold` of a representative
#[derive(Debug, Clone)]
pub struct Species {
    pub id: SpeciesId,
    pub representative: Genome,
    /// Indices into the current population
    pub members: Vec<usize>,
}

impl Species {
    /// Mean of the members' scores under `score`; fitness sharing
    pub fn shared_fitness(&self, score: &[f64]) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|&i| score[i]).sum::<f64>() / self.members.len() as f64
    }
}

/// Assigns every genome to the first compatible species, opening new species
/// as needed, drops species left empty and picks fresh representatives.
pub fn speciate<R: Rng>(
    population: &mut [Genome],
    species: &mut Vec<Species>,
    next_id: &mut SpeciesId,
    config: &EvolutionConfig,
    rng: &mut R,
) {
    for s in species.iter_mut() {
        s.members.clear();
    }

    for (index, genome) in population.iter_mut().enumerate() {
        let found = species
            .iter_mut()
            .find(|s| compatibility_distance(genome, &s.representative, config) < config.compatibility_threshold);
        let id = match found {
            Some(s) => {
                s.members.push(index);
                s.id
            }
            None => {
                let id = *next_id;
                *next_id += 1;
                species.push(Species {
                    id,
                    representative: genome.clone(),
                    members: vec![index],
                });
                id
            }
        };
        genome.species = Some(id);
    }

    species.retain(|s| !s.members.is_empty());
    for s in species.iter_mut() {
        let pick = s.members[rng.gen_range(0..s.members.len())];
        s.representative = population[pick].clone();
    }
}
