use nalgebra::Vector3;
use rayon::prelude::*;

use crate::gravity;
use crate::octree::{Node, NodeId, Octree, ROOT};
use crate::particle::{Particle, PointMass};

#[cfg(debug_assertions)]
macro_rules! unreachable_debug {
    ($arg:expr) => {
        unreachable!($arg)
    };
}

#[cfg(not(debug_assertions))]
macro_rules! unreachable_debug {
    ($arg:tt) => {
        ()
    };
}

/// Knobs of the force evaluation.
#[derive(Clone, Copy, Debug)]
pub struct ForceParameters {
    /// Opening angle of the acceptance criterion `s/d < theta`.
    pub theta: f64,
    /// Softening added to pairwise distances.
    pub softening: f64,
    pub gravitational_constant: f64,
}

/// Fill every node's aggregate bottom-up, starting from the leaf list.
///
/// Each wavefront round processes the working set in parallel. A node
/// publishes its aggregate into its parent's flattened slot through a
/// `OnceLock`, so distinct children never contend for the same write; the
/// child owning the first occupied slot is the one that enqueues the
/// parent. An interior node whose slots are not all populated yet defers
/// itself into the next round.
pub fn reduce(tree: &Octree<'_>) {
    let mut working: Vec<NodeId> = tree.leaves().to_vec();

    while !working.is_empty() {
        working = working
            .par_iter()
            .fold(Vec::new, |mut next, &id| {
                visit(tree, id, &mut next);
                next
            })
            .reduce(Vec::new, |mut a, mut b| {
                a.append(&mut b);
                a
            });
    }
}

/// One wavefront visit: compute the aggregate if the inputs are ready,
/// publish it upward, and elect the parent's next-round entry.
fn visit(tree: &Octree<'_>, id: NodeId, next: &mut Vec<NodeId>) {
    let node = tree.node(id);

    let aggregate = if node.is_leaf() {
        let mut weighted = Vector3::zeros();
        let mut mass = 0.0;
        for &index in node.particles() {
            let particle = &tree.particles()[index];
            weighted += particle.position * particle.mass;
            mass += particle.mass;
        }
        PointMass::new(mass, weighted / mass)
    } else {
        let mut weighted = Vector3::zeros();
        let mut mass = 0.0;
        for slot in &node.slots {
            match slot.get() {
                Some(child) => {
                    weighted += child.position * child.mass;
                    mass += child.mass;
                }
                // a child has not reported yet: try again next round
                None => {
                    next.push(id);
                    return;
                }
            }
        }
        PointMass::new(mass, weighted / mass)
    };

    if node.aggregate.set(aggregate).is_err() {
        unreachable_debug!("node aggregate published twice");
    }

    if let Some(parent_id) = node.parent {
        let parent = tree.node(parent_id);
        let octant = parent
            .children
            .iter()
            .position(|&child| child == Some(id))
            .expect("node missing from its parent's child slots");
        let flattened = parent.children[..=octant].iter().flatten().count() - 1;

        if parent.slots[flattened].set(aggregate).is_err() {
            unreachable_debug!("parent slot published twice");
        }

        // exactly one child enqueues the parent
        if flattened == 0 {
            next.push(parent_id);
        }
    }
}

/// Barnes-Hut force on every particle, indexed like the particle slice.
///
/// The tree is read-only here; forces are committed to the particles by
/// the driver once the walk has finished and the tree borrow ends.
#[must_use]
pub fn evaluate(
    tree: &Octree<'_>,
    parameters: &ForceParameters,
    parallel: bool,
) -> Vec<Vector3<f64>> {
    let force_on = |probe: &Particle| {
        let mut force = Vector3::zeros();
        accumulate(tree, probe, ROOT, parameters, &mut force);
        force
    };

    if parallel {
        tree.particles().par_iter().map(force_on).collect()
    } else {
        tree.particles().iter().map(force_on).collect()
    }
}

fn accepts(node: &Node, probe: &Particle, theta: f64) -> bool {
    let Some(aggregate) = node.aggregate() else {
        return false;
    };
    let distance = (probe.position - aggregate.position).norm();

    node.bounds().side() / distance < theta
}

fn accumulate(
    tree: &Octree<'_>,
    probe: &Particle,
    id: NodeId,
    parameters: &ForceParameters,
    force: &mut Vector3<f64>,
) {
    let node = tree.node(id);

    if !node.bounds().contains(&probe.position) && accepts(node, probe, parameters.theta) {
        if node.is_leaf() {
            for &index in node.particles() {
                *force += gravity::force(
                    probe,
                    &tree.particles()[index].point_mass(),
                    parameters.softening,
                    parameters.gravitational_constant,
                );
            }
        } else {
            // far enough away: the whole subtree acts as one body
            match node.aggregate() {
                Some(aggregate) => {
                    *force += gravity::force(
                        probe,
                        aggregate,
                        parameters.softening,
                        parameters.gravitational_constant,
                    );
                }
                None => unreachable_debug!("force walk over a tree without aggregates"),
            }
        }
        return;
    }

    if node.is_leaf() {
        // the probe shares this cell: exact pairwise with everything else
        for &index in node.particles() {
            let other = &tree.particles()[index];
            if other.id != probe.id {
                *force += gravity::force(
                    probe,
                    &other.point_mass(),
                    parameters.softening,
                    parameters.gravitational_constant,
                );
            }
        }
    } else {
        for &child in node.children.iter().flatten() {
            accumulate(tree, probe, child, parameters, force);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::octree::TreeConfig;

    fn parameters() -> ForceParameters {
        ForceParameters {
            theta: 0.5,
            softening: 1e-8,
            gravitational_constant: gravity::G,
        }
    }

    fn random_particles(count: usize, seed: u64) -> Vec<Particle> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|id| {
                Particle::new(
                    id,
                    rng.gen_range(1.0..100.0),
                    Vector3::new(
                        rng.gen_range(-50.0..50.0),
                        rng.gen_range(-50.0..50.0),
                        rng.gen_range(-50.0..50.0),
                    ),
                    Vector3::zeros(),
                )
            })
            .collect()
    }

    fn direct_forces(particles: &[Particle], parameters: &ForceParameters) -> Vec<Vector3<f64>> {
        particles
            .iter()
            .map(|probe| {
                let mut force = Vector3::zeros();
                for other in particles {
                    if other.id != probe.id {
                        force += gravity::force(
                            probe,
                            &other.point_mass(),
                            parameters.softening,
                            parameters.gravitational_constant,
                        );
                    }
                }
                force
            })
            .collect()
    }

    fn subtree_indices(tree: &Octree<'_>, id: NodeId, indices: &mut Vec<usize>) {
        let node = tree.node(id);
        indices.extend_from_slice(node.particles());
        for &child in node.children.iter().flatten() {
            subtree_indices(tree, child, indices);
        }
    }

    #[test]
    fn reduction_matches_direct_mass_weighted_sums() {
        let particles = random_particles(500, 21);
        let config = TreeConfig {
            parallel: true,
            max_points_per_node: 1,
            bulk_partition_threshold: 100,
        };
        let tree = Octree::build(&particles, &config).unwrap();

        reduce(&tree);

        for id in 0..tree.node_count() {
            let node = tree.node(id);
            let aggregate = node.aggregate().expect("aggregate missing after reduction");

            let mut indices = Vec::new();
            subtree_indices(&tree, id, &mut indices);

            let mass: f64 = indices.iter().map(|&i| particles[i].mass).sum();
            let weighted: Vector3<f64> = indices
                .iter()
                .map(|&i| particles[i].position * particles[i].mass)
                .sum();

            assert_abs_diff_eq!(aggregate.mass, mass, epsilon = 1e-9 * mass);
            assert_abs_diff_eq!(
                aggregate.position * aggregate.mass,
                weighted,
                epsilon = 1e-6 * weighted.norm().max(1.0)
            );
        }
    }

    #[test]
    fn every_parent_slot_is_filled_by_its_child() {
        let particles = random_particles(300, 5);
        let config = TreeConfig {
            max_points_per_node: 2,
            ..TreeConfig::default()
        };
        let tree = Octree::build(&particles, &config).unwrap();

        reduce(&tree);

        for id in 0..tree.node_count() {
            let node = tree.node(id);
            if node.is_leaf() {
                continue;
            }

            let mut flattened = 0;
            for &child in node.children.iter().flatten() {
                let slot = node.slots[flattened].get().expect("slot never written");
                let child_aggregate = tree.node(child).aggregate().unwrap();
                assert_abs_diff_eq!(slot.mass, child_aggregate.mass);
                assert_abs_diff_eq!(slot.position, child_aggregate.position);
                flattened += 1;
            }
        }
    }

    #[test]
    fn pairwise_contributions_are_equal_and_opposite() {
        let particles = vec![
            Particle::new(0, 1e6, Vector3::new(1.0, 0.0, 0.0), Vector3::zeros()),
            Particle::new(1, 3e6, Vector3::new(-1.0, 0.0, 0.0), Vector3::zeros()),
        ];
        let config = TreeConfig {
            max_points_per_node: 5,
            ..TreeConfig::default()
        };
        let tree = Octree::build(&particles, &config).unwrap();
        reduce(&tree);

        let forces = evaluate(&tree, &parameters(), false);

        assert_abs_diff_eq!(forces[0], -forces[1], epsilon = 1e-12);
    }

    #[test]
    fn two_bodies_attract() {
        let particles = vec![
            Particle::new(0, 1e10, Vector3::new(-1.0, 0.0, 0.0), Vector3::zeros()),
            Particle::new(1, 1e10, Vector3::new(1.0, 0.0, 0.0), Vector3::zeros()),
        ];
        let config = TreeConfig {
            max_points_per_node: 1,
            ..TreeConfig::default()
        };
        let tree = Octree::build(&particles, &config).unwrap();
        reduce(&tree);

        let forces = evaluate(&tree, &parameters(), false);

        assert!(forces[0].x > 0.0, "left body must be pulled right");
        assert!(forces[1].x < 0.0, "right body must be pulled left");
    }

    #[test]
    fn closed_walk_matches_direct_summation() {
        let particles = random_particles(60, 13);
        let config = TreeConfig {
            max_points_per_node: 1,
            ..TreeConfig::default()
        };
        let tree = Octree::build(&particles, &config).unwrap();
        reduce(&tree);

        // theta = 0 never accepts an aggregate, so the walk degenerates to
        // the exact pairwise sum
        let exact = ForceParameters {
            theta: 0.0,
            ..parameters()
        };
        let walked = evaluate(&tree, &exact, false);
        let direct = direct_forces(&particles, &exact);

        for (w, d) in walked.iter().zip(&direct) {
            assert_abs_diff_eq!(*w, *d, epsilon = 1e-20 + 1e-9 * d.norm());
        }
    }

    #[test]
    fn parallel_evaluation_matches_serial() {
        let particles = random_particles(200, 17);
        let config = TreeConfig {
            parallel: true,
            max_points_per_node: 1,
            ..TreeConfig::default()
        };
        let tree = Octree::build(&particles, &config).unwrap();
        reduce(&tree);

        let serial = evaluate(&tree, &parameters(), false);
        let parallel = evaluate(&tree, &parameters(), true);

        for (s, p) in serial.iter().zip(&parallel) {
            assert_abs_diff_eq!(*s, *p);
        }
    }
}
