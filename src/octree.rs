use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::bounds::{compute_bounding_box, BoundingBox};
use crate::error::SimError;
use crate::particle::{Particle, PointMass};

/// Index of a node in the tree arena.
pub type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

/// Child visit order during leaf-list construction. Fixed so the leaf list
/// comes out in the same order for identical inputs.
const LEAF_WALK_ORDER: [usize; 8] = [6, 7, 5, 4, 2, 3, 1, 0];

/// Populations above this use the two-pass bulk partition instead of
/// task-based recursion.
const BULK_THRESHOLD: usize = 50_000;

pub const DEFAULT_MAX_POINTS_PER_NODE: usize = 5;
pub const DEFAULT_BULK_PARTITION_THRESHOLD: usize = 5_000;

/// Construction knobs for [`Octree::build`].
#[derive(Clone, Copy, Debug)]
pub struct TreeConfig {
    pub parallel: bool,
    /// Leaf capacity; the simulation driver uses 1 so every leaf holds a
    /// single particle.
    pub max_points_per_node: usize,
    /// Populations at or below this are handled by serial insertion.
    pub bulk_partition_threshold: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_points_per_node: DEFAULT_MAX_POINTS_PER_NODE,
            bulk_partition_threshold: DEFAULT_BULK_PARTITION_THRESHOLD,
        }
    }
}

/// One cell of the octree.
///
/// Leaves (all child slots empty) hold indices into the particle slice the
/// tree was built over. Interior nodes hold one aggregate slot per
/// non-empty child, which the reduction pass fills bottom-up.
#[derive(Debug)]
pub struct Node {
    pub(crate) bounds: BoundingBox,
    pub(crate) children: [Option<NodeId>; 8],
    pub(crate) particles: Vec<usize>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) slots: Vec<OnceLock<PointMass>>,
    pub(crate) aggregate: OnceLock<PointMass>,
}

impl Node {
    fn with_bounds(bounds: BoundingBox, parent: Option<NodeId>) -> Self {
        Self {
            bounds,
            children: [None; 8],
            particles: Vec::new(),
            parent,
            slots: Vec::new(),
            aggregate: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Indices of the particles held by this leaf.
    #[must_use]
    pub fn particles(&self) -> &[usize] {
        &self.particles
    }

    #[must_use]
    pub fn child(&self, octant: usize) -> Option<NodeId> {
        self.children[octant]
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Aggregate body of the subtree; `None` until the reduction pass ran.
    #[must_use]
    pub fn aggregate(&self) -> Option<&PointMass> {
        self.aggregate.get()
    }

    pub(crate) fn occupied(&self) -> usize {
        self.children.iter().filter(|c| c.is_some()).count()
    }
}

/// Pointer-free Barnes-Hut octree over a borrowed particle slice.
///
/// Nodes live in one arena and refer to each other by index, which keeps
/// parent back-references trivially non-owning and makes teardown a single
/// deallocation. The tree is rebuilt from scratch every simulation step.
#[derive(Debug)]
pub struct Octree<'a> {
    particles: &'a [Particle],
    nodes: Vec<Node>,
    leaves: Vec<NodeId>,
}

impl<'a> Octree<'a> {
    /// Build the tree and its leaf list.
    ///
    /// Every input particle ends up in exactly one leaf, every leaf holds
    /// `1..=max_points_per_node` particles, and every child box is a strict
    /// halving of its parent. Fails with [`SimError::EmptyInput`] for an
    /// empty slice.
    pub fn build(particles: &'a [Particle], config: &TreeConfig) -> Result<Self, SimError> {
        let bounds = compute_bounding_box(particles, config.parallel)?;
        let mut nodes = vec![Node::with_bounds(bounds, None)];

        if config.parallel {
            let indices: Vec<usize> = (0..particles.len()).collect();
            build_into(&mut nodes, ROOT, particles, &indices, config);
        } else {
            for index in 0..particles.len() {
                insert(&mut nodes, ROOT, particles, index, config.max_points_per_node);
            }
        }

        let mut tree = Self {
            particles,
            nodes,
            leaves: Vec::new(),
        };
        tree.prepare_aggregate_slots(config.parallel);
        tree.leaves = tree.collect_leaves(config.parallel);

        Ok(tree)
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.nodes[ROOT]
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Leaf ids in deterministic traversal order.
    #[must_use]
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// The particle slice this tree was built over.
    #[must_use]
    pub fn particles(&self) -> &'a [Particle] {
        self.particles
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Size every interior node's aggregate-slot vector to its non-empty
    /// child count. The empty locks are the "not yet reduced" sentinels the
    /// reduction pass keys on.
    fn prepare_aggregate_slots(&mut self, parallel: bool) {
        let prepare = |node: &mut Node| {
            let occupied = node.occupied();
            if occupied > 0 {
                node.slots = std::iter::repeat_with(OnceLock::new).take(occupied).collect();
            }
        };

        if parallel {
            self.nodes.par_iter_mut().for_each(prepare);
        } else {
            self.nodes.iter_mut().for_each(prepare);
        }
    }

    fn collect_leaves(&self, parallel: bool) -> Vec<NodeId> {
        if !parallel {
            let mut leaves = Vec::new();
            self.leaves_below(ROOT, &mut leaves);
            return leaves;
        }

        // Expand breadth-first until there are roughly eight work items per
        // worker. Replacing each interior node in place by its children (in
        // walk order) keeps the frontier in depth-first order, so the
        // concatenation below reproduces the serial traversal exactly.
        let target = 8 * rayon::current_num_threads();
        let mut frontier = vec![ROOT];
        while frontier.len() < target {
            let mut next = Vec::with_capacity(frontier.len() * 8);
            let mut expanded = false;

            for &id in &frontier {
                if self.nodes[id].is_leaf() {
                    next.push(id);
                } else {
                    expanded = true;
                    for &octant in &LEAF_WALK_ORDER {
                        if let Some(child) = self.nodes[id].children[octant] {
                            next.push(child);
                        }
                    }
                }
            }

            frontier = next;
            if !expanded {
                break;
            }
        }

        let buffers: Vec<Vec<NodeId>> = frontier
            .par_iter()
            .map(|&id| {
                let mut local = Vec::new();
                self.leaves_below(id, &mut local);
                local
            })
            .collect();

        buffers.concat()
    }

    fn leaves_below(&self, id: NodeId, leaves: &mut Vec<NodeId>) {
        let node = &self.nodes[id];

        if node.is_leaf() {
            leaves.push(id);
            return;
        }

        for &octant in &LEAF_WALK_ORDER {
            if let Some(child) = node.children[octant] {
                self.leaves_below(child, leaves);
            }
        }
    }
}

/// Child of `id` covering `position`, allocated on first touch with the
/// derived sub-box and parent back-reference.
fn child_for(nodes: &mut Vec<Node>, id: NodeId, position: &Vector3<f64>) -> NodeId {
    let octant = nodes[id].bounds.octant_of(position);

    if let Some(child) = nodes[id].children[octant] {
        return child;
    }

    let bounds = nodes[id].bounds.child(octant);
    let child = nodes.len();
    nodes.push(Node::with_bounds(bounds, Some(id)));
    nodes[id].children[octant] = Some(child);

    child
}

/// Serial insertion of one particle below `target`.
fn insert(
    nodes: &mut Vec<Node>,
    target: NodeId,
    particles: &[Particle],
    index: usize,
    max_points: usize,
) {
    if nodes[target].is_leaf() && nodes[target].particles.len() >= max_points {
        // full leaf: push every held particle one level down
        let held = std::mem::take(&mut nodes[target].particles);
        for held_index in held {
            let child = child_for(nodes, target, &particles[held_index].position);
            insert(nodes, child, particles, held_index, max_points);
        }
    }

    if nodes[target].is_leaf() {
        nodes[target].particles.push(index);
    } else {
        let child = child_for(nodes, target, &particles[index].position);
        insert(nodes, child, particles, index, max_points);
    }
}

enum Partition {
    Leaf(Vec<usize>),
    Subtree(Vec<Node>),
}

/// Recursive dispatch of the hybrid build strategy for one node.
///
/// Small populations fall back to serial insertion; medium ones are split
/// with a single counting pass and cursor scatter; very large ones go
/// through the bulk two-pass partition. Children built in parallel come
/// back as detached sub-arenas and are grafted in octant order.
fn build_into(
    nodes: &mut Vec<Node>,
    target: NodeId,
    particles: &[Particle],
    indices: &[usize],
    config: &TreeConfig,
) {
    let n = indices.len();

    if n <= config.max_points_per_node {
        nodes[target].particles = indices.to_vec();
        return;
    }

    if n <= config.bulk_partition_threshold {
        for &index in indices {
            insert(nodes, target, particles, index, config.max_points_per_node);
        }
        return;
    }

    let bounds = nodes[target].bounds;
    let buckets = if n <= BULK_THRESHOLD {
        task_partition(particles, indices, &bounds)
    } else {
        bulk_partition(particles, indices, &bounds)
    };

    let subtrees: Vec<Option<Partition>> = buckets
        .into_par_iter()
        .enumerate()
        .map(|(octant, bucket)| {
            if bucket.is_empty() {
                None
            } else if bucket.len() <= config.max_points_per_node {
                Some(Partition::Leaf(bucket))
            } else {
                Some(Partition::Subtree(build_subtree(
                    particles,
                    &bucket,
                    bounds.child(octant),
                    config,
                )))
            }
        })
        .collect();

    for (octant, subtree) in subtrees.into_iter().enumerate() {
        match subtree {
            None => {}
            Some(Partition::Leaf(bucket)) => {
                let child = nodes.len();
                let mut node = Node::with_bounds(bounds.child(octant), Some(target));
                node.particles = bucket;
                nodes.push(node);
                nodes[target].children[octant] = Some(child);
            }
            Some(Partition::Subtree(sub)) => graft(nodes, target, octant, sub),
        }
    }
}

/// Build a detached subtree over `indices` in its own arena.
fn build_subtree(
    particles: &[Particle],
    indices: &[usize],
    bounds: BoundingBox,
    config: &TreeConfig,
) -> Vec<Node> {
    let mut nodes = vec![Node::with_bounds(bounds, None)];
    build_into(&mut nodes, ROOT, particles, indices, config);
    nodes
}

/// Splice a sub-arena into `nodes` as child `octant` of `parent`, rebasing
/// every index it carries.
fn graft(nodes: &mut Vec<Node>, parent: NodeId, octant: usize, sub: Vec<Node>) {
    let offset = nodes.len();

    nodes.extend(sub.into_iter().map(|mut node| {
        for child in node.children.iter_mut().flatten() {
            *child += offset;
        }
        if let Some(p) = node.parent.as_mut() {
            *p += offset;
        }
        node
    }));

    nodes[offset].parent = Some(parent);
    nodes[parent].children[octant] = Some(offset);
}

/// One counting pass plus a cursor scatter into pre-sized buckets. Low
/// constant overhead for medium populations.
fn task_partition(
    particles: &[Particle],
    indices: &[usize],
    bounds: &BoundingBox,
) -> [Vec<usize>; 8] {
    let mut counts = [0usize; 8];
    for &index in indices {
        counts[bounds.octant_of(&particles[index].position)] += 1;
    }

    let mut buckets: [Vec<usize>; 8] =
        std::array::from_fn(|octant| Vec::with_capacity(counts[octant]));
    for &index in indices {
        buckets[bounds.octant_of(&particles[index].position)].push(index);
    }

    buckets
}

/// Two linear passes over the population: a parallel occupancy count with a
/// prefix sum for the write offsets, then a scatter through eight per-octant
/// atomic cursors into a single staging buffer. Removes per-particle
/// allocation from the hot path of very large nodes.
fn bulk_partition(
    particles: &[Particle],
    indices: &[usize],
    bounds: &BoundingBox,
) -> [Vec<usize>; 8] {
    let counts = indices
        .par_iter()
        .fold(
            || [0usize; 8],
            |mut counts, &index| {
                counts[bounds.octant_of(&particles[index].position)] += 1;
                counts
            },
        )
        .reduce(
            || [0usize; 8],
            |mut a, b| {
                for (a, b) in a.iter_mut().zip(b) {
                    *a += b;
                }
                a
            },
        );

    let mut offsets = [0usize; 8];
    for octant in 1..8 {
        offsets[octant] = offsets[octant - 1] + counts[octant - 1];
    }

    let staging: Vec<AtomicUsize> = (0..indices.len()).map(|_| AtomicUsize::new(0)).collect();
    let cursors: [AtomicUsize; 8] = std::array::from_fn(|octant| AtomicUsize::new(offsets[octant]));

    indices.par_iter().for_each(|&index| {
        let octant = bounds.octant_of(&particles[index].position);
        let at = cursors[octant].fetch_add(1, Ordering::Relaxed);
        staging[at].store(index, Ordering::Relaxed);
    });

    std::array::from_fn(|octant| {
        let start = offsets[octant];
        let end = start + counts[octant];
        staging[start..end]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect()
    })
}
