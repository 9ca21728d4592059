use nalgebra::Vector3;

/// A simulated body.
///
/// Ids are dense `0..N-1` and assigned by the particle source; the octree
/// only ever borrows particles by index, so the driver keeps exclusive
/// ownership of the slice for the lifetime of the simulation.
#[derive(Clone, Debug)]
pub struct Particle {
    pub id: usize,
    pub mass: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    /// Force accumulated by the tree walk, zeroed after every
    /// integration step.
    pub force: Vector3<f64>,
}

impl Particle {
    #[must_use]
    pub fn new(id: usize, mass: f64, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            id,
            mass,
            position,
            velocity,
            acceleration: Vector3::zeros(),
            force: Vector3::zeros(),
        }
    }

    /// The particle viewed as a bare mass at a point.
    #[must_use]
    pub fn point_mass(&self) -> PointMass {
        PointMass::new(self.mass, self.position)
    }
}

/// Aggregate stand-in for every particle below a subtree: the total mass
/// placed at the center of mass.
#[derive(Clone, Copy, Debug)]
pub struct PointMass {
    pub mass: f64,
    pub position: Vector3<f64>,
}

impl PointMass {
    #[must_use]
    pub fn new(mass: f64, position: Vector3<f64>) -> Self {
        Self { mass, position }
    }
}
