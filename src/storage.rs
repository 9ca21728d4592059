use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;

use crate::error::SimError;
use crate::particle::Particle;

/// Dense per-iteration position history plus the per-particle masses.
///
/// Frame 0 is the initial state; frame `k + 1` holds the positions emitted
/// by iteration `k`. Positions stay `f64` in memory and are truncated to
/// `f32` when the playback file is written; masses are truncated on
/// registration, matching the playback consumer's precision.
#[derive(Clone, Debug)]
pub struct PositionStore {
    dt: f64,
    masses: Vec<f32>,
    frames: Vec<Vec<Vector3<f64>>>,
}

impl PositionStore {
    #[must_use]
    pub fn new(n: usize, dt: f64, num_iterations: usize) -> Self {
        Self {
            dt,
            masses: vec![0.0; n],
            frames: vec![vec![Vector3::zeros(); n]; num_iterations + 1],
        }
    }

    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.masses.len()
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn add_mass(&mut self, id: usize, mass: f64) -> Result<(), SimError> {
        let limit = self.masses.len();
        let slot = self.masses.get_mut(id).ok_or(SimError::IdOutOfRange {
            what: "particle",
            id,
            limit,
        })?;
        *slot = mass as f32;
        Ok(())
    }

    pub fn set_position(
        &mut self,
        frame: usize,
        id: usize,
        position: Vector3<f64>,
    ) -> Result<(), SimError> {
        let frames = self.frames.len();
        let frame_slots = self.frames.get_mut(frame).ok_or(SimError::IdOutOfRange {
            what: "frame",
            id: frame,
            limit: frames,
        })?;

        let limit = frame_slots.len();
        let slot = frame_slots.get_mut(id).ok_or(SimError::IdOutOfRange {
            what: "particle",
            id,
            limit,
        })?;
        *slot = position;
        Ok(())
    }

    #[must_use]
    pub fn frame(&self, frame: usize) -> Option<&[Vector3<f64>]> {
        self.frames.get(frame).map(Vec::as_slice)
    }

    /// Record every particle's current position into `frame`, keyed by id.
    pub fn fill_frame(&mut self, frame: usize, particles: &[Particle]) -> Result<(), SimError> {
        for particle in particles {
            self.set_position(frame, particle.id, particle.position)?;
        }
        Ok(())
    }

    /// Dump the playback file: N (u64), dt (f64), N f32 masses, then every
    /// frame as N f32 triples, all little-endian.
    ///
    /// The file is assembled at a sibling temporary path and renamed into
    /// place on success, so a failed run never leaves a truncated file
    /// under the final name.
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let path = path.as_ref();
        let staging = path.with_extension("tmp");

        if let Err(err) = self.write_frames(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        fs::rename(&staging, path)?;

        Ok(())
    }

    fn write_frames(&self, path: &Path) -> Result<(), SimError> {
        let mut file = BufWriter::new(fs::File::create(path)?);

        file.write_all(&(self.masses.len() as u64).to_le_bytes())?;
        file.write_all(&self.dt.to_le_bytes())?;

        for mass in &self.masses {
            file.write_all(&mass.to_le_bytes())?;
        }

        for frame in &self.frames {
            for position in frame {
                for coordinate in position.iter() {
                    file.write_all(&(*coordinate as f32).to_le_bytes())?;
                }
            }
        }

        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_one_more_frame_than_iterations() {
        let store = PositionStore::new(4, 0.5, 10);

        assert_eq!(store.particle_count(), 4);
        assert_eq!(store.frame_count(), 11);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let mut store = PositionStore::new(2, 1.0, 1);

        assert!(matches!(
            store.add_mass(2, 1.0),
            Err(SimError::IdOutOfRange { id: 2, limit: 2, .. })
        ));
        assert!(matches!(
            store.set_position(2, 0, Vector3::zeros()),
            Err(SimError::IdOutOfRange { id: 2, limit: 2, .. })
        ));
        assert!(matches!(
            store.set_position(0, 5, Vector3::zeros()),
            Err(SimError::IdOutOfRange { id: 5, limit: 2, .. })
        ));
    }

    #[test]
    fn positions_round_trip_by_frame_and_id() {
        let mut store = PositionStore::new(3, 1.0, 2);

        store.set_position(1, 2, Vector3::new(1.0, 2.0, 3.0)).unwrap();

        assert_eq!(store.frame(1).unwrap()[2], Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(store.frame(0).unwrap()[2], Vector3::zeros());
        assert!(store.frame(3).is_none());
    }

    #[test]
    fn binary_dump_has_the_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.bin");

        let mut store = PositionStore::new(2, 0.25, 1);
        store.add_mass(0, 3.0).unwrap();
        store.add_mass(1, 5.0).unwrap();
        store.set_position(0, 0, Vector3::new(1.0, 2.0, 3.0)).unwrap();
        store.set_position(1, 1, Vector3::new(-1.0, -2.0, -3.0)).unwrap();

        store.write_binary(&path).unwrap();

        let bytes = fs::read(&path).unwrap();
        // header + masses + 2 frames of 2 triples
        assert_eq!(bytes.len(), 8 + 8 + 2 * 4 + 2 * 2 * 3 * 4);

        assert_eq!(u64::from_le_bytes(bytes[0..8].try_into().unwrap()), 2);
        assert_eq!(f64::from_le_bytes(bytes[8..16].try_into().unwrap()), 0.25);
        assert_eq!(f32::from_le_bytes(bytes[16..20].try_into().unwrap()), 3.0);
        assert_eq!(f32::from_le_bytes(bytes[20..24].try_into().unwrap()), 5.0);

        // frame 0, particle 0
        assert_eq!(f32::from_le_bytes(bytes[24..28].try_into().unwrap()), 1.0);
        // frame 1, particle 1, z coordinate (last value)
        let tail = bytes.len() - 4;
        assert_eq!(
            f32::from_le_bytes(bytes[tail..].try_into().unwrap()),
            -3.0
        );

        // no staging file left behind
        assert!(!dir.path().join("playback.tmp").exists());
    }
}
