//! Restart snapshots of the adapter bookkeeping.
//!
//! A snapshot records the step counter, the current frame, the bias energy
//! accumulated so far and the full atom-slot table, including reference counts
//! of released slots, so that slot indices handed out before a restart remain
//! valid after it.
//!
//! # Snapshot Format
//!
//! Snapshots are JSON files. Since `nalgebra` vectors don't serialize
//! directly, every vector is stored as a plain `[x, y, z]` array.
//!
//! ```no_run
//! use cvproxy::atoms::AtomSlots;
//! use cvproxy::checkpoint::Checkpoint;
//! use std::path::Path;
//!
//! let slots = AtomSlots::new();
//! Checkpoint::new(100, Some(3), -12.5, &slots).save(Path::new("run.cvproxy.json"))?;
//! let restored = Checkpoint::load(Path::new("run.cvproxy.json"))?;
//! assert_eq!(restored.step, 100);
//! # Ok::<(), cvproxy::error::ProxyError>(())
//! ```

use crate::atoms::{AtomSlots, SlotRecord};
use crate::error::{ProxyError, ProxyResult};
use crate::types::RVector;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serializable form of one atom slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableSlot {
    /// Host identifier
    pub id: usize,
    /// Reference count
    pub ncopies: usize,
    /// Mass
    pub mass: f64,
    /// Position
    pub position: [f64; 3],
    /// Most recent total force
    pub total_force: [f64; 3],
    /// Most recent applied force
    pub applied_force: [f64; 3],
    /// Pending colvar force
    pub colvar_force: [f64; 3],
}

fn to_array(v: &RVector) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn from_array(a: [f64; 3]) -> RVector {
    RVector::new(a[0], a[1], a[2])
}

impl From<&SlotRecord> for SerializableSlot {
    fn from(r: &SlotRecord) -> Self {
        Self {
            id: r.id,
            ncopies: r.ncopies,
            mass: r.mass,
            position: to_array(&r.position),
            total_force: to_array(&r.total_force),
            applied_force: to_array(&r.applied_force),
            colvar_force: to_array(&r.colvar_force),
        }
    }
}

impl From<SerializableSlot> for SlotRecord {
    fn from(s: SerializableSlot) -> Self {
        Self {
            id: s.id,
            ncopies: s.ncopies,
            mass: s.mass,
            position: from_array(s.position),
            total_force: from_array(s.total_force),
            applied_force: from_array(s.applied_force),
            colvar_force: from_array(s.colvar_force),
        }
    }
}

/// Restart snapshot of an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of completed steps
    pub step: u64,
    /// Current frame, for hosts with frame addressing
    pub frame: Option<usize>,
    /// Bias energy accumulated over the run
    pub total_energy: f64,
    /// Atom slot table in slot order
    pub slots: Vec<SerializableSlot>,
}

impl Checkpoint {
    /// Captures a snapshot.
    pub fn new(step: u64, frame: Option<usize>, total_energy: f64, atoms: &AtomSlots) -> Self {
        Self {
            step,
            frame,
            total_energy,
            slots: atoms.records().iter().map(SerializableSlot::from).collect(),
        }
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> ProxyResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ProxyError::Parse(format!("cannot serialize checkpoint: {}", e)))?;
        fs::write(path, json).map_err(|source| ProxyError::File {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Wrote checkpoint for step {} to {}", self.step, path.display());
        Ok(())
    }

    /// Reads a snapshot written by [`Checkpoint::save`].
    pub fn load(path: &Path) -> ProxyResult<Self> {
        let content = fs::read_to_string(path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&content).map_err(|e| {
            ProxyError::Parse(format!("invalid checkpoint {}: {}", path.display(), e))
        })?;
        Ok(checkpoint)
    }

    /// Rebuilds the atom slot table.
    pub fn atoms(&self) -> AtomSlots {
        AtomSlots::from_records(self.slots.iter().cloned().map(SlotRecord::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_preserves_slots() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("restart.json");

        let mut slots = AtomSlots::new();
        let a = slots.add_atom_slot(4);
        let b = slots.add_atom_slot(9);
        slots.set_position(a, RVector::new(1.0, 2.0, 3.0));
        slots.apply_force(b, &RVector::new(0.5, 0.0, -0.5));
        slots.clear_atom(a).unwrap();

        Checkpoint::new(250, Some(2), -3.25, &slots).save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.step, 250);
        assert_eq!(loaded.frame, Some(2));

        let restored = loaded.atoms();
        assert!(restored.is_consistent());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.ncopies(a), 0);
        assert_eq!(restored.position(a), RVector::new(1.0, 2.0, 3.0));
        assert_eq!(restored.colvar_force(b), RVector::new(0.5, 0.0, -0.5));
    }

    #[test]
    fn test_load_garbage_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(Checkpoint::load(&path), Err(ProxyError::Parse(_))));
    }
}
