//! Per-atom bookkeeping shared between the colvar module and its host.
//!
//! [`AtomSlots`] stores the atoms requested by collective variables as a set of
//! parallel arrays. Each request appends one slot; releasing a slot only
//! decrements its reference count, so indices handed out earlier stay valid for
//! the whole run and the arrays are never compacted.
//!
//! # Slot layout
//!
//! | array | meaning | initial value |
//! |-------|---------|---------------|
//! | `ids` | host identifier (0-based) | given |
//! | `ncopies` | colvar components referencing the slot | 1 |
//! | `masses` | atom mass | 1.0 |
//! | `positions` | current position | zero |
//! | `total_forces` | most recent total force | zero |
//! | `applied_forces` | most recent externally applied force | zero |
//! | `colvar_forces` | forces requested by the colvar module | zero |
//!
//! All arrays have the same length after every operation.

use crate::error::{ProxyError, ProxyResult};
use crate::types::{zero, AtomPos, RVector};

/// Reference-counted atom slots stored as parallel arrays.
#[derive(Debug, Clone, Default)]
pub struct AtomSlots {
    ids: Vec<usize>,
    ncopies: Vec<usize>,
    masses: Vec<f64>,
    positions: Vec<AtomPos>,
    total_forces: Vec<RVector>,
    applied_forces: Vec<RVector>,
    colvar_forces: Vec<RVector>,
}

impl AtomSlots {
    /// Creates an empty slot table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot for `atom_id` and returns its index.
    ///
    /// A new slot is created even when `atom_id` already owns one; hosts that
    /// want to share slots look them up with [`AtomSlots::find`] first.
    pub fn add_atom_slot(&mut self, atom_id: usize) -> usize {
        self.ids.push(atom_id);
        self.ncopies.push(1);
        self.masses.push(1.0);
        self.positions.push(zero());
        self.total_forces.push(zero());
        self.applied_forces.push(zero());
        self.colvar_forces.push(zero());
        self.ids.len() - 1
    }

    /// Releases one reference to the slot at `index`.
    ///
    /// The reference count saturates at zero. An index that was never handed
    /// out is rejected without touching any array.
    pub fn clear_atom(&mut self, index: usize) -> ProxyResult<()> {
        if index >= self.ids.len() {
            return Err(ProxyError::Input(format!(
                "trying to disable atom slot {} that was not previously requested ({} slots)",
                index,
                self.ids.len()
            )));
        }
        self.ncopies[index] = self.ncopies[index].saturating_sub(1);
        Ok(())
    }

    /// Adds one reference to an existing slot.
    pub fn retain(&mut self, index: usize) -> ProxyResult<()> {
        match self.ncopies.get_mut(index) {
            Some(n) => {
                *n += 1;
                Ok(())
            }
            None => Err(ProxyError::Input(format!(
                "atom slot {} does not exist",
                index
            ))),
        }
    }

    /// Index of the first slot owning `atom_id`, if any.
    pub fn find(&self, atom_id: usize) -> Option<usize> {
        self.ids.iter().position(|&id| id == atom_id)
    }

    /// Number of slots ever created.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true when no slot has been created.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of slots still referenced by at least one component.
    pub fn num_active(&self) -> usize {
        self.ncopies.iter().filter(|&&n| n > 0).count()
    }

    /// Checks that every parallel array has the same length.
    pub fn is_consistent(&self) -> bool {
        let n = self.ids.len();
        self.ncopies.len() == n
            && self.masses.len() == n
            && self.positions.len() == n
            && self.total_forces.len() == n
            && self.applied_forces.len() == n
            && self.colvar_forces.len() == n
    }

    /// Host identifier of a slot.
    pub fn id(&self, index: usize) -> usize {
        self.ids[index]
    }

    /// Reference count of a slot.
    pub fn ncopies(&self, index: usize) -> usize {
        self.ncopies[index]
    }

    /// Mass of a slot.
    pub fn mass(&self, index: usize) -> f64 {
        self.masses[index]
    }

    /// Current position of a slot.
    pub fn position(&self, index: usize) -> AtomPos {
        self.positions[index]
    }

    /// Most recent total force on a slot.
    pub fn total_force(&self, index: usize) -> RVector {
        self.total_forces[index]
    }

    /// Most recent externally applied force on a slot.
    pub fn applied_force(&self, index: usize) -> RVector {
        self.applied_forces[index]
    }

    /// Total force minus the force previously applied by the colvar module.
    pub fn system_force(&self, index: usize) -> RVector {
        self.total_forces[index] - self.applied_forces[index]
    }

    /// Force accumulated by the colvar module since the last reset.
    pub fn colvar_force(&self, index: usize) -> RVector {
        self.colvar_forces[index]
    }

    /// Adds `force` to the slot's pending colvar force.
    pub fn apply_force(&mut self, index: usize, force: &RVector) {
        self.colvar_forces[index] += force;
    }

    /// Sets the mass of a slot.
    pub fn set_mass(&mut self, index: usize, mass: f64) {
        self.masses[index] = mass;
    }

    /// Sets the position of a slot.
    pub fn set_position(&mut self, index: usize, pos: AtomPos) {
        self.positions[index] = pos;
    }

    /// Sets the most recent total force of a slot.
    pub fn set_total_force(&mut self, index: usize, force: RVector) {
        self.total_forces[index] = force;
    }

    /// Sets the most recent applied force of a slot.
    pub fn set_applied_force(&mut self, index: usize, force: RVector) {
        self.applied_forces[index] = force;
    }

    /// Returns all pending colvar forces and resets the accumulators to zero.
    pub fn take_colvar_forces(&mut self) -> Vec<RVector> {
        let taken = self.colvar_forces.clone();
        self.colvar_forces.iter_mut().for_each(|f| *f = zero());
        taken
    }

    /// Host identifiers of all slots, in slot order.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Positions of all slots, in slot order.
    pub fn positions(&self) -> &[AtomPos] {
        &self.positions
    }

    /// Masses of all slots, in slot order.
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Rebuilds a slot table from per-slot records.
    pub fn from_records(records: impl IntoIterator<Item = SlotRecord>) -> Self {
        let mut slots = Self::new();
        for r in records {
            let i = slots.add_atom_slot(r.id);
            slots.ncopies[i] = r.ncopies;
            slots.masses[i] = r.mass;
            slots.positions[i] = r.position;
            slots.total_forces[i] = r.total_force;
            slots.applied_forces[i] = r.applied_force;
            slots.colvar_forces[i] = r.colvar_force;
        }
        slots
    }

    /// Per-slot records in slot order.
    pub fn records(&self) -> Vec<SlotRecord> {
        (0..self.len())
            .map(|i| SlotRecord {
                id: self.ids[i],
                ncopies: self.ncopies[i],
                mass: self.masses[i],
                position: self.positions[i],
                total_force: self.total_forces[i],
                applied_force: self.applied_forces[i],
                colvar_force: self.colvar_forces[i],
            })
            .collect()
    }
}

/// One row of the slot table.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRecord {
    /// Host identifier
    pub id: usize,
    /// Reference count
    pub ncopies: usize,
    /// Mass
    pub mass: f64,
    /// Position
    pub position: AtomPos,
    /// Most recent total force
    pub total_force: RVector,
    /// Most recent applied force
    pub applied_force: RVector,
    /// Pending colvar force
    pub colvar_force: RVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_defaults() {
        let mut slots = AtomSlots::new();
        let i = slots.add_atom_slot(42);

        assert_eq!(i, 0);
        assert_eq!(slots.id(i), 42);
        assert_eq!(slots.ncopies(i), 1);
        assert_eq!(slots.mass(i), 1.0);
        assert_eq!(slots.position(i), zero());
        assert_eq!(slots.total_force(i), zero());
        assert_eq!(slots.applied_force(i), zero());
        assert_eq!(slots.colvar_force(i), zero());
    }

    #[test]
    fn test_arrays_stay_parallel() {
        let mut slots = AtomSlots::new();
        for id in [3, 1, 3, 7, 0] {
            slots.add_atom_slot(id);
            assert!(slots.is_consistent());
        }
        slots.clear_atom(2).unwrap();
        assert!(slots.is_consistent());
        assert!(slots.clear_atom(99).is_err());
        assert!(slots.is_consistent());
        assert_eq!(slots.len(), 5);
    }

    #[test]
    fn test_reused_id_gets_new_slot() {
        let mut slots = AtomSlots::new();
        let a = slots.add_atom_slot(5);
        let b = slots.add_atom_slot(5);

        assert_ne!(a, b);
        assert_eq!(slots.find(5), Some(a));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_clear_atom_saturates_at_zero() {
        let mut slots = AtomSlots::new();
        let i = slots.add_atom_slot(0);
        slots.retain(i).unwrap();
        assert_eq!(slots.ncopies(i), 2);

        slots.clear_atom(i).unwrap();
        assert_eq!(slots.ncopies(i), 1);
        slots.clear_atom(i).unwrap();
        assert_eq!(slots.ncopies(i), 0);
        slots.clear_atom(i).unwrap();
        assert_eq!(slots.ncopies(i), 0);
        assert_eq!(slots.num_active(), 0);
    }

    #[test]
    fn test_clear_atom_out_of_range_leaves_table_untouched() {
        let mut slots = AtomSlots::new();
        slots.add_atom_slot(10);
        let before = slots.records();

        let err = slots.clear_atom(1).unwrap_err();
        assert!(matches!(err, ProxyError::Input(_)));
        assert_eq!(slots.records(), before);
    }

    #[test]
    fn test_system_force_is_total_minus_applied() {
        let mut slots = AtomSlots::new();
        let i = slots.add_atom_slot(1);
        slots.set_total_force(i, RVector::new(3.0, -1.0, 0.5));
        slots.set_applied_force(i, RVector::new(1.0, 1.0, 0.5));

        assert_eq!(slots.system_force(i), RVector::new(2.0, -2.0, 0.0));
    }

    #[test]
    fn test_apply_force_accumulates_and_take_resets() {
        let mut slots = AtomSlots::new();
        let i = slots.add_atom_slot(1);
        slots.apply_force(i, &RVector::new(1.0, 0.0, 0.0));
        slots.apply_force(i, &RVector::new(0.0, 1.0, 0.0));
        assert_eq!(slots.colvar_force(i), RVector::new(1.0, 1.0, 0.0));

        let taken = slots.take_colvar_forces();
        assert_eq!(taken, vec![RVector::new(1.0, 1.0, 0.0)]);
        assert_eq!(slots.colvar_force(i), zero());
    }

    #[test]
    fn test_records_round_trip_preserves_counts() {
        let mut slots = AtomSlots::new();
        let i = slots.add_atom_slot(8);
        slots.set_mass(i, 15.999);
        slots.clear_atom(i).unwrap();

        let rebuilt = AtomSlots::from_records(slots.records());
        assert!(rebuilt.is_consistent());
        assert_eq!(rebuilt.ncopies(0), 0);
        assert_eq!(rebuilt.mass(0), 15.999);
    }
}
