//! Adapter interface between the collective-variables module and its host.
//!
//! A host program (an MD engine, a trajectory analysis tool, ...) supports the
//! colvar module by implementing two traits:
//!
//! - [`HostEngine`]: capabilities only the host can provide. There is no
//!   sensible default for any of them, so every host must implement them all.
//! - [`ColvarProxy`]: capabilities with a usable default. A host overrides the
//!   ones it supports; the rest report [`ProxyError::NotImplemented`] or fall
//!   back to single-replica, script-less behavior.
//!
//! Both traits operate on a [`ProxyState`] owned by the host adapter. It holds
//! the atom slots requested by colvars, the open output channels, the file
//! prefixes and the scripting flags.
//!
//! # Lifecycle
//!
//! The host constructs the adapter once, calls [`ColvarProxy::setup`] to finish
//! initialization, then queries and updates it once per simulation step until
//! the run ends. See [`Session`](crate::session::Session) for a driver.
//!
//! # Example
//!
//! ```
//! use cvproxy::prelude::*;
//! use std::path::Path;
//!
//! struct Vacuum {
//!     state: ProxyState,
//!     energy: f64,
//! }
//!
//! impl HostEngine for Vacuum {
//!     fn state(&self) -> &ProxyState { &self.state }
//!     fn state_mut(&mut self) -> &mut ProxyState { &mut self.state }
//!     fn unit_angstrom(&self) -> f64 { 1.0 }
//!     fn boltzmann(&self) -> f64 { 0.001987191 }
//!     fn temperature(&self) -> f64 { 300.0 }
//!     fn dt(&self) -> f64 { 2.0 }
//!     fn rand_gaussian(&mut self) -> f64 { 0.0 }
//!     fn restart_frequency(&self) -> usize { 0 }
//!     fn log(&self, message: &str) { println!("{}", message); }
//!     fn error(&mut self, message: &str) { eprintln!("{}", message); }
//!     fn fatal_error(&mut self, message: &str) -> ! { panic!("{}", message) }
//!     fn exit(&mut self, message: &str) -> ! { panic!("{}", message) }
//!     fn add_energy(&mut self, energy: f64) { self.energy += energy; }
//!     fn position_distance(&self, pos1: &AtomPos, pos2: &AtomPos) -> RVector { pos2 - pos1 }
//!     fn select_closest_image(&self, _pos: &mut AtomPos, _ref_pos: &AtomPos) {}
//!     fn init_atom(&mut self, atom_number: usize) -> ProxyResult<usize> {
//!         Ok(self.state.atoms.add_atom_slot(atom_number - 1))
//!     }
//!     fn load_atoms(&mut self, _: &Path, _: &mut Vec<usize>, _: &str, _: f64) -> ProxyResult<()> {
//!         Err(ProxyError::not_implemented("load_atoms"))
//!     }
//!     fn load_coords(&mut self, _: &Path, _: &mut Vec<AtomPos>, _: &[usize], _: &str, _: f64) -> ProxyResult<()> {
//!         Err(ProxyError::not_implemented("load_coords"))
//!     }
//! }
//!
//! impl ColvarProxy for Vacuum {}
//!
//! let mut host = Vacuum { state: ProxyState::default(), energy: 0.0 };
//! let slot = host.init_atom(42).unwrap();
//! host.apply_atom_force(slot, &RVector::new(1.0, 0.0, 0.0));
//! host.apply_atom_force(slot, &RVector::new(0.0, 1.0, 0.0));
//! assert_eq!(host.state().atoms.colvar_force(slot), RVector::new(1.0, 1.0, 0.0));
//! assert!(host.replica_comm_send(b"hi", 1).unwrap_err().is_not_implemented());
//! ```

use crate::atoms::AtomSlots;
use crate::error::{ProxyError, ProxyResult};
use crate::scripting::ScriptingFlags;
use crate::streams::{OutputStream, OutputStreams};
use crate::types::{AtomPos, ColvarValue, Gradient, RVector, ResidueId};
use std::path::Path;

/// File name prefixes used by the colvar module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefixes {
    /// Prefix of input files (restarts, not configuration)
    pub input: String,
    /// Prefix of output files (final system configuration)
    pub output: String,
    /// Prefix of restart files written during the run
    pub restart_output: String,
}

/// Bookkeeping owned by every adapter.
#[derive(Debug, Default)]
pub struct ProxyState {
    /// Atoms requested by colvars
    pub atoms: AtomSlots,
    /// Open output channels
    pub streams: OutputStreams,
    /// File name prefixes
    pub prefixes: Prefixes,
    /// Scripting availability
    pub scripting: ScriptingFlags,
}

impl ProxyState {
    /// Empty state with file-backed output channels.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Capabilities every host must supply.
pub trait HostEngine {
    /// Shared adapter bookkeeping.
    fn state(&self) -> &ProxyState;

    /// Mutable access to the shared adapter bookkeeping.
    fn state_mut(&mut self) -> &mut ProxyState;

    // ---- simulation parameters ----

    /// Value of the host length unit in angstrom.
    fn unit_angstrom(&self) -> f64;

    /// Boltzmann constant in host units.
    fn boltzmann(&self) -> f64;

    /// Temperature of the simulation (K).
    fn temperature(&self) -> f64;

    /// Time step of the simulation (fs).
    fn dt(&self) -> f64;

    /// Pseudo-random number with a standard normal distribution.
    fn rand_gaussian(&mut self) -> f64;

    /// Restart files are written each time this number of steps has passed.
    fn restart_frequency(&self) -> usize;

    // ---- reporting ----

    /// Prints a message to the main log.
    fn log(&self, message: &str);

    /// Prints an error to the main log and lets the program continue.
    fn error(&mut self, message: &str);

    /// Prints an error to the main log and terminates abnormally.
    fn fatal_error(&mut self, message: &str) -> !;

    /// Prints a message to the main log and terminates normally.
    fn exit(&mut self, message: &str) -> !;

    // ---- system data ----

    /// Passes the bias energy of the current step to the host.
    fn add_energy(&mut self, energy: f64);

    /// PBC-aware displacement vector pointing from `pos1` to `pos2`.
    fn position_distance(&self, pos1: &AtomPos, pos2: &AtomPos) -> RVector;

    /// Replaces `pos` with its periodic image closest to `ref_pos`.
    fn select_closest_image(&self, pos: &mut AtomPos, ref_pos: &AtomPos);

    // ---- atom selection ----

    /// Requests an atom by its 1-based number; returns the slot index.
    fn init_atom(&mut self, atom_number: usize) -> ProxyResult<usize>;

    /// Appends to `atoms` the slot indices of the atoms selected in `filename`.
    ///
    /// When `pdb_field` is not empty, only records whose field equals
    /// `pdb_field_value` are selected (any non-zero value when it is `0.0`).
    fn load_atoms(
        &mut self,
        filename: &Path,
        atoms: &mut Vec<usize>,
        pdb_field: &str,
        pdb_field_value: f64,
    ) -> ProxyResult<()>;

    /// Loads positions from `filename` for the atoms with the given 0-based ids.
    ///
    /// If `pos` is not empty its length must match the number of atoms read.
    fn load_coords(
        &mut self,
        filename: &Path,
        pos: &mut Vec<AtomPos>,
        indices: &[usize],
        pdb_field: &str,
        pdb_field_value: f64,
    ) -> ProxyResult<()>;
}

/// Capabilities with a default behavior that hosts may override.
pub trait ColvarProxy: HostEngine {
    /// Finishes initialization after construction.
    fn setup(&mut self) -> ProxyResult<()> {
        Ok(())
    }

    // ---- frames ----

    /// Current frame number.
    fn frame(&self) -> ProxyResult<usize> {
        Err(ProxyError::not_implemented("frame"))
    }

    /// Moves to the given frame.
    fn set_frame(&mut self, _frame: usize) -> ProxyResult<()> {
        Err(ProxyError::not_implemented("set_frame"))
    }

    // ---- prefixes ----

    /// Prefix of input files (restarts, not configuration).
    fn input_prefix(&self) -> &str {
        &self.state().prefixes.input
    }

    /// Prefix of output files (final system configuration).
    fn output_prefix(&self) -> &str {
        &self.state().prefixes.output
    }

    /// Prefix of restart files.
    fn restart_output_prefix(&self) -> &str {
        &self.state().prefixes.restart_output
    }

    // ---- multiple replicas ----

    /// Whether multi-replica support is available and active.
    fn replica_enabled(&self) -> bool {
        false
    }

    /// Index of this replica.
    fn replica_index(&self) -> usize {
        0
    }

    /// Total number of replicas.
    fn replica_num(&self) -> usize {
        1
    }

    /// Synchronizes all replicas.
    fn replica_comm_barrier(&mut self) -> ProxyResult<()> {
        Ok(())
    }

    /// Receives a message from replica `src_rep` into `buf`; returns its length.
    fn replica_comm_recv(&mut self, _buf: &mut [u8], _src_rep: usize) -> ProxyResult<usize> {
        Err(ProxyError::not_implemented("replica_comm_recv"))
    }

    /// Sends `msg` to replica `dest_rep`; returns the number of bytes sent.
    fn replica_comm_send(&mut self, _msg: &[u8], _dest_rep: usize) -> ProxyResult<usize> {
        Err(ProxyError::not_implemented("replica_comm_send"))
    }

    // ---- scripting ----

    /// Whether a user force script is defined.
    fn force_script_defined(&self) -> bool {
        self.state().scripting.force_script_defined
    }

    /// Whether a scripting interface is available.
    fn have_scripts(&self) -> bool {
        self.state().scripting.have_scripts
    }

    /// Runs the user-defined colvar forces script.
    fn run_force_callback(&mut self) -> ProxyResult<()> {
        Err(ProxyError::not_implemented("run_force_callback"))
    }

    /// Computes the value of a scripted colvar from its components.
    fn run_colvar_callback(
        &mut self,
        _name: &str,
        _cvcs: &[&ColvarValue],
        _value: &mut ColvarValue,
    ) -> ProxyResult<()> {
        Err(ProxyError::not_implemented("run_colvar_callback"))
    }

    /// Computes the gradients of a scripted colvar, one matrix per component.
    fn run_colvar_gradient_callback(
        &mut self,
        _name: &str,
        _cvcs: &[&ColvarValue],
        _gradient: &mut Vec<Gradient>,
    ) -> ProxyResult<()> {
        Err(ProxyError::not_implemented("run_colvar_gradient_callback"))
    }

    // ---- output ----

    /// Returns the output channel called `output_name`, opening it if needed.
    fn output_stream(&mut self, output_name: &str) -> ProxyResult<&mut OutputStream> {
        self.state_mut().streams.open(output_name)
    }

    /// Closes the output channel called `output_name`.
    ///
    /// Closing a channel that is not open is an internal-consistency error.
    fn close_output_stream(&mut self, output_name: &str) -> ProxyResult<()> {
        self.state_mut().streams.close(output_name)
    }

    /// Renames an existing file before it gets overwritten.
    fn backup_file(&mut self, _filename: &Path) -> ProxyResult<()> {
        Err(ProxyError::not_implemented("backup_file"))
    }

    // ---- system data ----

    /// Tells the host whether system forces are needed.
    fn request_system_force(&mut self, yesno: bool) -> ProxyResult<()> {
        if yesno {
            Err(ProxyError::not_implemented("system forces"))
        } else {
            Ok(())
        }
    }

    /// PBC-aware squared distance between two positions.
    fn position_dist2(&self, pos1: &AtomPos, pos2: &AtomPos) -> f64 {
        self.position_distance(pos1, pos2).norm_squared()
    }

    /// Applies [`HostEngine::select_closest_image`] to every position, in order.
    fn select_closest_images(&self, pos: &mut [AtomPos], ref_pos: &AtomPos) {
        for p in pos.iter_mut() {
            self.select_closest_image(p, ref_pos);
        }
    }

    // ---- atoms ----

    /// Requests an atom by residue number, atom name and segment.
    fn init_atom_by_name(
        &mut self,
        _residue: ResidueId,
        _atom_name: &str,
        _segment_id: &str,
    ) -> ProxyResult<usize> {
        Err(ProxyError::not_implemented(
            "initializing an atom by name and residue number",
        ))
    }

    /// Checks that a slot table, e.g. one read from a restart snapshot, only
    /// refers to atoms this host has.
    fn check_atom_slots(&self, _atoms: &AtomSlots) -> ProxyResult<()> {
        Ok(())
    }

    /// Releases one reference to an atom slot.
    fn clear_atom(&mut self, index: usize) -> ProxyResult<()> {
        self.state_mut().atoms.clear_atom(index)
    }

    /// Host identifier of the atom in slot `index`.
    fn get_atom_id(&self, index: usize) -> usize {
        self.state().atoms.id(index)
    }

    /// Mass of the atom in slot `index`.
    fn get_atom_mass(&self, index: usize) -> f64 {
        self.state().atoms.mass(index)
    }

    /// Current position of the atom in slot `index`.
    fn get_atom_position(&self, index: usize) -> AtomPos {
        self.state().atoms.position(index)
    }

    /// Total force minus the force applied by colvars for slot `index`.
    fn get_atom_system_force(&self, index: usize) -> RVector {
        self.state().atoms.system_force(index)
    }

    /// Adds `new_force` to the force colvars apply to slot `index`.
    fn apply_atom_force(&mut self, index: usize, new_force: &RVector) {
        self.state_mut().atoms.apply_force(index, new_force);
    }

    /// Current velocity of the atom in slot `index`.
    fn get_atom_velocity(&self, _index: usize) -> ProxyResult<RVector> {
        Err(ProxyError::not_implemented(
            "reading the current velocity of an atom",
        ))
    }
}
