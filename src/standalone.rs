//! Reference host: a standalone analysis engine driven by structure files.
//!
//! [`StandaloneProxy`] implements every mandatory capability of the adapter
//! interface without an external MD engine. The "system" is a structure file
//! (PDB or XYZ) whose models are treated as the frames of a trajectory, much
//! like a trajectory analysis tool hosts the colvar module.
//!
//! # Capabilities
//!
//! - Units, temperature, time step and restart interval from [`Settings`]
//! - Gaussian random numbers from a seedable generator
//! - Logging through the `log` facade
//! - Orthorhombic periodic boundaries from the configured cell
//! - Atom selection by number, by residue/name/segment, or from annotated files
//! - Frame addressing over the loaded models
//! - File backups, system-force requests, in-process replicas and scripting
//!
//! # Usage
//!
//! ```no_run
//! use cvproxy::prelude::*;
//! use cvproxy::standalone::StandaloneProxy;
//! use std::path::Path;
//!
//! let mut proxy = StandaloneProxy::new(Settings::default());
//! proxy.load_system(Path::new("system.pdb"))?;
//! let mut atoms = Vec::new();
//! proxy.load_atoms(Path::new("system.pdb"), &mut atoms, "B", 1.0)?;
//! proxy.update_atoms()?;
//! # Ok::<(), ProxyError>(())
//! ```

use crate::atoms::AtomSlots;
use crate::error::{ProxyError, ProxyResult};
use crate::pbc::PeriodicCell;
use crate::proxy::{ColvarProxy, HostEngine, Prefixes, ProxyState};
use crate::replica::LocalReplica;
use crate::scripting::ScriptRegistry;
use crate::settings::Settings;
use crate::structure::Structure;
use crate::types::{AtomPos, ColvarValue, Gradient, RVector, ResidueId};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

/// Suffix appended to files moved aside by [`ColvarProxy::backup_file`]
pub const BACKUP_SUFFIX: &str = ".BAK";

/// Standalone analysis host.
#[derive(Debug)]
pub struct StandaloneProxy {
    state: ProxyState,
    settings: Settings,
    cell: PeriodicCell,
    rng: StdRng,
    system: Option<Structure>,
    frame: usize,
    energy: f64,
    system_force_requested: bool,
    replica: Option<LocalReplica>,
    scripts: ScriptRegistry,
    reported_errors: Vec<String>,
}

impl StandaloneProxy {
    /// Creates a host with no system loaded.
    pub fn new(settings: Settings) -> Self {
        let rng = match settings.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut state = ProxyState::new();
        state.prefixes = Prefixes {
            input: settings.io.input_prefix.clone(),
            output: settings.io.output_prefix.clone(),
            restart_output: settings.io.restart_output_prefix.clone(),
        };
        Self {
            state,
            cell: settings.cell.to_cell(),
            settings,
            rng,
            system: None,
            frame: 0,
            energy: 0.0,
            system_force_requested: false,
            replica: None,
            scripts: ScriptRegistry::new(),
            reported_errors: Vec::new(),
        }
    }

    /// Joins a group of in-process replicas.
    pub fn with_replica(mut self, replica: LocalReplica) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Settings the host was built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Simulation cell.
    pub fn cell(&self) -> PeriodicCell {
        self.cell
    }

    /// Loads the structure whose atoms and frames form the simulated system.
    ///
    /// A structure too small for the atoms already tracked is rejected and the
    /// current system is kept.
    pub fn load_system(&mut self, path: &Path) -> ProxyResult<()> {
        let structure = Structure::read(path)?;
        check_slot_ids(&self.state.atoms, structure.num_atoms())?;
        info!(
            "Loaded system from {}: {} atoms, {} frames",
            path.display(),
            structure.num_atoms(),
            structure.num_frames()
        );
        self.system = Some(structure);
        self.frame = 0;
        Ok(())
    }

    /// The loaded system, if any.
    pub fn system(&self) -> Option<&Structure> {
        self.system.as_ref()
    }

    fn require_system(&self) -> ProxyResult<&Structure> {
        self.system
            .as_ref()
            .ok_or_else(|| ProxyError::Input("no system has been loaded".to_string()))
    }

    /// Number of frames of the loaded system (0 without a system).
    pub fn num_frames(&self) -> usize {
        self.system.as_ref().map_or(0, Structure::num_frames)
    }

    /// Advances to the next frame; returns false after the last one.
    pub fn next_frame(&mut self) -> bool {
        if self.frame + 1 < self.num_frames() {
            self.frame += 1;
            true
        } else {
            false
        }
    }

    /// Copies positions and masses of the current frame into every atom slot.
    ///
    /// Fails without touching any slot when a slot refers to an atom the
    /// system does not have.
    pub fn update_atoms(&mut self) -> ProxyResult<()> {
        let Some(system) = self.system.as_ref() else {
            return Ok(());
        };
        check_slot_ids(&self.state.atoms, system.num_atoms())?;
        let frame = &system.frames[self.frame];
        for i in 0..self.state.atoms.len() {
            let id = self.state.atoms.id(i);
            self.state.atoms.set_position(i, frame[id]);
            self.state.atoms.set_mass(i, system.atoms[id].mass());
        }
        Ok(())
    }

    /// Returns the forces colvars applied this step and resets them.
    ///
    /// The returned forces are recorded as the applied forces of the next
    /// step, so that [`ColvarProxy::get_atom_system_force`] excludes them.
    pub fn take_colvar_forces(&mut self) -> Vec<RVector> {
        let forces = self.state.atoms.take_colvar_forces();
        for (i, f) in forces.iter().enumerate() {
            self.state.atoms.set_applied_force(i, *f);
        }
        forces
    }

    /// Records the total force the "integrator" computed for a slot.
    pub fn set_total_force(&mut self, index: usize, force: RVector) {
        self.state.atoms.set_total_force(index, force);
    }

    /// Returns the bias energy reported since the last call and resets it.
    pub fn take_energy(&mut self) -> f64 {
        std::mem::take(&mut self.energy)
    }

    /// Whether system forces were requested.
    pub fn system_force_requested(&self) -> bool {
        self.system_force_requested
    }

    /// Scripting callbacks; register callbacks here, then call
    /// [`StandaloneProxy::refresh_script_flags`].
    pub fn scripts_mut(&mut self) -> &mut ScriptRegistry {
        &mut self.scripts
    }

    /// Updates the scripting availability flags from the registry.
    pub fn refresh_script_flags(&mut self) {
        self.state.scripting = self.scripts.flags();
    }

    /// Recoverable errors reported so far.
    pub fn reported_errors(&self) -> &[String] {
        &self.reported_errors
    }

    /// Slot for host atom `id`, reusing an existing slot for an already
    /// tracked atom.
    fn slot_for(&mut self, id: usize) -> ProxyResult<usize> {
        if let Some(index) = self.state.atoms.find(id) {
            self.state.atoms.retain(index)?;
            debug!("Atom {} already tracked in slot {}", id + 1, index);
            return Ok(index);
        }
        let system = self.require_system()?;
        let mass = system.atoms[id].mass();
        let pos = system.frames[self.frame][id];
        let index = self.state.atoms.add_atom_slot(id);
        self.state.atoms.set_mass(index, mass);
        self.state.atoms.set_position(index, pos);
        Ok(index)
    }

    fn shutdown_streams(&mut self) {
        if let Err(e) = self.state.streams.close_all() {
            error!("Failed to close output streams: {}", e);
        }
    }
}

/// Rejects a slot table that refers to atoms beyond `num_atoms`.
fn check_slot_ids(atoms: &AtomSlots, num_atoms: usize) -> ProxyResult<()> {
    match atoms.ids().iter().max() {
        Some(&id) if id >= num_atoms => Err(ProxyError::Input(format!(
            "atom {} is tracked but the system has only {} atoms",
            id + 1,
            num_atoms
        ))),
        _ => Ok(()),
    }
}

impl HostEngine for StandaloneProxy {
    fn state(&self) -> &ProxyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ProxyState {
        &mut self.state
    }

    fn unit_angstrom(&self) -> f64 {
        self.settings.units.unit_angstrom
    }

    fn boltzmann(&self) -> f64 {
        self.settings.units.boltzmann
    }

    fn temperature(&self) -> f64 {
        self.settings.simulation.temperature
    }

    fn dt(&self) -> f64 {
        self.settings.simulation.timestep
    }

    fn rand_gaussian(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    fn restart_frequency(&self) -> usize {
        self.settings.simulation.restart_frequency
    }

    fn log(&self, message: &str) {
        info!("colvars: {}", message);
    }

    fn error(&mut self, message: &str) {
        error!("colvars: {}", message);
        self.reported_errors.push(message.to_string());
    }

    fn fatal_error(&mut self, message: &str) -> ! {
        error!("colvars: fatal: {}", message);
        self.shutdown_streams();
        process::exit(1);
    }

    fn exit(&mut self, message: &str) -> ! {
        info!("colvars: {}", message);
        self.shutdown_streams();
        process::exit(0);
    }

    fn add_energy(&mut self, energy: f64) {
        self.energy += energy;
    }

    fn position_distance(&self, pos1: &AtomPos, pos2: &AtomPos) -> RVector {
        self.cell.distance(pos1, pos2)
    }

    fn select_closest_image(&self, pos: &mut AtomPos, ref_pos: &AtomPos) {
        *pos = self.cell.closest_image(pos, ref_pos);
    }

    fn init_atom(&mut self, atom_number: usize) -> ProxyResult<usize> {
        let num_atoms = self.require_system()?.num_atoms();
        if atom_number == 0 || atom_number > num_atoms {
            return Err(ProxyError::Input(format!(
                "atom number {} is out of range (1-{})",
                atom_number, num_atoms
            )));
        }
        self.slot_for(atom_number - 1)
    }

    fn load_atoms(
        &mut self,
        filename: &Path,
        atoms: &mut Vec<usize>,
        pdb_field: &str,
        pdb_field_value: f64,
    ) -> ProxyResult<()> {
        let file = Structure::read(filename)?;
        let num_atoms = self.require_system()?.num_atoms();
        if file.num_atoms() != num_atoms {
            return Err(ProxyError::Input(format!(
                "{} has {} atoms but the system has {}",
                filename.display(),
                file.num_atoms(),
                num_atoms
            )));
        }
        let selected = file.select(pdb_field, pdb_field_value)?;
        if selected.is_empty() {
            warn!("No atoms selected from {}", filename.display());
        }
        for id in selected {
            atoms.push(self.slot_for(id)?);
        }
        debug!("{} atoms now selected from {}", atoms.len(), filename.display());
        Ok(())
    }

    fn load_coords(
        &mut self,
        filename: &Path,
        pos: &mut Vec<AtomPos>,
        indices: &[usize],
        pdb_field: &str,
        pdb_field_value: f64,
    ) -> ProxyResult<()> {
        let file = Structure::read(filename)?;
        let first = &file.frames[0];

        let loaded: Vec<AtomPos> = if pdb_field.trim().is_empty() {
            indices
                .iter()
                .map(|&id| {
                    first.get(id).copied().ok_or_else(|| {
                        ProxyError::Input(format!(
                            "atom {} is not present in {} ({} atoms)",
                            id + 1,
                            filename.display(),
                            first.len()
                        ))
                    })
                })
                .collect::<ProxyResult<_>>()?
        } else {
            let selected = file.select(pdb_field, pdb_field_value)?;
            if selected.len() != indices.len() {
                return Err(ProxyError::Input(format!(
                    "{} selects {} atoms but {} were requested",
                    filename.display(),
                    selected.len(),
                    indices.len()
                )));
            }
            selected.into_iter().map(|i| first[i]).collect()
        };

        if !pos.is_empty() && pos.len() != loaded.len() {
            return Err(ProxyError::Input(format!(
                "expected {} positions, {} provides {}",
                pos.len(),
                filename.display(),
                loaded.len()
            )));
        }
        *pos = loaded;
        Ok(())
    }
}

impl ColvarProxy for StandaloneProxy {
    fn setup(&mut self) -> ProxyResult<()> {
        self.refresh_script_flags();
        self.update_atoms()?;
        info!(
            "Standalone host ready: T = {} K, dt = {} fs, kB = {}, {} cell",
            self.temperature(),
            self.dt(),
            self.boltzmann(),
            if self.cell.is_periodic() { "periodic" } else { "open" }
        );
        Ok(())
    }

    fn frame(&self) -> ProxyResult<usize> {
        self.require_system()?;
        Ok(self.frame)
    }

    fn set_frame(&mut self, frame: usize) -> ProxyResult<()> {
        if frame >= self.num_frames() {
            return Err(ProxyError::NoSuchFrame(frame));
        }
        self.check_atom_slots(&self.state.atoms)?;
        self.frame = frame;
        self.update_atoms()
    }

    fn check_atom_slots(&self, atoms: &AtomSlots) -> ProxyResult<()> {
        match self.system.as_ref() {
            Some(system) => check_slot_ids(atoms, system.num_atoms()),
            None => Ok(()),
        }
    }

    fn replica_enabled(&self) -> bool {
        self.replica.is_some()
    }

    fn replica_index(&self) -> usize {
        self.replica.as_ref().map_or(0, LocalReplica::index)
    }

    fn replica_num(&self) -> usize {
        self.replica.as_ref().map_or(1, LocalReplica::num)
    }

    fn replica_comm_barrier(&mut self) -> ProxyResult<()> {
        if let Some(replica) = self.replica.as_ref() {
            replica.barrier();
        }
        Ok(())
    }

    fn replica_comm_recv(&mut self, buf: &mut [u8], src_rep: usize) -> ProxyResult<usize> {
        match self.replica.as_mut() {
            Some(replica) => replica.recv(buf, src_rep),
            None => Err(ProxyError::not_implemented("replica_comm_recv")),
        }
    }

    fn replica_comm_send(&mut self, msg: &[u8], dest_rep: usize) -> ProxyResult<usize> {
        match self.replica.as_mut() {
            Some(replica) => replica.send(msg, dest_rep),
            None => Err(ProxyError::not_implemented("replica_comm_send")),
        }
    }

    fn run_force_callback(&mut self) -> ProxyResult<()> {
        self.scripts.run_force()
    }

    fn run_colvar_callback(
        &mut self,
        name: &str,
        cvcs: &[&ColvarValue],
        value: &mut ColvarValue,
    ) -> ProxyResult<()> {
        self.scripts.run_value(name, cvcs, value)
    }

    fn run_colvar_gradient_callback(
        &mut self,
        name: &str,
        cvcs: &[&ColvarValue],
        gradient: &mut Vec<Gradient>,
    ) -> ProxyResult<()> {
        self.scripts.run_gradient(name, cvcs, gradient)
    }

    fn backup_file(&mut self, filename: &Path) -> ProxyResult<()> {
        if !filename.exists() {
            return Ok(());
        }
        let mut backup = filename.as_os_str().to_owned();
        backup.push(BACKUP_SUFFIX);
        let backup = PathBuf::from(backup);
        fs::rename(filename, &backup).map_err(|source| ProxyError::File {
            path: filename.display().to_string(),
            source,
        })?;
        debug!("Backed up {} to {}", filename.display(), backup.display());
        Ok(())
    }

    fn request_system_force(&mut self, yesno: bool) -> ProxyResult<()> {
        self.system_force_requested = yesno;
        Ok(())
    }

    fn init_atom_by_name(
        &mut self,
        residue: ResidueId,
        atom_name: &str,
        segment_id: &str,
    ) -> ProxyResult<usize> {
        let id = self
            .require_system()?
            .find_by_name(residue, atom_name, segment_id)
            .ok_or_else(|| {
                ProxyError::Input(format!(
                    "no atom named \"{}\" in residue {} of segment \"{}\"",
                    atom_name, residue, segment_id
                ))
            })?;
        self.slot_for(id)
    }
}
