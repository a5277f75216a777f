//! Driver that owns an adapter for the length of a run.
//!
//! The [`Session`] calls [`ColvarProxy::setup`] once, then runs one closure per
//! step. Each closure computes the bias for the step and returns its energy,
//! which is passed to the host through [`HostEngine::add_energy`]. Restart
//! snapshots are written on the host's restart interval.
//!
//! Errors raised by the library are never fatal by themselves. The session
//! hands them to [`Session::report`], which forwards recoverable ones to
//! [`HostEngine::error`] and fatal ones to [`HostEngine::fatal_error`].
//!
//! [`HostEngine::add_energy`]: crate::proxy::HostEngine::add_energy
//! [`HostEngine::error`]: crate::proxy::HostEngine::error
//! [`HostEngine::fatal_error`]: crate::proxy::HostEngine::fatal_error

use crate::checkpoint::Checkpoint;
use crate::error::{ProxyError, ProxyResult, Severity};
use crate::proxy::ColvarProxy;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// File name suffix of restart snapshots
pub const RESTART_SUFFIX: &str = ".cvproxy.json";

/// Run driver owning a host adapter.
#[derive(Debug)]
pub struct Session<P: ColvarProxy> {
    proxy: P,
    step: u64,
    total_energy: f64,
}

impl<P: ColvarProxy> Session<P> {
    /// Wraps an adapter; nothing is called on it yet.
    pub fn new(proxy: P) -> Self {
        Self {
            proxy,
            step: 0,
            total_energy: 0.0,
        }
    }

    /// Finishes the adapter's initialization.
    pub fn setup(&mut self) -> ProxyResult<()> {
        self.proxy.setup()?;
        info!(
            "Session ready: replica {} of {}, restart every {} steps",
            self.proxy.replica_index() + 1,
            self.proxy.replica_num(),
            self.proxy.restart_frequency()
        );
        Ok(())
    }

    /// The adapter.
    pub fn proxy(&self) -> &P {
        &self.proxy
    }

    /// Mutable access to the adapter.
    pub fn proxy_mut(&mut self) -> &mut P {
        &mut self.proxy
    }

    /// Number of completed steps.
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Bias energy reported over all completed steps.
    pub fn total_energy(&self) -> f64 {
        self.total_energy
    }

    /// Runs one step.
    ///
    /// `f` computes the bias of the step and returns its energy. After it
    /// succeeds the energy is reported to the host, and a restart snapshot is
    /// written when the step count reaches a multiple of the restart interval.
    pub fn step<F>(&mut self, f: F) -> ProxyResult<f64>
    where
        F: FnOnce(&mut P) -> ProxyResult<f64>,
    {
        let energy = f(&mut self.proxy)?;
        self.proxy.add_energy(energy);
        self.total_energy += energy;
        self.step += 1;

        let freq = self.proxy.restart_frequency() as u64;
        if freq > 0 && self.step % freq == 0 {
            self.write_restart()?;
        }
        Ok(energy)
    }

    /// Path of the restart snapshot for this adapter.
    pub fn restart_path(&self) -> PathBuf {
        let prefix = match self.proxy.restart_output_prefix() {
            "" => self.proxy.output_prefix(),
            p => p,
        };
        PathBuf::from(format!("{}{}", prefix, RESTART_SUFFIX))
    }

    /// Writes a restart snapshot now; returns its path.
    pub fn write_restart(&mut self) -> ProxyResult<PathBuf> {
        let path = self.restart_path();
        self.proxy.backup_file(&path).or_else(ignore_not_implemented)?;
        let frame = self.proxy.frame().ok();
        Checkpoint::new(self.step, frame, self.total_energy, &self.proxy.state().atoms)
            .save(&path)?;
        info!("Restart snapshot written at step {}: {}", self.step, path.display());
        Ok(path)
    }

    /// Restores a snapshot written by [`Session::write_restart`].
    ///
    /// The atom slot table is replaced, so slot indices handed out before the
    /// snapshot was taken stay valid. A stored frame is restored on hosts that
    /// support frame addressing. On error the session and the slot table are
    /// left as they were.
    pub fn restore(&mut self, path: &Path) -> ProxyResult<()> {
        let checkpoint = Checkpoint::load(path)?;
        let atoms = checkpoint.atoms();
        self.proxy.check_atom_slots(&atoms)?;

        let previous = std::mem::replace(&mut self.proxy.state_mut().atoms, atoms);
        if let Some(frame) = checkpoint.frame {
            if let Err(e) = self.proxy.set_frame(frame).or_else(ignore_not_implemented) {
                self.proxy.state_mut().atoms = previous;
                return Err(e);
            }
        }
        self.step = checkpoint.step;
        self.total_energy = checkpoint.total_energy;
        info!(
            "Restored step {} with {} atom slots from {}",
            self.step,
            self.proxy.state().atoms.len(),
            path.display()
        );
        Ok(())
    }

    /// Routes an error to the host by severity.
    ///
    /// Recoverable errors are logged through the host's `error` and the run
    /// continues. Fatal errors go to its `fatal_error`, which does not return.
    pub fn report(&mut self, err: &ProxyError) {
        match err.severity() {
            Severity::Recoverable => self.proxy.error(&err.to_string()),
            Severity::Fatal => self.proxy.fatal_error(&err.to_string()),
        }
    }

    /// Flushes and closes all output channels and returns the adapter.
    pub fn finish(mut self) -> ProxyResult<P> {
        let names: Vec<String> = self
            .proxy
            .state()
            .streams
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in &names {
            if let Err(e) = self.proxy.close_output_stream(name) {
                warn!("Could not close output {}: {}", name, e);
            }
        }
        debug!(
            "Session finished after {} steps, total bias energy {:.6}",
            self.step, self.total_energy
        );
        Ok(self.proxy)
    }
}

fn ignore_not_implemented(err: ProxyError) -> ProxyResult<()> {
    if err.is_not_implemented() {
        Ok(())
    } else {
        Err(err)
    }
}
