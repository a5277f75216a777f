#![deny(missing_docs)]

//! cvproxy - Host Adapter Interface for Collective-Variables Modules
//!
//! cvproxy defines the contract between a collective-variables (colvar) module
//! and the program that hosts it: a molecular dynamics engine, a trajectory
//! analysis tool or a standalone driver. The colvar module never talks to the
//! host directly. Everything it needs goes through one adapter.
//!
//! # Overview
//!
//! The adapter gives the colvar module:
//! - Simulation parameters (units, Boltzmann constant, temperature, time step)
//! - Gaussian random numbers
//! - A log channel plus recoverable, fatal and normal-exit reporting
//! - Periodic-boundary-aware distances and image selection
//! - Reference-counted atom slots carrying masses, positions and forces
//! - Named output channels and file backups
//! - Optional frame addressing, multi-replica messaging and scripting
//!
//! # Adapter Traits
//!
//! A host implements two traits on its adapter type:
//!
//! | Trait | Contents | Default |
//! |-------|----------|---------|
//! | [`HostEngine`](proxy::HostEngine) | Capabilities only a host can supply | none |
//! | [`ColvarProxy`](proxy::ColvarProxy) | Optional capabilities | single replica, no scripts, `NotImplemented` |
//!
//! A missing optional capability is reported as
//! [`ProxyError::NotImplemented`](error::ProxyError::NotImplemented), never
//! as a failure, so callers can fall back to another strategy.
//!
//! # Quick Start
//!
//! ```no_run
//! use cvproxy::prelude::*;
//! use cvproxy::session::Session;
//! use cvproxy::standalone::StandaloneProxy;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsManager::load()?.settings().clone();
//!     let mut proxy = StandaloneProxy::new(settings);
//!     proxy.load_system(Path::new("system.pdb"))?;
//!     let slot = proxy.init_atom(1)?;
//!
//!     let mut session = Session::new(proxy);
//!     session.setup()?;
//!     session.step(|p| {
//!         p.apply_atom_force(slot, &RVector::new(0.0, 0.0, -0.1));
//!         Ok(0.05)
//!     })?;
//!     session.finish()?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`proxy`](proxy/index.html) - Adapter traits and shared state
//! - [`atoms`](atoms/index.html) - Reference-counted atom slots
//! - [`streams`](streams/index.html) - Named output channels
//! - [`error`](error/index.html) - Error and status types
//! - [`types`](types/index.html) - Vector and colvar value types
//! - [`pbc`](pbc/index.html) - Periodic cells and minimum images
//! - [`structure`](structure/index.html) - PDB and XYZ readers, atom selection
//! - [`replica`](replica/index.html) - In-process replica communication
//! - [`scripting`](scripting/index.html) - Callback-based scripted colvars
//! - [`settings`](settings/index.html) - Configuration management
//! - [`checkpoint`](checkpoint/index.html) - Restart snapshots
//! - [`standalone`](standalone/index.html) - Structure-file analysis host
//! - [`session`](session/index.html) - Run driver
//!
//! # Configuration
//!
//! Host parameters are read from `cvproxy.cfg` INI files. Run `cvproxy ci` to
//! write a commented template.

/// Reference-counted atom slots
pub mod atoms;
/// Restart snapshots
pub mod checkpoint;
pub mod error;
/// Periodic boundary conditions
pub mod pbc;
pub mod proxy;
/// In-process replica communication
pub mod replica;
pub mod scripting;
pub mod session;
/// Configuration management system
pub mod settings;
pub mod standalone;
pub mod streams;
/// Structure file readers
pub mod structure;
pub mod types;

pub use error::{ProxyError, ProxyResult};
pub use proxy::{ColvarProxy, HostEngine, ProxyState};

/// Items needed by most adapter implementations.
pub mod prelude {
    pub use crate::error::{ErrorCode, ProxyError, ProxyResult};
    pub use crate::proxy::{ColvarProxy, HostEngine, Prefixes, ProxyState};
    pub use crate::settings::{Settings, SettingsManager};
    pub use crate::types::{AtomPos, ColvarValue, Gradient, RVector};
}
