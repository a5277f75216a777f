//! cvproxy Command-Line Interface
//!
//! Entry point of the standalone host. Two commands are supported:
//!
//! 1. **Settings template** (`cvproxy ci [file]`):
//!    Writes a commented `cvproxy.cfg` template
//!
//! 2. **Trajectory analysis** (`cvproxy run <structure> [field] [value]`):
//!    Loads a PDB/XYZ structure whose models are the frames of a trajectory,
//!    selects atoms (all of them, or those whose `field` column matches
//!    `value`) and writes their center of mass and radius of gyration for every
//!    frame to `<output_prefix>.colvars.traj`
//!
//! # Examples
//!
//! ```bash
//! # Write a settings template to ./cvproxy.cfg
//! cvproxy ci
//!
//! # Analyze every atom of a multi-model PDB file
//! cvproxy run traj.pdb
//!
//! # Analyze only the atoms flagged with B-factor 1.0
//! cvproxy run traj.pdb B 1.0
//! ```

use cvproxy::prelude::*;
use cvproxy::session::Session;
use cvproxy::settings::CONFIG_FILE_NAME;
use cvproxy::standalone::StandaloneProxy;
use log::{error, info};
use std::env;
use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let manager = match SettingsManager::load() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(manager.logging().level_filter())
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();
    info!("Settings loaded from {}", manager.config_source());

    match args[1].as_str() {
        "ci" => {
            let target = args.get(2).map(String::as_str).unwrap_or(CONFIG_FILE_NAME);
            match SettingsManager::create_template(Path::new(target)) {
                Ok(()) => {
                    println!("✓ Settings template created successfully!");
                    println!("  Output file: {}", target);
                }
                Err(e) => {
                    eprintln!("Error creating settings template: {}", e);
                    process::exit(1);
                }
            }
        }
        "run" => {
            if args.len() < 3 {
                eprintln!("Error: Missing structure file");
                print_usage(&args[0]);
                process::exit(1);
            }
            let field = args.get(3).map(String::as_str).unwrap_or("");
            let value = match args.get(4).map(|v| v.parse::<f64>()) {
                None => 0.0,
                Some(Ok(v)) => v,
                Some(Err(_)) => {
                    eprintln!("Error: Invalid selection value: {}", args[4]);
                    process::exit(1);
                }
            };
            if let Err(e) = run_analysis(manager.settings().clone(), Path::new(&args[2]), field, value) {
                error!("{}", e);
                process::exit(1);
            }
        }
        command => {
            eprintln!("Error: Unknown command: {}", command);
            print_usage(&args[0]);
            process::exit(1);
        }
    }
}

fn print_usage(program_name: &str) {
    eprintln!("cvproxy - standalone host for collective-variables analysis");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} ci [file]", program_name);
    eprintln!("                    Create a settings template (default: {})", CONFIG_FILE_NAME);
    eprintln!();
    eprintln!("  {} run <structure> [field] [value]", program_name);
    eprintln!("                    Center of mass and radius of gyration per frame");
    eprintln!("                    field: O (occupancy), B (beta), X, Y or Z");
    eprintln!("                    value: 0 selects any non-zero field");
    eprintln!();
    eprintln!("Supported structure formats:");
    eprintln!("  .pdb  - PDB file, one frame per MODEL");
    eprintln!("  .xyz  - XYZ file, one frame per block");
}

/// Runs the frame-by-frame analysis of the selected atoms.
fn run_analysis(
    settings: Settings,
    structure: &Path,
    field: &str,
    value: f64,
) -> Result<(), Box<dyn Error>> {
    let mut proxy = StandaloneProxy::new(settings);
    proxy.load_system(structure)?;

    let mut atoms = Vec::new();
    proxy.load_atoms(structure, &mut atoms, field, value)?;
    if atoms.is_empty() {
        return Err(format!("no atoms selected from {}", structure.display()).into());
    }
    info!("Analyzing {} atoms", atoms.len());

    let num_frames = proxy.num_frames();
    let mut session = Session::new(proxy);
    session.setup()?;

    for frame in 0..num_frames {
        session.proxy_mut().set_frame(frame)?;
        let result = session.step(|p| {
            let (com, rg) = gyration(&*p, &atoms);
            let traj = format!("{}.colvars.traj", p.output_prefix());
            let out = p.output_stream(&traj)?;
            if frame == 0 {
                writeln!(out, "# {:>8} {:>14} {:>14} {:>14} {:>14}", "frame", "com_x", "com_y", "com_z", "rg")?;
            }
            writeln!(
                out,
                "{:>10} {:>14.6} {:>14.6} {:>14.6} {:>14.6}",
                frame, com.x, com.y, com.z, rg
            )?;
            Ok(0.0)
        });
        if let Err(e) = result {
            session.report(&e);
        }
    }

    let proxy = session.finish()?;
    info!(
        "Wrote {} frames to {}.colvars.traj",
        num_frames,
        proxy.output_prefix()
    );
    Ok(())
}

/// Mass-weighted center and radius of gyration of the atoms in `slots`,
/// unwrapped around the first atom.
fn gyration<P: ColvarProxy>(proxy: &P, slots: &[usize]) -> (AtomPos, f64) {
    let mut pos: Vec<AtomPos> = slots.iter().map(|&i| proxy.get_atom_position(i)).collect();
    let reference = pos[0];
    proxy.select_closest_images(&mut pos, &reference);

    let masses: Vec<f64> = slots.iter().map(|&i| proxy.get_atom_mass(i)).collect();
    let total: f64 = masses.iter().sum();
    let com = pos
        .iter()
        .zip(&masses)
        .fold(AtomPos::zeros(), |acc, (p, m)| acc + p * *m)
        / total;
    let msd = pos
        .iter()
        .zip(&masses)
        .map(|(p, m)| m * proxy.position_dist2(&com, p))
        .sum::<f64>()
        / total;
    (com, msd.sqrt())
}
