// Standalone host driven through a session over a multi-model PDB file
use cvproxy::atoms::AtomSlots;
use cvproxy::checkpoint::Checkpoint;
use cvproxy::prelude::*;
use cvproxy::session::Session;
use cvproxy::standalone::StandaloneProxy;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

const TRAJECTORY: &str = "\
REMARK   water dimer, three frames
MODEL        1
ATOM      1  OW  WAT W   1       0.000   0.000   0.000  1.00  1.00      SOLV O
ATOM      2  HW1 WAT W   1       0.957   0.000   0.000  1.00  0.00      SOLV H
ATOM      3  OW  WAT W   2       3.000   0.000   0.000  1.00  1.00      SOLV O
ENDMDL
MODEL        2
ATOM      1  OW  WAT W   1       0.000   0.000   0.000  1.00  1.00      SOLV O
ATOM      2  HW1 WAT W   1       0.957   0.000   0.000  1.00  0.00      SOLV H
ATOM      3  OW  WAT W   2       4.000   0.000   0.000  1.00  1.00      SOLV O
ENDMDL
MODEL        3
ATOM      1  OW  WAT W   1       0.000   0.000   0.000  1.00  1.00      SOLV O
ATOM      2  HW1 WAT W   1       0.957   0.000   0.000  1.00  0.00      SOLV H
ATOM      3  OW  WAT W   2       5.000   0.000   0.000  1.00  1.00      SOLV O
ENDMDL
END
";

fn settings_for(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.simulation.seed = Some(1);
    settings.simulation.restart_frequency = 2;
    settings.io.output_prefix = dir.join("dimer").display().to_string();
    settings
}

fn write_trajectory(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("dimer.pdb");
    fs::write(&path, TRAJECTORY).unwrap();
    path
}

/// Oxygen-oxygen distance for each frame, written to the trajectory channel.
fn run_distance(session: &mut Session<StandaloneProxy>, pair: &[usize], frames: usize) {
    for frame in 0..frames {
        session.proxy_mut().set_frame(frame).unwrap();
        session
            .step(|p| {
                let d = p
                    .position_distance(&p.get_atom_position(pair[0]), &p.get_atom_position(pair[1]))
                    .norm();
                let name = format!("{}.colvars.traj", p.output_prefix());
                writeln!(p.output_stream(&name)?, "{} {:.3}", frame, d)?;
                p.apply_atom_force(pair[1], &RVector::new(-d, 0.0, 0.0));
                Ok(0.5 * d * d)
            })
            .unwrap();
        session.proxy_mut().take_colvar_forces();
    }
}

#[test]
fn test_distance_over_frames() {
    let temp_dir = TempDir::new().unwrap();
    let pdb = write_trajectory(temp_dir.path());

    let mut proxy = StandaloneProxy::new(settings_for(temp_dir.path()));
    proxy.load_system(&pdb).unwrap();
    let mut pair = Vec::new();
    proxy.load_atoms(&pdb, &mut pair, "B", 1.0).unwrap();
    assert_eq!(pair.len(), 2);

    let mut session = Session::new(proxy);
    session.setup().unwrap();
    run_distance(&mut session, &pair, 3);

    assert_eq!(session.steps(), 3);
    assert!((session.total_energy() - 0.5 * (9.0 + 16.0 + 25.0)).abs() < 1e-9);

    let proxy = session.finish().unwrap();
    let traj = fs::read_to_string(format!("{}.colvars.traj", proxy.output_prefix())).unwrap();
    assert_eq!(traj, "0 3.000\n1 4.000\n2 5.000\n");
}

#[test]
fn test_restart_snapshot_restores_frame_and_slots() {
    let temp_dir = TempDir::new().unwrap();
    let pdb = write_trajectory(temp_dir.path());

    let mut proxy = StandaloneProxy::new(settings_for(temp_dir.path()));
    proxy.load_system(&pdb).unwrap();
    let mut pair = Vec::new();
    proxy.load_atoms(&pdb, &mut pair, "B", 1.0).unwrap();

    let mut session = Session::new(proxy);
    session.setup().unwrap();
    run_distance(&mut session, &pair, 2);

    let restart = session.restart_path();
    let snapshot = Checkpoint::load(&restart).unwrap();
    assert_eq!(snapshot.step, 2);
    assert_eq!(snapshot.frame, Some(1));
    assert_eq!(snapshot.slots.len(), 2);
    session.finish().unwrap();

    let mut fresh = StandaloneProxy::new(settings_for(temp_dir.path()));
    fresh.load_system(&pdb).unwrap();
    let mut resumed = Session::new(fresh);
    resumed.restore(&restart).unwrap();

    assert_eq!(resumed.steps(), 2);
    assert_eq!(resumed.proxy().frame().unwrap(), 1);
    assert_eq!(resumed.proxy().get_atom_id(pair[1]), 2);
    assert_eq!(
        resumed.proxy().get_atom_position(pair[1]),
        AtomPos::new(4.0, 0.0, 0.0)
    );
}

#[test]
fn test_second_snapshot_backs_up_the_first() {
    let temp_dir = TempDir::new().unwrap();
    let pdb = write_trajectory(temp_dir.path());

    let mut settings = settings_for(temp_dir.path());
    settings.simulation.restart_frequency = 1;
    let mut proxy = StandaloneProxy::new(settings);
    proxy.load_system(&pdb).unwrap();
    let slot = proxy.init_atom(3).unwrap();

    let mut session = Session::new(proxy);
    session.step(|_| Ok(0.0)).unwrap();
    session.proxy_mut().clear_atom(slot).unwrap();
    session.step(|_| Ok(0.0)).unwrap();

    let restart = session.restart_path();
    let mut backup = restart.clone().into_os_string();
    backup.push(".BAK");

    assert_eq!(Checkpoint::load(&restart).unwrap().slots[0].ncopies, 0);
    assert_eq!(Checkpoint::load(Path::new(&backup)).unwrap().slots[0].ncopies, 1);
}

#[test]
fn test_xyz_system_rejects_field_selection() {
    let temp_dir = TempDir::new().unwrap();
    let xyz = temp_dir.path().join("water.xyz");
    fs::write(
        &xyz,
        "3\nwater\nO 0.000 0.000 0.000\nH 0.957 0.000 0.000\nH -0.240 0.927 0.000\n",
    )
    .unwrap();

    let mut proxy = StandaloneProxy::new(settings_for(temp_dir.path()));
    proxy.load_system(&xyz).unwrap();

    let mut atoms = Vec::new();
    assert!(matches!(
        proxy.load_atoms(&xyz, &mut atoms, "B", 1.0),
        Err(ProxyError::Input(_))
    ));
    proxy.load_atoms(&xyz, &mut atoms, "", 0.0).unwrap();
    assert_eq!(atoms.len(), 3);
    assert!((proxy.get_atom_mass(atoms[1]) - 1.008).abs() < 1e-9);
    assert!(proxy.set_frame(1).is_err());
}

fn loaded_session(dir: &Path) -> Session<StandaloneProxy> {
    let pdb = write_trajectory(dir);
    let mut proxy = StandaloneProxy::new(settings_for(dir));
    proxy.load_system(&pdb).unwrap();
    proxy.init_atom(1).unwrap();
    proxy.init_atom(3).unwrap();
    Session::new(proxy)
}

#[test]
fn test_restore_rejects_atoms_beyond_system() {
    let temp_dir = TempDir::new().unwrap();
    let mut slots = AtomSlots::new();
    slots.add_atom_slot(10);
    let snapshot = temp_dir.path().join("large.cvproxy.json");
    Checkpoint::new(4, Some(0), 1.0, &slots).save(&snapshot).unwrap();

    let mut session = loaded_session(temp_dir.path());
    let err = session.restore(&snapshot).unwrap_err();

    assert!(matches!(err, ProxyError::Input(_)));
    assert_eq!(session.steps(), 0);
    assert_eq!(session.proxy().state().atoms.len(), 2);
    assert_eq!(session.proxy().get_atom_id(1), 2);
}

#[test]
fn test_failed_frame_restore_keeps_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut slots = AtomSlots::new();
    slots.add_atom_slot(0);
    let snapshot = temp_dir.path().join("late.cvproxy.json");
    Checkpoint::new(7, Some(5), 3.5, &slots).save(&snapshot).unwrap();

    let mut session = loaded_session(temp_dir.path());
    session.proxy_mut().set_frame(2).unwrap();
    let err = session.restore(&snapshot).unwrap_err();

    assert!(matches!(err, ProxyError::NoSuchFrame(5)));
    assert_eq!(session.steps(), 0);
    assert_eq!(session.total_energy(), 0.0);
    assert_eq!(session.proxy().state().atoms.len(), 2);
    assert_eq!(session.proxy().frame().unwrap(), 2);
}
