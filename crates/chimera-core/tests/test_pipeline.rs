mod common;

use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;

use chimera_core::error::ChimeraError;
use chimera_core::io::fits::FitsCube;
use chimera_core::io::table::read_records;
use chimera_core::pipeline::{run_photometry, PhotometryConfig};
use chimera_core::record::MERR_UNDEFINED;

use common::{write_constant_cube, write_coords_file, ScriptedEngine};

fn dump_line(xcen: f32, ycen: f32, flux: f32, merr: &str) -> String {
    format!(
        "{} {} 0 100.0 5.0 200 0 61000.0 78.5 {} {} 0",
        xcen, ycen, flux, merr
    )
}

fn scratch_path(coords: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", coords.display()))
}

#[test]
fn test_three_frame_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cube = dir.path().join("cube.fits");
    write_constant_cube(&cube, 64, 64, 3, 7.0);
    let coords = write_coords_file(dir.path(), "coords.txt", "32.0 30.0\n");

    let engine = ScriptedEngine::new(vec![
        dump_line(32.1, 30.2, 50000.0, "0.012"),
        dump_line(32.4, 30.6, 51000.0, "INDEF"),
        dump_line(32.8, 31.0, 49000.0, "0.015"),
    ]);

    let mut config = PhotometryConfig::new(cube.display().to_string(), &coords);
    config.aperture = Some(5.0);

    let mut seen = Vec::new();
    let output = run_photometry(&config, &engine, |p| seen.push(p.frame_index)).unwrap();

    assert_eq!(output.records.len(), 3);
    assert_eq!(output.aperture, 5.0);
    assert_eq!(output.cube_count, 1);
    assert_eq!(seen, vec![0, 1, 2]);

    // Explicit aperture: the curve-of-growth estimator is never invoked.
    assert_eq!(engine.calls.lock().unwrap().estimate_calls, 0);

    // Derived arithmetic against the closed-form expressions
    // (epadu=1, rdnoise=5, zmag=25, exptime=2 from the synthetic header).
    let r0 = &output.records[0];
    assert_eq!(r0.flux_elec, 50000.0);
    assert_relative_eq!(
        r0.mag,
        25.0 - 2.5 * (50000.0f32 / 2.0).log10(),
        epsilon = 1e-5
    );
    let area = 78.5f32;
    let expected_ferr =
        (50000.0 + area * (1.0 + area / 200.0) * (100.0 + 25.0)).sqrt();
    assert_relative_eq!(r0.ferr, expected_ferr, epsilon = 1e-3);

    // Timestamps step by the kinetic cycle time.
    assert_eq!(r0.datetime, "2015-12-20T05:22:01");
    assert_eq!(output.records[1].datetime, "2015-12-20T05:22:03");
    assert_eq!(output.records[2].datetime, "2015-12-20T05:22:05");

    // INDEF magnitude error maps to the sentinel, never a parse failure.
    assert_eq!(output.records[1].merr, MERR_UNDEFINED);

    // Centroid tracking: frame N+1 starts from frame N's measurement.
    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.coords_seen[0].trim(), "32.0 30.0");
    assert_eq!(calls.coords_seen[1].trim(), "32.1 30.2");
    assert_eq!(calls.coords_seen[2].trim(), "32.4 30.6");
    drop(calls);

    // The scratch file is gone, the original coordinates untouched.
    assert!(!scratch_path(&coords).exists());
    assert_eq!(fs::read_to_string(&coords).unwrap(), "32.0 30.0\n");

    // Aggregate table round trip preserves order, types and row count.
    assert_eq!(
        output.table_path,
        PathBuf::from(format!("{}_total.phot.csv", coords.display()))
    );
    let reread = read_records(&output.table_path).unwrap();
    assert_eq!(reread, output.records);

    // Cutout stack: one 51x51 patch per frame, header cards propagated.
    let obj = FitsCube::open(&output.cutout_path).unwrap();
    assert_eq!(obj.frame_count(), 3);
    assert_eq!(obj.header.width, 51);
    assert_eq!(obj.header.height, 51);
    assert_eq!(obj.header.card("OBSERVAT"), Some("Palomar"));
    let patch = obj.read_frame(1).unwrap();
    assert_eq!(patch[[25, 25]], 8.0); // frame 1 of the constant cube

    // Non-diagnostic mode leaves no engine intermediates behind.
    for j in 0..3 {
        assert!(!dir.path().join(format!("cube_{}.phot.1", j)).exists());
    }
}

#[test]
fn test_aperture_estimated_once_across_cubes() {
    let dir = tempfile::tempdir().unwrap();
    let cube_a = dir.path().join("a.fits");
    let cube_b = dir.path().join("b.fits");
    write_constant_cube(&cube_a, 64, 64, 2, 1.0);
    write_constant_cube(&cube_b, 64, 64, 2, 5.0);
    let coords = write_coords_file(dir.path(), "coords.txt", "32.0 32.0\n");

    let engine = ScriptedEngine::new(vec![
        dump_line(32.0, 32.0, 40000.0, "0.01"),
        dump_line(32.1, 32.1, 40100.0, "0.01"),
        dump_line(32.2, 32.2, 40200.0, "0.01"),
        dump_line(32.3, 32.3, 40300.0, "0.01"),
    ]);

    let spec = format!("{},{}", cube_a.display(), cube_b.display());
    let config = PhotometryConfig::new(spec, &coords);
    let output = run_photometry(&config, &engine, |_| {}).unwrap();

    assert_eq!(engine.calls.lock().unwrap().estimate_calls, 1);
    assert_eq!(output.aperture, 5.0);

    // Cube-then-frame order is preserved in the aggregate.
    assert_eq!(output.records.len(), 4);
    let xcens: Vec<f32> = output.records.iter().map(|r| r.xcen).collect();
    assert_eq!(xcens, vec![32.0, 32.1, 32.2, 32.3]);

    // Tracking carries across the cube boundary.
    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.coords_seen[2].trim(), "32.1 32.1");
}

#[test]
fn test_missing_cube_fails_before_any_processing() {
    let dir = tempfile::tempdir().unwrap();
    let cube_a = dir.path().join("a.fits");
    write_constant_cube(&cube_a, 64, 64, 2, 1.0);
    let missing = dir.path().join("gone.fits");
    let coords = write_coords_file(dir.path(), "coords.txt", "32.0 32.0\n");

    let list = dir.path().join("cubes.lst");
    fs::write(
        &list,
        format!("{}\n{}\n", cube_a.display(), missing.display()),
    )
    .unwrap();

    let engine = ScriptedEngine::new(vec![dump_line(32.0, 32.0, 40000.0, "0.01")]);
    let config = PhotometryConfig::new(format!("@{}", list.display()), &coords);

    assert!(matches!(
        run_photometry(&config, &engine, |_| {}),
        Err(ChimeraError::MissingFile(_))
    ));
    assert_eq!(engine.calls.lock().unwrap().frames_measured, 0);
    assert!(!scratch_path(&coords).exists());
}

#[test]
fn test_missing_coords_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let cube = dir.path().join("cube.fits");
    write_constant_cube(&cube, 64, 64, 1, 1.0);

    let engine = ScriptedEngine::new(vec![]);
    let config = PhotometryConfig::new(
        cube.display().to_string(),
        dir.path().join("absent.txt"),
    );

    assert!(matches!(
        run_photometry(&config, &engine, |_| {}),
        Err(ChimeraError::MissingFile(_))
    ));
}

#[test]
fn test_diagnostic_mode_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let cube = dir.path().join("cube.fits");
    write_constant_cube(&cube, 64, 64, 2, 1.0);
    let coords = write_coords_file(dir.path(), "coords.txt", "32.0 32.0\n");

    let engine = ScriptedEngine::new(vec![
        dump_line(32.0, 32.0, 40000.0, "0.01"),
        dump_line(32.1, 32.1, 40100.0, "0.01"),
    ]);

    let mut config = PhotometryConfig::new(cube.display().to_string(), &coords);
    config.aperture = Some(5.0);
    config.diagnostic = true;
    run_photometry(&config, &engine, |_| {}).unwrap();

    let base = coords.display().to_string();
    let table = PathBuf::from(format!("{}_cube.phot.csv", base));
    let plot = PathBuf::from(format!("{}_cube_lc.png", base));
    assert!(table.exists());
    assert!(plot.exists());
    assert_eq!(read_records(&table).unwrap().len(), 2);

    // Engine intermediates are retained in diagnostic mode.
    assert!(dir.path().join("cube_0.phot.1").exists());
    assert!(dir.path().join("cube_1.phot.1").exists());

    // The scratch file is still removed.
    assert!(!scratch_path(&coords).exists());
}

#[test]
fn test_malformed_engine_record_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cube = dir.path().join("cube.fits");
    write_constant_cube(&cube, 64, 64, 2, 1.0);
    let coords = write_coords_file(dir.path(), "coords.txt", "32.0 32.0\n");

    let engine = ScriptedEngine::new(vec!["32.0 32.0 0 not-enough-fields".to_string()]);
    let mut config = PhotometryConfig::new(cube.display().to_string(), &coords);
    config.aperture = Some(5.0);

    assert!(matches!(
        run_photometry(&config, &engine, |_| {}),
        Err(ChimeraError::MalformedRecord { .. })
    ));

    // No aggregate output is written on failure.
    assert!(!PathBuf::from(format!("{}_total.phot.csv", coords.display())).exists());
}
