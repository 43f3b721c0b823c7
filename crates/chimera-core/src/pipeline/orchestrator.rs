use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use crate::cutout::cutout_frame;
use crate::engine::PhotometryEngine;
use crate::error::Result;
use crate::io::fits::{Card, FitsCube};
use crate::io::fits_writer::write_cube;
use crate::io::table::write_records;
use crate::phot::{reduce_frame, DetectorParams};
use crate::plot::plot_light_curve;
use crate::record::{parse_dump_line, PhotometryRecord, CENTROID_FIELDS, DUMP_FIELDS};
use crate::resolve::{expand_image_spec, CoordScratch};

use super::config::PhotometryConfig;

/// Per-frame progress notification.
#[derive(Clone, Copy, Debug)]
pub struct FrameProgress {
    pub cube_index: usize,
    pub cube_count: usize,
    pub frame_index: usize,
    pub frame_count: usize,
}

/// Everything a run produces, for callers that want to inspect it.
#[derive(Debug)]
pub struct PipelineOutput {
    pub records: Vec<PhotometryRecord>,
    pub table_path: PathBuf,
    pub cutout_path: PathBuf,
    pub aperture: f64,
    pub cube_count: usize,
}

/// Run the full photometry pipeline: resolve inputs, drive the engine
/// over every frame of every cube, aggregate the records, and write the
/// output artifacts.
///
/// Strictly sequential: the coordinate scratch file written after frame N
/// is the starting guess for frame N+1.
pub fn run_photometry(
    config: &PhotometryConfig,
    engine: &dyn PhotometryEngine,
    mut progress: impl FnMut(FrameProgress),
) -> Result<PipelineOutput> {
    let cubes = expand_image_spec(&config.image_spec)?;
    let scratch = CoordScratch::create(&config.coords)?;
    let engine_params = config.engine_params();

    let mut aperture = config.aperture;
    let mut first_cards: Vec<Card> = Vec::new();
    let mut all_records: Vec<PhotometryRecord> = Vec::new();
    let mut cutouts: Vec<Array2<f32>> = Vec::new();

    for (cube_index, cube_path) in cubes.iter().enumerate() {
        info!(cube = %cube_path.display(), "Processing science image");

        let cube = FitsCube::open(cube_path)?;
        let detector = DetectorParams::from_header(&cube.header, &config.detector)?;

        if cube_index == 0 {
            first_cards = cube.header.cards.clone();
        }

        // Aperture radius is derived once, from the first cube, and
        // reused for the rest of the run.
        let radius = match aperture {
            Some(r) => r,
            None => {
                let r = engine.estimate_aperture(cube_path, &config.coords, &engine_params)?;
                info!(radius = r, "Nominal aperture radius");
                aperture = Some(r);
                r
            }
        };

        let frame_count = cube.frame_count();
        let mut cube_records: Vec<PhotometryRecord> = Vec::with_capacity(frame_count);
        let mut intermediates: Vec<PathBuf> = Vec::with_capacity(frame_count);

        for frame_index in 0..frame_count {
            debug!(frame = frame_index + 1, "Processing frame");

            let result_file = phot_result_path(cube_path, frame_index);
            engine.measure_frame(
                cube_path,
                frame_index,
                scratch.path(),
                &engine_params,
                radius,
                &result_file,
            )?;

            // Feed the measured centroid back as the next frame's guess.
            let centroid = engine.dump_fields(&result_file, CENTROID_FIELDS)?;
            scratch.write_centroid(&centroid)?;

            let line = engine.dump_fields(&result_file, DUMP_FIELDS)?;
            let dump = parse_dump_line(&line, &result_file)?;
            let record = reduce_frame(&dump, frame_index, &detector);

            let frame = cube.read_frame(frame_index)?;
            cutouts.push(cutout_frame(&frame, dump.xcen, dump.ycen));

            cube_records.push(record);
            intermediates.push(result_file);

            progress(FrameProgress {
                cube_index,
                cube_count: cubes.len(),
                frame_index,
                frame_count,
            });
        }

        if config.diagnostic {
            write_cube_diagnostics(config, cube_path, &cube_records, detector.kintime)?;
        } else {
            for file in &intermediates {
                if file.exists() {
                    fs::remove_file(file)?;
                }
            }
        }

        all_records.extend(cube_records);
    }

    info!(records = all_records.len(), "Saving consolidated photometry data");
    let table_path = PathBuf::from(format!("{}_total.phot.csv", config.coords.display()));
    write_records(&table_path, &all_records)?;

    let cutout_path = PathBuf::from(format!("{}_obj.fits", config.coords.display()));
    write_cube(&cutout_path, &cutouts, &first_cards)?;

    scratch.remove()?;

    Ok(PipelineOutput {
        records: all_records,
        table_path,
        cutout_path,
        aperture: aperture.expect("aperture resolved on first cube"),
        cube_count: cubes.len(),
    })
}

/// Result-file path for one frame, next to the source cube.
fn phot_result_path(cube: &Path, frame_index: usize) -> PathBuf {
    let stem = cube.with_extension("");
    PathBuf::from(format!("{}_{}.phot.1", stem.display(), frame_index))
}

fn write_cube_diagnostics(
    config: &PhotometryConfig,
    cube_path: &Path,
    records: &[PhotometryRecord],
    kintime: f32,
) -> Result<()> {
    let base = config.output_base();
    let stem = cube_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cube".to_string());

    let table = PathBuf::from(format!("{}_{}.phot.csv", base, stem));
    info!(table = %table.display(), "Saving per-cube photometry table");
    write_records(&table, records)?;

    let plot = PathBuf::from(format!("{}_{}_lc.png", base, stem));
    info!(plot = %plot.display(), "Plotting normalized light curve");
    plot_light_curve(records, kintime, &plot)?;

    Ok(())
}
