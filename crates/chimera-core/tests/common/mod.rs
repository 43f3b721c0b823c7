#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;

use chimera_core::engine::{EngineParams, PhotometryEngine};
use chimera_core::error::{ChimeraError, Result};
use chimera_core::io::fits::Card;
use chimera_core::io::fits_writer::write_cube;
use chimera_core::record::CENTROID_FIELDS;

/// Header cards shared by the synthetic test cubes.
pub fn detector_cards() -> Vec<Card> {
    vec![
        Card::string("DATE-OBS", "2015-12-20T05:22:01"),
        Card::numeric("EXPTIME", 2.0),
        Card::numeric("KINTIME", 2.0),
        Card::numeric("EPADU", 1.0),
        Card::numeric("RDNOISE", 5.0),
        Card::string("OBSERVAT", "Palomar"),
    ]
}

/// Write a synthetic BITPIX=-32 cube whose frame `j` holds the constant
/// value `base + j` everywhere.
pub fn write_constant_cube(
    path: &Path,
    width: usize,
    height: usize,
    frame_count: usize,
    base: f32,
) {
    let frames: Vec<Array2<f32>> = (0..frame_count)
        .map(|j| Array2::from_elem((height, width), base + j as f32))
        .collect();
    write_cube(path, &frames, &detector_cards()).expect("write synthetic cube");
}

/// Call log shared across the engine's `&self` methods.
#[derive(Debug, Default)]
pub struct CallLog {
    pub frames_measured: usize,
    pub estimate_calls: usize,
    /// Content of the coordinate file at each measure_frame invocation.
    pub coords_seen: Vec<String>,
}

/// Test double for the external engine: returns fixed, literal text
/// records in call order instead of running IRAF.
pub struct ScriptedEngine {
    /// One `DUMP_FIELDS`-order line per measured frame, across all cubes.
    pub dump_lines: Vec<String>,
    /// Radius returned by the curve-of-growth estimator.
    pub aperture: f64,
    pub calls: Mutex<CallLog>,
}

impl ScriptedEngine {
    pub fn new(dump_lines: Vec<String>) -> Self {
        Self {
            dump_lines,
            aperture: 5.0,
            calls: Mutex::new(CallLog::default()),
        }
    }
}

impl PhotometryEngine for ScriptedEngine {
    fn estimate_aperture(
        &self,
        _image: &Path,
        _coords: &Path,
        _params: &EngineParams,
    ) -> Result<f64> {
        self.calls.lock().unwrap().estimate_calls += 1;
        Ok(self.aperture)
    }

    fn measure_frame(
        &self,
        _image: &Path,
        _frame_index: usize,
        coords: &Path,
        _params: &EngineParams,
        _aperture: f64,
        out: &Path,
    ) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        let line = self
            .dump_lines
            .get(calls.frames_measured)
            .ok_or_else(|| ChimeraError::Engine("scripted engine ran out of records".into()))?
            .clone();
        calls.coords_seen.push(fs::read_to_string(coords)?);
        calls.frames_measured += 1;
        fs::write(out, line)?;
        Ok(())
    }

    fn dump_fields(&self, result: &Path, fields: &str) -> Result<String> {
        let line = fs::read_to_string(result)?;
        let line = line.trim();
        if fields == CENTROID_FIELDS {
            let mut tokens = line.split_whitespace();
            let x = tokens.next().unwrap_or("0");
            let y = tokens.next().unwrap_or("0");
            Ok(format!("{} {}", x, y))
        } else {
            Ok(line.to_string())
        }
    }
}

/// A coordinate file plus a matching scratch path helper.
pub fn write_coords_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write coords file");
    path
}
