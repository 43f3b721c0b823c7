//! IRAF/DAOPHOT bridge.
//!
//! Drives a locally installed IRAF `cl` interpreter over stdin, the same
//! way the legacy pipeline drove it through a scripting bridge. The
//! interpreter blocks until each task completes; no timeout is applied.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::engine::{EngineParams, PhotometryEngine};
use crate::error::{ChimeraError, Result};

/// Largest radius probed by the curve-of-growth ladder, in pixels.
const COG_MAX_RADIUS: u32 = 15;

/// Marginal flux gain below which the curve of growth is considered flat.
const COG_GROWTH_THRESHOLD: f64 = 0.01;

/// External photometry engine backed by the IRAF `cl` interpreter.
#[derive(Debug)]
pub struct IrafEngine {
    cl_path: String,
}

impl Default for IrafEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IrafEngine {
    pub fn new() -> Self {
        Self {
            cl_path: "cl".to_string(),
        }
    }

    /// Set a custom path to the `cl` interpreter.
    pub fn with_cl_path(mut self, path: impl Into<String>) -> Self {
        self.cl_path = path.into();
        self
    }

    /// Check whether the interpreter can be started at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.cl_path)
            .arg("-h")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .is_ok()
    }

    /// Feed a script to `cl` on stdin and capture its stdout.
    fn run_script(&self, script: &str) -> Result<String> {
        debug!(script, "Running IRAF script");

        let mut child = Command::new(&self.cl_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ChimeraError::Engine(format!("failed to start {}: {}", self.cl_path, e)))?;

        child
            .stdin
            .as_mut()
            .ok_or_else(|| ChimeraError::Engine("no stdin handle on cl process".into()))?
            .write_all(script.as_bytes())?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ChimeraError::Engine(format!(
                "cl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn phot_script(
        image_section: &str,
        coords: &Path,
        out: &Path,
        params: &EngineParams,
        apertures: &str,
    ) -> String {
        format!(
            "noao\n\
             digiphot\n\
             apphot\n\
             phot image=\"{}\" coords=\"{}\" output=\"{}\" \
             fwhmpsf={} sigma={} annulus={} dannulus={} apertures=\"{}\" \
             calgorithm=\"centroid\" interactive=no verify=no update=no verbose=no\n\
             logout\n",
            image_section,
            coords.display(),
            out.display(),
            params.fwhmpsf,
            params.sigma,
            params.annulus,
            params.dannulus,
            apertures,
        )
    }
}

impl PhotometryEngine for IrafEngine {
    /// Curve-of-growth aperture estimate: photometer the first frame with
    /// a ladder of radii and pick the smallest radius whose marginal flux
    /// gain drops below the growth threshold.
    fn estimate_aperture(
        &self,
        image: &Path,
        coords: &Path,
        params: &EngineParams,
    ) -> Result<f64> {
        let workdir = tempfile::tempdir()?;
        let out = workdir.path().join("cog.phot.1");

        let section = format!("{}[*,*,1]", image.display());
        let ladder = format!("1:{}:1", COG_MAX_RADIUS);
        self.run_script(&Self::phot_script(&section, coords, &out, params, &ladder))?;

        let dump = self.dump_fields(&out, "RAPERT,FLUX")?;
        let values: Vec<f64> = dump
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ChimeraError::Engine(format!("unparseable curve-of-growth dump: {}", e)))?;

        // The dump interleaves radii and fluxes: r1..rN f1..fN.
        let n = values.len() / 2;
        if n < 2 || values.len() % 2 != 0 {
            return Err(ChimeraError::Engine(
                "curve-of-growth dump too short".into(),
            ));
        }
        let radii = &values[..n];
        let fluxes = &values[n..];

        for i in 1..n {
            let growth = (fluxes[i] - fluxes[i - 1]) / fluxes[i].abs().max(f64::EPSILON);
            if growth < COG_GROWTH_THRESHOLD {
                info!(radius = radii[i], "Curve of growth converged");
                return Ok(radii[i]);
            }
        }

        Ok(radii[n - 1])
    }

    fn measure_frame(
        &self,
        image: &Path,
        frame_index: usize,
        coords: &Path,
        params: &EngineParams,
        aperture: f64,
        out: &Path,
    ) -> Result<()> {
        // IRAF image sections are 1-based.
        let section = format!("{}[*,*,{}]", image.display(), frame_index + 1);
        let apertures = aperture.to_string();
        self.run_script(&Self::phot_script(&section, coords, out, params, &apertures))?;

        if !out.exists() {
            return Err(ChimeraError::Engine(format!(
                "phot produced no result file at {}",
                out.display()
            )));
        }
        Ok(())
    }

    fn dump_fields(&self, result: &Path, fields: &str) -> Result<String> {
        let script = format!(
            "noao\n\
             digiphot\n\
             ptools\n\
             pdump infiles=\"{}\" fields=\"{}\" expr=yes\n\
             logout\n",
            result.display(),
            fields,
        );
        let stdout = self.run_script(&script)?;

        // Task banners precede the data; the record is the last
        // non-empty line.
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ChimeraError::Engine(format!("empty pdump output for {}", result.display())))
    }
}
