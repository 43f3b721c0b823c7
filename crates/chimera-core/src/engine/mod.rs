pub mod iraf;

use std::path::Path;

use crate::error::Result;

/// Sky, PSF and annulus parameters passed through to the engine.
#[derive(Clone, Debug)]
pub struct EngineParams {
    /// FWHM of the stellar PSF in pixels.
    pub fwhmpsf: f32,
    /// Sky background sigma.
    pub sigma: f32,
    /// Inner sky-annulus radius in pixels.
    pub annulus: f32,
    /// Width of the sky annulus in pixels.
    pub dannulus: f32,
}

/// The narrow interface to the external photometry engine.
///
/// Every invocation blocks until the engine finishes; no timeout is
/// applied, and any engine failure aborts the whole run.
pub trait PhotometryEngine {
    /// Estimate an aperture radius via the engine's curve-of-growth
    /// routine, given an image cube and an initial coordinate file.
    fn estimate_aperture(&self, image: &Path, coords: &Path, params: &EngineParams)
        -> Result<f64>;

    /// Run aperture photometry on one frame of a cube (0-based index),
    /// writing an opaque result file at `out`. The engine re-centers on
    /// the source starting from the coordinates in `coords`.
    #[allow(clippy::too_many_arguments)]
    fn measure_frame(
        &self,
        image: &Path,
        frame_index: usize,
        coords: &Path,
        params: &EngineParams,
        aperture: f64,
        out: &Path,
    ) -> Result<()>;

    /// Dump the named comma-separated fields from a result file as one
    /// whitespace-delimited text line.
    fn dump_fields(&self, result: &Path, fields: &str) -> Result<String>;
}
