use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::EngineParams;
use crate::phot::DetectorOverrides;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhotometryConfig {
    /// Image cube path, comma list, or '@listfile'.
    pub image_spec: String,
    /// Coordinate file with the initial centroid guess.
    pub coords: PathBuf,
    #[serde(default = "default_fwhmpsf")]
    pub fwhmpsf: f32,
    #[serde(default = "default_sigma")]
    pub sigma: f32,
    #[serde(default = "default_annulus")]
    pub annulus: f32,
    #[serde(default = "default_dannulus")]
    pub dannulus: f32,
    /// Explicit aperture radius; auto-derived via curve of growth when
    /// unset.
    pub aperture: Option<f64>,
    /// Base name for diagnostic outputs; defaults to the coordinate file
    /// name.
    pub output: Option<String>,
    /// Keep per-cube tables, light-curve plots and engine intermediates.
    #[serde(default)]
    pub diagnostic: bool,
    #[serde(default)]
    pub detector: DetectorOverrides,
}

fn default_fwhmpsf() -> f32 {
    6.0
}

fn default_sigma() -> f32 {
    10.0
}

fn default_annulus() -> f32 {
    14.0
}

fn default_dannulus() -> f32 {
    16.0
}

impl PhotometryConfig {
    pub fn new(image_spec: impl Into<String>, coords: impl Into<PathBuf>) -> Self {
        Self {
            image_spec: image_spec.into(),
            coords: coords.into(),
            fwhmpsf: default_fwhmpsf(),
            sigma: default_sigma(),
            annulus: default_annulus(),
            dannulus: default_dannulus(),
            aperture: None,
            output: None,
            diagnostic: false,
            detector: DetectorOverrides::default(),
        }
    }

    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            fwhmpsf: self.fwhmpsf,
            sigma: self.sigma,
            annulus: self.annulus,
            dannulus: self.dannulus,
        }
    }

    /// Base name used for diagnostic artifacts.
    pub fn output_base(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| self.coords.display().to_string())
    }
}
