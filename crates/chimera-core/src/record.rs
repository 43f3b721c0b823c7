use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChimeraError, Result};

/// Columns extracted from the engine's result file, in dump order.
pub const DUMP_FIELDS: &str = "XCEN,YCEN,CIER,MSKY,STDEV,NSKY,SIER,SUM,AREA,FLUX,MERR,PIER";

/// Centroid-only dump used for frame-to-frame tracking.
pub const CENTROID_FIELDS: &str = "XCEN,YCEN";

const DUMP_TOKEN_COUNT: usize = 12;

/// Sentinel stored when the engine reports an undefined magnitude error
/// (the literal token "INDEF").
pub const MERR_UNDEFINED: f32 = -10.0;

/// One fully reduced measurement of one cube frame. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct PhotometryRecord {
    /// ISO-8601 frame mid-exposure start time.
    pub datetime: String,
    pub xcen: f32,
    pub ycen: f32,
    /// Centering error code from the engine.
    pub cier: i32,
    pub msky: f32,
    pub stdev: f32,
    pub nsky: i32,
    /// Sky-fitting error code from the engine.
    pub sier: i32,
    pub sum: f32,
    pub area: f32,
    pub flux_adu: f32,
    pub flux_elec: f32,
    pub ferr: f32,
    pub mag: f32,
    pub merr: f32,
    /// Aperture-photometry error code from the engine.
    pub pier: i32,
}

/// Raw per-frame measurement parsed from the engine's field dump, before
/// any derived quantities are computed.
#[derive(Clone, Debug, PartialEq)]
pub struct AperDump {
    pub xcen: f32,
    pub ycen: f32,
    pub cier: i32,
    pub msky: f32,
    pub stdev: f32,
    pub nsky: i32,
    pub sier: i32,
    pub sum: f32,
    pub area: f32,
    pub flux_adu: f32,
    pub merr: f32,
    pub pier: i32,
}

/// Parse one whitespace-delimited dump line in `DUMP_FIELDS` order.
///
/// Any missing or unparseable token is fatal, with one exception: the
/// literal "INDEF" in the MERR position maps to `MERR_UNDEFINED`.
pub fn parse_dump_line(line: &str, source: &Path) -> Result<AperDump> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != DUMP_TOKEN_COUNT {
        return Err(ChimeraError::MalformedRecord {
            file: source.to_path_buf(),
            detail: format!(
                "expected {} fields, got {}",
                DUMP_TOKEN_COUNT,
                tokens.len()
            ),
        });
    }

    let merr = if tokens[10] == "INDEF" {
        MERR_UNDEFINED
    } else {
        field(&tokens, 10, "MERR", source)?
    };

    Ok(AperDump {
        xcen: field(&tokens, 0, "XCEN", source)?,
        ycen: field(&tokens, 1, "YCEN", source)?,
        cier: field(&tokens, 2, "CIER", source)?,
        msky: field(&tokens, 3, "MSKY", source)?,
        stdev: field(&tokens, 4, "STDEV", source)?,
        nsky: field(&tokens, 5, "NSKY", source)?,
        sier: field(&tokens, 6, "SIER", source)?,
        sum: field(&tokens, 7, "SUM", source)?,
        area: field(&tokens, 8, "AREA", source)?,
        flux_adu: field(&tokens, 9, "FLUX", source)?,
        merr,
        pier: field(&tokens, 11, "PIER", source)?,
    })
}

fn field<T: std::str::FromStr>(
    tokens: &[&str],
    index: usize,
    name: &str,
    source: &Path,
) -> Result<T> {
    tokens[index].parse::<T>().map_err(|_| {
        ChimeraError::MalformedRecord {
            file: source.to_path_buf(),
            detail: format!("unparseable {} value '{}'", name, tokens[index]),
        }
    })
}
