use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{ChimeraError, Result};
use crate::io::fits::FitsHeader;
use crate::record::{AperDump, PhotometryRecord};

/// Detector and exposure parameters of one cube, read from its header
/// with optional user overrides.
#[derive(Clone, Debug)]
pub struct DetectorParams {
    /// Gain in electrons per ADU.
    pub epadu: f32,
    /// Read noise in electrons.
    pub rdnoise: f32,
    /// Photometric zero point.
    pub zmag: f32,
    /// Exposure time of a single frame in seconds.
    pub exptime: f32,
    /// Kinetic cycle time (frame-to-frame cadence) in seconds.
    pub kintime: f32,
    /// UTC start time of the first frame.
    pub start_time: NaiveDateTime,
}

/// User-supplied overrides for header-derived detector parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectorOverrides {
    pub epadu: Option<f32>,
    pub rdnoise: Option<f32>,
    pub zmag: Option<f32>,
}

const DEFAULT_EPADU: f32 = 1.0;
const DEFAULT_RDNOISE: f32 = 0.0;
const DEFAULT_ZMAG: f32 = 25.0;

impl DetectorParams {
    /// Derive parameters from a cube header, falling back to conservative
    /// defaults and applying any user overrides on top.
    pub fn from_header(header: &FitsHeader, overrides: &DetectorOverrides) -> Result<Self> {
        let exptime = header
            .card_f64("EXPTIME")
            .or_else(|| header.card_f64("EXPOSURE"))
            .unwrap_or(1.0) as f32;
        let kintime = header
            .card_f64("KINTIME")
            .or_else(|| header.card_f64("KCT"))
            .unwrap_or(exptime as f64) as f32;
        let epadu = overrides.epadu.unwrap_or_else(|| {
            header
                .card_f64("EPADU")
                .or_else(|| header.card_f64("GAIN"))
                .unwrap_or(DEFAULT_EPADU as f64) as f32
        });
        let rdnoise = overrides.rdnoise.unwrap_or_else(|| {
            header.card_f64("RDNOISE").unwrap_or(DEFAULT_RDNOISE as f64) as f32
        });
        let zmag = overrides.zmag.unwrap_or(DEFAULT_ZMAG);

        Ok(Self {
            epadu,
            rdnoise,
            zmag,
            exptime,
            kintime,
            start_time: parse_start_time(header)?,
        })
    }
}

/// Parse the cube start time from DATE-OBS, optionally combined with
/// TIME-OBS or UTCSTART when DATE-OBS carries the date only.
pub fn parse_start_time(header: &FitsHeader) -> Result<NaiveDateTime> {
    let date_obs = header
        .card("DATE-OBS")
        .ok_or_else(|| ChimeraError::InvalidFits("Missing DATE-OBS card".into()))?;

    if let Ok(dt) = NaiveDateTime::parse_from_str(date_obs, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(date_obs, "%Y-%m-%d").map_err(|_| {
        ChimeraError::InvalidFits(format!("Unparseable DATE-OBS '{}'", date_obs))
    })?;

    let time = header
        .card("TIME-OBS")
        .or_else(|| header.card("UTCSTART"))
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S%.f").ok())
        .unwrap_or(NaiveTime::MIN);

    Ok(date.and_time(time))
}

/// Convert a raw ADU flux to electrons.
pub fn flux_electrons(flux_adu: f32, epadu: f32) -> f32 {
    flux_adu * epadu
}

/// Instrumental magnitude from the electron flux and exposure time.
/// Undefined (NaN/inf) only when the flux is non-positive.
pub fn instrumental_magnitude(flux_elec: f32, exptime: f32, zmag: f32) -> f32 {
    zmag - 2.5 * (flux_elec / exptime).log10()
}

/// Propagated CCD aperture-photometry flux error: Poisson signal plus sky
/// background and read noise, scaled by the aperture area and the ratio of
/// aperture area to sky-annulus pixel count.
pub fn flux_error(
    flux_elec: f32,
    area: f32,
    nsky: i32,
    msky: f32,
    epadu: f32,
    rdnoise: f32,
) -> f32 {
    let nsky = nsky as f32;
    (flux_elec + area * (1.0 + area / nsky) * (msky * epadu + rdnoise * rdnoise)).sqrt()
}

/// ISO-8601 timestamp of frame `frame_index`, offset from the cube start
/// time by whole kinetic cycles.
pub fn frame_timestamp(start: NaiveDateTime, frame_index: usize, kintime: f32) -> String {
    let offset_us = (frame_index as f64 * kintime as f64 * 1e6).round() as i64;
    let ts = start + Duration::microseconds(offset_us);
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Build the full per-frame record from a raw engine dump and the cube's
/// detector parameters.
pub fn reduce_frame(dump: &AperDump, frame_index: usize, params: &DetectorParams) -> PhotometryRecord {
    let flux_elec = flux_electrons(dump.flux_adu, params.epadu);
    PhotometryRecord {
        datetime: frame_timestamp(params.start_time, frame_index, params.kintime),
        xcen: dump.xcen,
        ycen: dump.ycen,
        cier: dump.cier,
        msky: dump.msky,
        stdev: dump.stdev,
        nsky: dump.nsky,
        sier: dump.sier,
        sum: dump.sum,
        area: dump.area,
        flux_adu: dump.flux_adu,
        flux_elec,
        ferr: flux_error(
            flux_elec,
            dump.area,
            dump.nsky,
            dump.msky,
            params.epadu,
            params.rdnoise,
        ),
        mag: instrumental_magnitude(flux_elec, params.exptime, params.zmag),
        merr: dump.merr,
        pier: dump.pier,
    }
}
