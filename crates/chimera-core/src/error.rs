use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChimeraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing input file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Malformed photometry record from {}: {detail}", .file.display())]
    MalformedRecord { file: PathBuf, detail: String },

    #[error("Photometry engine error: {0}")]
    Engine(String),

    #[error("Record table error: {0}")]
    Table(#[from] csv::Error),

    #[error("Plot rendering error: {0}")]
    Plot(String),

    #[error("Empty image sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, ChimeraError>;
