use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{ChimeraError, Result};

pub const FITS_BLOCK_SIZE: usize = 2880;
pub const FITS_CARD_SIZE: usize = 80;
const KEYWORD_SIZE: usize = 8;

/// One 80-byte header card, kept verbatim so it can be propagated to
/// derived output files.
#[derive(Clone, Debug)]
pub struct Card {
    pub keyword: String,
    /// Trimmed value text; quotes stripped for string values.
    pub value: String,
    /// The full 80-byte card image.
    pub raw: String,
}

impl Card {
    /// Build a card holding a quoted string value.
    pub fn string(keyword: &str, value: &str) -> Self {
        let raw = format!("{:<8}= '{}'", keyword, value);
        Self {
            keyword: keyword.to_string(),
            value: value.to_string(),
            raw: pad_card(&raw),
        }
    }

    /// Build a card holding a numeric value.
    pub fn numeric(keyword: &str, value: f64) -> Self {
        let raw = format!("{:<8}= {:>20}", keyword, value);
        Self {
            keyword: keyword.to_string(),
            value: format!("{}", value),
            raw: pad_card(&raw),
        }
    }
}

fn pad_card(s: &str) -> String {
    let mut raw = s.to_string();
    raw.truncate(FITS_CARD_SIZE);
    while raw.len() < FITS_CARD_SIZE {
        raw.push(' ');
    }
    raw
}

/// Parsed FITS primary header.
#[derive(Clone, Debug)]
pub struct FitsHeader {
    pub bitpix: i32,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub bzero: f64,
    pub bscale: f64,
    pub cards: Vec<Card>,
}

impl FitsHeader {
    /// Bytes per pixel sample (1, 2, 4 or 8 depending on BITPIX).
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bitpix.unsigned_abs() / 8) as usize
    }

    /// Total bytes per frame of the cube.
    pub fn frame_byte_size(&self) -> usize {
        let pixels = (self.width as usize)
            .checked_mul(self.height as usize)
            .expect("Image dimensions too large");
        pixels
            .checked_mul(self.bytes_per_pixel())
            .expect("Frame size calculation overflow")
    }

    /// Look up a header card value by keyword.
    pub fn card(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| c.value.as_str())
    }

    /// Look up a header card and parse it as a number.
    pub fn card_f64(&self, keyword: &str) -> Option<f64> {
        // FITS doubles occasionally use 'D' exponents.
        self.card(keyword)?
            .trim()
            .replace(['D', 'd'], "E")
            .parse::<f64>()
            .ok()
    }
}

/// Memory-mapped FITS image-cube reader.
///
/// Only the primary HDU is read. Pixel values are returned in detector
/// units (ADU) with BZERO/BSCALE applied, not normalized.
pub struct FitsCube {
    mmap: Mmap,
    pub header: FitsHeader,
    data_offset: usize,
}

impl FitsCube {
    /// Open a FITS file and parse its primary header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let (header, data_offset) = parse_header(&mmap)?;

        let expected_data_size =
            data_offset + header.frame_byte_size() * header.frame_count as usize;
        if mmap.len() < expected_data_size {
            return Err(ChimeraError::InvalidFits(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            header,
            data_offset,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Get the raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(ChimeraError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = self.data_offset + index * self.header.frame_byte_size();
        let end = offset + self.header.frame_byte_size();
        Ok(&self.mmap[offset..end])
    }

    /// Read a single frame as f32 ADU values, shape = (height, width).
    pub fn read_frame(&self, index: usize) -> Result<Array2<f32>> {
        let raw = self.frame_raw(index)?;
        let h = self.header.height as usize;
        let w = self.header.width as usize;
        let bzero = self.header.bzero;
        let bscale = self.header.bscale;

        let mut data = Array2::<f32>::zeros((h, w));
        let flat = data
            .as_slice_mut()
            .expect("freshly allocated array is contiguous");

        match self.header.bitpix {
            8 => {
                for (out, &b) in flat.iter_mut().zip(raw.iter()) {
                    *out = (bzero + bscale * b as f64) as f32;
                }
            }
            16 => {
                for (i, out) in flat.iter_mut().enumerate() {
                    let v = BigEndian::read_i16(&raw[i * 2..]);
                    *out = (bzero + bscale * v as f64) as f32;
                }
            }
            32 => {
                for (i, out) in flat.iter_mut().enumerate() {
                    let v = BigEndian::read_i32(&raw[i * 4..]);
                    *out = (bzero + bscale * v as f64) as f32;
                }
            }
            -32 => {
                for (i, out) in flat.iter_mut().enumerate() {
                    let v = BigEndian::read_f32(&raw[i * 4..]);
                    *out = (bzero + bscale * v as f64) as f32;
                }
            }
            -64 => {
                for (i, out) in flat.iter_mut().enumerate() {
                    let v = BigEndian::read_f64(&raw[i * 8..]);
                    *out = (bzero + bscale * v) as f32;
                }
            }
            other => {
                return Err(ChimeraError::InvalidFits(format!(
                    "Unsupported BITPIX {}",
                    other
                )))
            }
        }

        Ok(data)
    }

    /// Iterator over all frames.
    pub fn frames(&self) -> impl Iterator<Item = Result<Array2<f32>>> + '_ {
        (0..self.frame_count()).map(move |i| self.read_frame(i))
    }
}

fn parse_header(mmap: &[u8]) -> Result<(FitsHeader, usize)> {
    if mmap.len() < FITS_BLOCK_SIZE {
        return Err(ChimeraError::InvalidFits(
            "File too small for FITS header".into(),
        ));
    }

    let mut cards = Vec::new();
    let mut offset = 0;
    let mut found_end = false;

    'blocks: while offset + FITS_BLOCK_SIZE <= mmap.len() {
        let block = &mmap[offset..offset + FITS_BLOCK_SIZE];
        offset += FITS_BLOCK_SIZE;

        for chunk in block.chunks_exact(FITS_CARD_SIZE) {
            let card = parse_card(chunk)?;
            if card.keyword == "END" {
                found_end = true;
                break 'blocks;
            }
            cards.push(card);
        }
    }

    if !found_end {
        return Err(ChimeraError::InvalidFits("Missing END card".into()));
    }

    if cards.first().map(|c| c.keyword.as_str()) != Some("SIMPLE") {
        return Err(ChimeraError::InvalidFits(
            "Missing SIMPLE card at start of header".into(),
        ));
    }

    let bitpix = require_i64(&cards, "BITPIX")? as i32;
    if !matches!(bitpix, 8 | 16 | 32 | -32 | -64) {
        return Err(ChimeraError::InvalidFits(format!(
            "Unsupported BITPIX {}",
            bitpix
        )));
    }

    let naxis = require_i64(&cards, "NAXIS")?;
    let (width, height, frame_count) = match naxis {
        2 => (
            require_i64(&cards, "NAXIS1")? as u32,
            require_i64(&cards, "NAXIS2")? as u32,
            1u32,
        ),
        3 => (
            require_i64(&cards, "NAXIS1")? as u32,
            require_i64(&cards, "NAXIS2")? as u32,
            require_i64(&cards, "NAXIS3")? as u32,
        ),
        n => {
            return Err(ChimeraError::InvalidFits(format!(
                "Unsupported NAXIS {}",
                n
            )))
        }
    };

    if width == 0 || height == 0 {
        return Err(ChimeraError::InvalidDimensions { width, height });
    }

    let bzero = lookup_f64(&cards, "BZERO").unwrap_or(0.0);
    let bscale = lookup_f64(&cards, "BSCALE").unwrap_or(1.0);

    let header = FitsHeader {
        bitpix,
        width,
        height,
        frame_count,
        bzero,
        bscale,
        cards,
    };

    Ok((header, offset))
}

fn parse_card(chunk: &[u8]) -> Result<Card> {
    let keyword = String::from_utf8_lossy(&chunk[..KEYWORD_SIZE])
        .trim()
        .to_string();

    // Only "KEYWORD = value" cards carry a value; COMMENT/HISTORY/blank
    // cards are kept verbatim with an empty value.
    let value = if chunk[8] == b'=' && chunk[9] == b' ' {
        parse_value(&String::from_utf8_lossy(&chunk[10..]))
    } else {
        String::new()
    };

    Ok(Card {
        keyword,
        value,
        raw: String::from_utf8_lossy(chunk).into_owned(),
    })
}

fn parse_value(field: &str) -> String {
    let trimmed = field.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        // String value: up to the closing quote.
        match rest.find('\'') {
            Some(end) => rest[..end].trim_end().to_string(),
            None => rest.trim_end().to_string(),
        }
    } else {
        // Numeric/logical value: up to the comment separator.
        match trimmed.find('/') {
            Some(end) => trimmed[..end].trim().to_string(),
            None => trimmed.trim().to_string(),
        }
    }
}

fn lookup_f64(cards: &[Card], keyword: &str) -> Option<f64> {
    cards
        .iter()
        .find(|c| c.keyword == keyword)
        .and_then(|c| c.value.trim().replace(['D', 'd'], "E").parse::<f64>().ok())
}

fn require_i64(cards: &[Card], keyword: &str) -> Result<i64> {
    lookup_f64(cards, keyword)
        .map(|v| v as i64)
        .ok_or_else(|| ChimeraError::InvalidFits(format!("Missing {} card", keyword)))
}
