use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use ndarray::Array2;

use crate::error::{ChimeraError, Result};
use crate::io::fits::{Card, FITS_BLOCK_SIZE, FITS_CARD_SIZE};

/// Keywords owned by the writer; propagated cards with these keywords are
/// dropped so they cannot contradict the structure of the new file.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE", "END",
];

/// Write a stack of frames as a BITPIX=-32 FITS cube, carrying over the
/// given header cards (typically those of the source cube).
pub fn write_cube(path: &Path, frames: &[Array2<f32>], cards: &[Card]) -> Result<()> {
    let first = frames.first().ok_or(ChimeraError::EmptySequence)?;
    let (height, width) = first.dim();
    if width == 0 || height == 0 {
        return Err(ChimeraError::InvalidDimensions {
            width: width as u32,
            height: height as u32,
        });
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write_header(&mut writer, width, height, frames.len(), cards)?;
    write_data(&mut writer, frames, height, width)?;

    writer.flush()?;
    Ok(())
}

fn write_header(
    w: &mut impl Write,
    width: usize,
    height: usize,
    frame_count: usize,
    cards: &[Card],
) -> Result<()> {
    let mut header = String::new();
    push_card(&mut header, &format!("{:<8}= {:>20}", "SIMPLE", "T"));
    push_card(&mut header, &format!("{:<8}= {:>20}", "BITPIX", -32));
    push_card(&mut header, &format!("{:<8}= {:>20}", "NAXIS", 3));
    push_card(&mut header, &format!("{:<8}= {:>20}", "NAXIS1", width));
    push_card(&mut header, &format!("{:<8}= {:>20}", "NAXIS2", height));
    push_card(&mut header, &format!("{:<8}= {:>20}", "NAXIS3", frame_count));

    for card in cards {
        if STRUCTURAL_KEYWORDS.contains(&card.keyword.as_str()) || card.keyword.is_empty() {
            continue;
        }
        push_card(&mut header, &card.raw);
    }

    push_card(&mut header, "END");

    // Pad the header to a whole number of 2880-byte blocks with spaces.
    while header.len() % FITS_BLOCK_SIZE != 0 {
        header.push(' ');
    }

    w.write_all(header.as_bytes())?;
    Ok(())
}

fn push_card(header: &mut String, card: &str) {
    let mut card = card.to_string();
    card.truncate(FITS_CARD_SIZE);
    while card.len() < FITS_CARD_SIZE {
        card.push(' ');
    }
    header.push_str(&card);
}

fn write_data(
    w: &mut impl Write,
    frames: &[Array2<f32>],
    height: usize,
    width: usize,
) -> Result<()> {
    let mut written = 0usize;
    let mut buf = vec![0u8; width * 4];

    for frame in frames {
        if frame.dim() != (height, width) {
            return Err(ChimeraError::InvalidDimensions {
                width: frame.ncols() as u32,
                height: frame.nrows() as u32,
            });
        }
        for row in frame.rows() {
            let row: Vec<f32> = row.iter().copied().collect();
            BigEndian::write_f32_into(&row, &mut buf);
            w.write_all(&buf)?;
            written += buf.len();
        }
    }

    // Pad the data unit to a whole number of blocks with zeros.
    let remainder = written % FITS_BLOCK_SIZE;
    if remainder != 0 {
        let padding = vec![0u8; FITS_BLOCK_SIZE - remainder];
        w.write_all(&padding)?;
    }

    Ok(())
}
