use std::path::Path;

use crate::error::Result;
use crate::record::PhotometryRecord;

/// Write a record table as CSV with a header row. Field order follows the
/// record's declaration order.
pub fn write_records(path: &Path, records: &[PhotometryRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a record table back, preserving row order.
pub fn read_records(path: &Path) -> Result<Vec<PhotometryRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}
