
use crate::data_types::reads::ReadRecord;

use log::debug;
use std::path::Path;

/// Picks the delimiter from the file extension: "," for .csv, tab otherwise.
fn delimiter_for(filename: &Path) -> u8 {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    if is_csv { b',' } else { b'\t' }
}

/// Loads every read record from a delimited file with a header row.
/// # Arguments
/// * `filename` - the read file (.csv for comma, anything else for tab)
/// # Errors
/// * if the file cannot be opened or any row fails to deserialize
pub fn read_records(filename: &Path) -> Result<Vec<ReadRecord>, Box<dyn std::error::Error>> {
    let mut csv_reader: csv::Reader<std::fs::File> = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(filename))
        .from_path(filename)?;

    let mut records: Vec<ReadRecord> = vec![];
    for row in csv_reader.deserialize() {
        let record: ReadRecord = row?;
        records.push(record);
    }
    debug!("Loaded {} read records from {:?}", records.len(), filename);
    Ok(records)
}
