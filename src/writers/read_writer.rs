
use crate::data_types::reads::ReadRecord;

use std::fs::File;
use std::path::Path;

/// Writes simulated reads to a delimited file, one record per row.
pub struct ReadWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

impl ReadWriter {
    /// Creates a new writer for a given filename.
    /// The delimiter is "," for .csv files and tab otherwise.
    /// # Arguments
    /// * `filename` - the path to write reads to
    pub fn new(filename: &Path) -> csv::Result<ReadWriter> {
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(ReadWriter {
            csv_writer
        })
    }

    /// Serializes one read record.
    /// # Errors
    /// * if the csv_writer has any errors
    pub fn write_read(&mut self, record: &ReadRecord) -> Result<(), Box<dyn std::error::Error>> {
        self.csv_writer.serialize(record)?;
        Ok(())
    }

    /// Flushes everything to disk.
    pub fn finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.csv_writer.flush()?;
        Ok(())
    }
}
