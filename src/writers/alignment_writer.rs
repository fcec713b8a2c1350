
use crate::aligner::Alignment;
use crate::data_types::reads::ReadRecord;

use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Contains all the data written to each row of the alignment output
#[derive(Serialize)]
struct AlignmentRow {
    /// the read name
    name: String,
    /// base sequence as aligned
    sequence: String,
    /// the subgraph the read was aligned against
    subgraph: String,
    /// expected 0-based end position, -1 when unknown
    target_pos: i64,
    /// best score found
    max_score: i32,
    /// 0-based end position of the best score
    max_pos: i64,
    /// number of positions attaining the best score
    max_count: usize,
    /// second-best score
    sub_score: i32,
    /// 0-based end position of the second-best score
    sub_pos: i64,
    /// number of positions attaining the second-best score
    sub_count: usize,
    /// 1 if the best hit the target, 2 if only the second-best did, else 0
    correct: u8,
    /// true when scored end-to-end instead of locally
    end_to_end: bool
}

/// Writes annotated alignment records to a delimited file.
pub struct AlignmentWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>
}

impl AlignmentWriter {
    /// Creates a new writer for a given filename.
    /// The delimiter is "," for .csv files and tab otherwise.
    /// # Arguments
    /// * `filename` - the path to write alignments to
    pub fn new(filename: &Path) -> csv::Result<AlignmentWriter> {
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(AlignmentWriter {
            csv_writer
        })
    }

    /// Writes one read with its alignment annotations.
    /// # Arguments
    /// * `record` - the read as it was aligned
    /// * `subgraph` - the target subgraph label
    /// * `alignment` - the aligner's result for this read
    /// * `end_to_end` - scoring mode marker for the output
    /// # Errors
    /// * if the csv_writer has any errors
    pub fn write_alignment(&mut self, record: &ReadRecord, subgraph: &str,
                           alignment: &Alignment, end_to_end: bool) -> Result<(), Box<dyn std::error::Error>> {
        let row: AlignmentRow = AlignmentRow {
            name: record.name.clone(),
            sequence: record.sequence.clone(),
            subgraph: subgraph.to_string(),
            target_pos: record.end_pos,
            max_score: alignment.max_score,
            max_pos: alignment.max_pos,
            max_count: alignment.max_count,
            sub_score: alignment.sub_score,
            sub_pos: alignment.sub_pos,
            sub_count: alignment.sub_count,
            correct: alignment.correct,
            end_to_end
        };
        self.csv_writer.serialize(&row)?;
        Ok(())
    }

    /// Flushes everything to disk.
    pub fn finish(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_alignment() {
        let out = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        let mut writer: AlignmentWriter = AlignmentWriter::new(out.path()).unwrap();

        let record = ReadRecord {
            name: "r0".to_string(),
            sequence: "ACGT".to_string(),
            end_pos: 10,
            ..Default::default()
        };
        let alignment = Alignment {
            max_score: 8,
            max_pos: 10,
            max_count: 1,
            sub_score: 4,
            sub_pos: 31,
            sub_count: 2,
            correct: 1
        };
        writer.write_alignment(&record, "B/sub1", &alignment, false).unwrap();
        writer.finish().unwrap();

        let text: String = std::fs::read_to_string(out.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(),
                   "name,sequence,subgraph,target_pos,max_score,max_pos,max_count,sub_score,sub_pos,sub_count,correct,end_to_end");
        assert_eq!(lines.next().unwrap(), "r0,ACGT,B/sub1,10,8,10,1,4,31,2,1,false");
    }
}
