
use crate::graph_builder::ReferenceSource;

use bio::io::fasta;
use flate2::bufread::MultiGzDecoder;
use log::{debug, info};
use rustc_hash::FxHashMap as HashMap;
use simple_error::bail;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Wrapper structure for an in-memory reference genome
pub struct ReferenceGenome {
    /// The filename we loaded
    filename: PathBuf,
    /// Contains the keys in order of the reference load
    contig_keys: Vec<String>,
    /// Map where keys are contig names and value is ASCII formatted sequence
    contig_map: HashMap<String, Vec<u8>>
}

impl ReferenceGenome {
    /// Loads a reference genome from a given FASTA file
    /// # Arguments
    /// * `fasta_fn` - the FASTA filename, gzip is allowed
    /// # Errors
    /// This will pass through any error detected from loading the provided FASTA file.
    /// This includes file reading and/or record reading errors.
    pub fn from_fasta(fasta_fn: &Path) -> Result<ReferenceGenome, Box<dyn std::error::Error>> {
        info!("Loading {:?}...", fasta_fn);
        let mut contig_keys: Vec<String> = Default::default();
        let mut contig_map: HashMap<String, Vec<u8>> = Default::default();

        let fasta_file: std::fs::File = std::fs::File::open(fasta_fn)?;
        let file_reader = BufReader::new(fasta_file);
        let fasta_reader: fasta::Reader<Box<dyn BufRead>> = if fasta_fn.extension().unwrap_or_default() == "gz" {
            debug!("Detected gzip extension, loading reference with MultiGzDecoder...");
            let gz_decoder = MultiGzDecoder::new(file_reader);
            let bufreader = BufReader::new(gz_decoder);
            fasta::Reader::from_bufread(Box::new(bufreader))
        } else {
            debug!("Loading reference as plain-text file...");
            fasta::Reader::from_bufread(Box::new(file_reader))
        };

        for entry in fasta_reader.records() {
            let record: fasta::Record = entry?;
            let seq_id: String = record.id().to_string();
            let sequence: Vec<u8> = record.seq().to_ascii_uppercase();

            contig_keys.push(seq_id.clone());
            contig_map.insert(seq_id, sequence);
        }
        info!("Finished loading {} contigs.", contig_map.len());

        Ok(ReferenceGenome {
            filename: fasta_fn.to_path_buf(),
            contig_keys,
            contig_map
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn contig_keys(&self) -> &[String] {
        &self.contig_keys
    }

    /// Retrieves a full contig by name, or an error if the FASTA did not contain it.
    pub fn full_contig(&self, contig: &str) -> Result<&[u8], Box<dyn std::error::Error>> {
        match self.contig_map.get(contig) {
            Some(seq) => Ok(seq.as_slice()),
            None => bail!("contig {:?} is not in {:?}", contig, self.filename)
        }
    }
}

impl ReferenceSource for ReferenceGenome {
    fn sequences(&self) -> Vec<String> {
        self.contig_keys.clone()
    }

    fn seq_len(&self, contig: &str) -> Result<usize, Box<dyn std::error::Error>> {
        Ok(self.full_contig(contig)?.len())
    }

    /// Retrieves a subsequence over 0-based inclusive coordinates.
    /// # Errors
    /// * if the contig is unknown or the range runs outside it
    fn subseq(&self, contig: &str, lo: usize, hi_inclusive: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let full: &[u8] = self.full_contig(contig)?;
        if lo > hi_inclusive || hi_inclusive >= full.len() {
            bail!("subseq range {}..={} is outside contig {:?} (length {})", lo, hi_inclusive, contig, full.len());
        }
        Ok(full[lo..=hi_inclusive].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fasta() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".fa")
            .tempfile()
            .unwrap();
        writeln!(file, ">chr1\nACGTACGT\n>chr2\naccatgta").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_simple_reference() {
        let fasta_file = write_fasta();
        let reference = ReferenceGenome::from_fasta(fasta_file.path()).unwrap();

        assert_eq!(reference.contig_keys(), &["chr1".to_string(), "chr2".to_string()]);
        assert_eq!(reference.seq_len("chr1").unwrap(), 8);

        // sequences are upper-cased on load
        assert_eq!(reference.subseq("chr2", 0, 7).unwrap(), b"ACCATGTA".to_vec());
        assert_eq!(reference.subseq("chr1", 2, 4).unwrap(), b"GTA".to_vec());
        assert_eq!(reference.subseq("chr1", 7, 7).unwrap(), b"T".to_vec());
    }

    #[test]
    fn test_bad_requests() {
        let fasta_file = write_fasta();
        let reference = ReferenceGenome::from_fasta(fasta_file.path()).unwrap();

        assert!(reference.seq_len("chr3").is_err());
        assert!(reference.subseq("chr1", 0, 8).is_err());
        assert!(reference.subseq("chr1", 5, 4).is_err());
    }
}
