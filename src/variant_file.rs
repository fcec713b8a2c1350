
use crate::data_types::population::Population;
use crate::graph_builder::{Region, VariantSource};

#[allow(unused_imports)]
use log::{debug, info, trace, warn};
use rand::seq::index::sample;
use rust_htslib::bcf::{self, Read};
use rust_htslib::bcf::record::GenotypeAllele;
use simple_error::bail;
use std::path::{Path, PathBuf};

/// One decoded VCF record: position, alleles, frequencies, and the per-haplotype
/// allele choices. Holding a decoded copy avoids borrowing the htslib buffers.
struct DecodedRecord {
    contig: String,
    pos: i64,
    /// REF at index 0
    alleles: Vec<Vec<u8>>,
    /// parallel to `alleles`
    frequencies: Vec<f32>,
    /// allele index per haplotype (2 per sample); None for missing calls
    genotypes: Vec<Option<usize>>
}

/// A VCF/BCF file exposed as a `VariantSource` for graph construction.
/// Records are read sequentially and filtered against the configured region,
/// so plain-text VCFs work without a tabix index.
pub struct VcfFile {
    filename: PathBuf,
    reader: bcf::Reader,
    samples: Vec<String>,
    region: Option<Region>,
    /// true once a record on the region's contig has been seen
    entered_region: bool,
    /// sample indices exposed to callers; None exposes everything
    ingroup: Option<Vec<usize>>,
    ingroup_percent: u8,
    current: Option<DecodedRecord>
}

impl VcfFile {
    /// Opens a VCF or BCF file for sequential decoding.
    /// # Arguments
    /// * `filename` - the variant file; .vcf, .vcf.gz, and .bcf all work
    /// # Errors
    /// * if htslib cannot open or parse the file header
    pub fn open(filename: &Path) -> Result<VcfFile, Box<dyn std::error::Error>> {
        let reader: bcf::Reader = bcf::Reader::from_path(filename)?;
        let samples: Vec<String> = reader.header()
            .samples()
            .iter()
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect();
        debug!("Opened {:?} with {} samples", filename, samples.len());

        Ok(VcfFile {
            filename: filename.to_path_buf(),
            reader,
            samples,
            region: None,
            entered_region: false,
            ingroup: None,
            ingroup_percent: 100,
            current: None
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Phased-diploid haplotype count, i.e. twice the sample count.
    pub fn num_haplotypes(&self) -> usize {
        2 * self.samples.len()
    }

    fn decoded(&self) -> &DecodedRecord {
        self.current.as_ref().expect("next() must return true before record access")
    }

    /// Decodes one htslib record into our own representation.
    fn decode(&self, record: &bcf::Record) -> Result<DecodedRecord, Box<dyn std::error::Error>> {
        let rid: u32 = match record.rid() {
            Some(r) => r,
            None => bail!("record without a contig in {:?}", self.filename)
        };
        let contig: String = String::from_utf8_lossy(self.reader.header().rid2name(rid)?).to_string();
        let alleles: Vec<Vec<u8>> = record.alleles()
            .iter()
            .map(|a| a.to_vec())
            .collect();

        // phased-diploid genotypes; anything missing decodes as None
        let mut genotypes: Vec<Option<usize>> = Vec::with_capacity(self.num_haplotypes());
        let record_genotypes = record.genotypes()?;
        for sample_index in 0..self.samples.len() {
            let genotype = record_genotypes.get(sample_index);
            for hap in 0..2 {
                let allele: Option<usize> = genotype.get(hap)
                    .and_then(|ga: &GenotypeAllele| ga.index())
                    .map(|i| i as usize);
                genotypes.push(allele);
            }
        }

        // prefer INFO/AF; REF takes the remainder
        let frequencies: Vec<f32> = match record.info(b"AF").float() {
            Ok(Some(alt_freqs)) if alt_freqs.len() == alleles.len() - 1 => {
                let alt_sum: f32 = alt_freqs.iter().sum();
                let mut freqs: Vec<f32> = Vec::with_capacity(alleles.len());
                freqs.push((1.0 - alt_sum).max(0.0));
                freqs.extend_from_slice(&alt_freqs);
                freqs
            },
            _ => genotype_frequencies(&genotypes, alleles.len())
        };

        Ok(DecodedRecord {
            contig,
            pos: record.pos(),
            alleles,
            frequencies,
            genotypes
        })
    }
}

/// Allele frequencies from observed genotype counts; the fallback when a
/// record carries no INFO/AF annotation. With no called genotypes at all,
/// the reference allele takes frequency 1.
fn genotype_frequencies(genotypes: &[Option<usize>], num_alleles: usize) -> Vec<f32> {
    let mut counts: Vec<usize> = vec![0; num_alleles];
    let mut called: usize = 0;
    for allele in genotypes.iter().flatten() {
        if *allele < num_alleles {
            counts[*allele] += 1;
            called += 1;
        }
    }
    if called == 0 {
        let mut freqs: Vec<f32> = vec![0.0; num_alleles];
        freqs[0] = 1.0;
        return freqs;
    }
    counts.iter()
        .map(|&c| c as f32 / called as f32)
        .collect()
}

impl VariantSource for VcfFile {
    fn set_region(&mut self, region: &Region) {
        self.region = Some(region.clone());
        self.entered_region = false;
    }

    /// Reads forward to the next record inside the region.
    /// Relies on positional sorting: once the region's contig has been entered
    /// and left again, iteration stops without scanning the rest of the file.
    fn next(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        let mut record: bcf::Record = self.reader.empty_record();
        loop {
            match self.reader.read(&mut record) {
                Some(Ok(())) => {},
                Some(Err(e)) => return Err(e.into()),
                None => {
                    self.current = None;
                    return Ok(false);
                }
            };

            let decoded: DecodedRecord = self.decode(&record)?;
            let region: &Region = match self.region {
                Some(ref r) => r,
                None => {
                    self.current = Some(decoded);
                    return Ok(true);
                }
            };

            if decoded.contig != region.contig {
                if self.entered_region {
                    // sorted input: the region's contig is behind us
                    self.current = None;
                    return Ok(false);
                }
                continue;
            }
            self.entered_region = true;

            if decoded.pos < region.lower {
                continue;
            }
            if region.upper > 0 && decoded.pos >= region.upper {
                self.current = None;
                return Ok(false);
            }
            self.current = Some(decoded);
            return Ok(true);
        }
    }

    fn pos(&self) -> i64 {
        self.decoded().pos
    }

    fn alleles(&self) -> &[Vec<u8>] {
        &self.decoded().alleles
    }

    fn frequencies(&self) -> &[f32] {
        &self.decoded().frequencies
    }

    fn allele_pop(&self, allele_index: usize) -> Population {
        let decoded: &DecodedRecord = self.decoded();
        let mut pop: Population = Population::with_width(self.num_haplotypes(), false);
        for (hap, allele) in decoded.genotypes.iter().enumerate() {
            if *allele != Some(allele_index) {
                continue;
            }
            let sample_included: bool = match self.ingroup {
                Some(ref group) => group.contains(&(hap / 2)),
                None => true
            };
            if sample_included {
                pop.set(hap, true);
            }
        }
        pop
    }

    fn samples(&self) -> &[String] {
        &self.samples
    }

    fn create_ingroup(&mut self, percent: u8) {
        self.ingroup_percent = percent;
        if percent >= 100 {
            self.ingroup = None;
            return;
        }
        let keep: usize = self.samples.len() * percent as usize / 100;
        let mut chosen: Vec<usize> = sample(&mut rand::thread_rng(), self.samples.len(), keep).into_vec();
        chosen.sort_unstable();
        info!("Ingroup: {} of {} samples ({percent}%)", chosen.len(), self.samples.len());
        self.ingroup = Some(chosen);
    }

    fn ingroup_str(&self) -> String {
        match self.ingroup {
            None => "100%".to_string(),
            Some(ref group) => {
                let names: Vec<&str> = group.iter()
                    .map(|&i| self.samples[i].as_str())
                    .collect();
                format!("{}%:{}", self.ingroup_percent, names.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genotype_frequencies() {
        // 0|1 and 1|1 -> REF 1/4, ALT 3/4
        let genotypes = vec![Some(0), Some(1), Some(1), Some(1)];
        let freqs = genotype_frequencies(&genotypes, 2);
        assert_eq!(freqs, vec![0.25, 0.75]);

        // missing calls are excluded from the denominator
        let genotypes = vec![Some(0), None, Some(2), Some(2)];
        let freqs = genotype_frequencies(&genotypes, 3);
        assert!((freqs[0] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(freqs[1], 0.0);
        assert!((freqs[2] - 2.0 / 3.0).abs() < 1e-6);

        // nothing called: everything goes to REF
        let freqs = genotype_frequencies(&[None, None], 2);
        assert_eq!(freqs, vec![1.0, 0.0]);
    }
}
