
use bit_vec::BitVec;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum PopulationError {
    #[error("bitstring may only contain '0' and '1', found {found:?}")]
    InvalidBitstring { found: char },
    #[error("population widths differ: {left} != {right}")]
    WidthMismatch { left: usize, right: usize }
}

/// A fixed-width haplotype bitset.
/// Bit `i` is set iff haplotype `i` carries the allele in question;
/// widths are always `2 * num_samples` for phased diploid call-sets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Population {
    bits: BitVec
}

impl Population {
    /// Creates a new population of the given width with every bit set to `fill`.
    /// # Arguments
    /// * `width` - the number of haplotypes represented
    /// * `fill` - the initial value of every bit
    pub fn with_width(width: usize, fill: bool) -> Population {
        Population {
            bits: BitVec::from_elem(width, fill)
        }
    }

    /// Parses a population from a string of '0' and '1' characters.
    /// # Arguments
    /// * `bitstring` - the serialized form, one character per haplotype
    /// # Errors
    /// * if any character is not '0' or '1'
    pub fn from_bitstring(bitstring: &str) -> Result<Population, PopulationError> {
        let mut bits: BitVec = BitVec::from_elem(bitstring.len(), false);
        for (i, c) in bitstring.chars().enumerate() {
            match c {
                '0' => {},
                '1' => bits.set(i, true),
                _ => return Err(PopulationError::InvalidBitstring { found: c })
            };
        }
        Ok(Population { bits })
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Returns the bit for haplotype `index`; out-of-range queries are false.
    pub fn get(&self, index: usize) -> bool {
        self.bits.get(index).unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, value: bool) {
        self.bits.set(index, value);
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&b| b).count()
    }

    /// True if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.bits.none()
    }

    /// True if any bit set here is also set in `other`.
    /// Widths need not match; missing bits read as unset.
    pub fn intersects(&self, other: &Population) -> bool {
        self.bits.iter()
            .zip(other.bits.iter())
            .any(|(a, b)| a && b)
    }

    /// In-place union with `other`.
    /// # Errors
    /// * if the widths differ
    pub fn union_with(&mut self, other: &Population) -> Result<(), PopulationError> {
        if self.width() != other.width() {
            return Err(PopulationError::WidthMismatch { left: self.width(), right: other.width() });
        }
        self.bits.or(&other.bits);
        Ok(())
    }

    /// In-place intersection with `other`.
    /// # Errors
    /// * if the widths differ
    pub fn intersect_with(&mut self, other: &Population) -> Result<(), PopulationError> {
        if self.width() != other.width() {
            return Err(PopulationError::WidthMismatch { left: self.width(), right: other.width() });
        }
        self.bits.and(&other.bits);
        Ok(())
    }

    /// Returns the complement of `self` restricted to the bits set in `parent`,
    /// i.e. the sibling population `parent & !self`.
    /// # Arguments
    /// * `parent` - the population this one was drawn from
    /// # Errors
    /// * if the widths differ
    pub fn complement_within(&self, parent: &Population) -> Result<Population, PopulationError> {
        if self.width() != parent.width() {
            return Err(PopulationError::WidthMismatch { left: self.width(), right: parent.width() });
        }
        let mut negated: BitVec = self.bits.clone();
        negated.negate();
        negated.and(&parent.bits);
        Ok(Population { bits: negated })
    }

    /// Indices of the set bits, in increasing order.
    pub fn set_indices(&self) -> Vec<usize> {
        self.bits.iter()
            .enumerate()
            .filter(|(_i, b)| *b)
            .map(|(i, _b)| i)
            .collect()
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.bits.iter() {
            write!(f, "{}", if b { '1' } else { '0' })?;
        }
        Ok(())
    }
}
