use clap::ValueEnum;

/// What a deduplicated read is counted as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FeatureMode {
    /// Trimmed nucleotide sequence.
    #[default]
    Nucleotide,
    /// In-frame translation of the trimmed sequence.
    Peptide,
}

const STOP: u8 = b'*';
const UNKNOWN: u8 = b'X';

fn base_index(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

// Standard genetic code indexed by TCAG order of the 1st, 2nd, 3rd base.
const CODON_TABLE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

pub fn translate_codon(codon: &[u8]) -> u8 {
    let [b1, b2, b3] = codon else {
        return UNKNOWN;
    };
    match (base_index(*b1), base_index(*b2), base_index(*b3)) {
        (Some(i), Some(j), Some(k)) => CODON_TABLE[i * 16 + j * 4 + k],
        _ => UNKNOWN,
    }
}

/// Translate a DNA sequence from the first base. Trailing bases that do not make a codon are dropped.
pub fn translate(dna: &[u8]) -> String {
    dna.chunks_exact(3)
        .map(|codon| translate_codon(codon) as char)
        .collect()
}

/// Translate a read into a peptide feature.
/// * Rejects reads not a multiple of 3 and reads with an internal stop or an ambiguous codon.
/// * A single terminal stop codon is removed. A read that is only a stop codon is rejected.
pub fn peptide_feature(dna: &[u8]) -> Option<String> {
    if dna.is_empty() || dna.len() % 3 != 0 {
        return None;
    }
    let mut peptide = translate(dna);
    if peptide.as_bytes().last() == Some(&STOP) {
        peptide.pop();
    }
    if peptide.is_empty() || peptide.bytes().any(|aa| aa == STOP || aa == UNKNOWN) {
        return None;
    }
    Some(peptide)
}

impl FeatureMode {
    /// Convert a trimmed read to its feature. `None` if the read cannot be represented.
    pub fn feature(self, dna: &[u8]) -> Option<String> {
        match self {
            FeatureMode::Nucleotide => Some(String::from_utf8_lossy(dna).to_ascii_uppercase()),
            FeatureMode::Peptide => peptide_feature(dna),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_translate() {
        assert_eq!(translate(b"ATGGCCTAA"), "MA*");
        assert_eq!(translate(b"atgtggNNN"), "MWX");
        assert_eq!(translate(b"TTTGG"), "F");
        assert_eq!(translate(b"TGATAGTAA"), "***");
        assert_eq!(translate(b"GGGCGTAAAGAC"), "GRKD");
    }

    #[test]
    fn test_peptide_feature() {
        assert_eq!(peptide_feature(b"ATGGCCTAA"), Some("MA".to_owned()));
        assert_eq!(peptide_feature(b"ATGGCC"), Some("MA".to_owned()));
        assert_eq!(peptide_feature(b"ATGTAAGCC"), None);
        assert_eq!(peptide_feature(b"ATGGC"), None);
        assert_eq!(peptide_feature(b"ATGNCC"), None);
        assert_eq!(peptide_feature(b""), None);
        assert_eq!(peptide_feature(b"TAA"), None);
    }

    #[test]
    fn test_feature_mode() {
        assert_eq!(FeatureMode::Nucleotide.feature(b"acgt"), Some("ACGT".to_owned()));
        assert_eq!(FeatureMode::Peptide.feature(b"ATGAAA"), Some("MK".to_owned()));
    }
}
