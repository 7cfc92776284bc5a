use std::ops::Range;

pub const PHRED_OFFSET: u8 = 33;

pub const DEFAULT_ERROR_RATE: f64 = 0.1;
pub const DEFAULT_MIN_OVERLAP: usize = 3;
pub const DEFAULT_TRIM_QUALITY: u8 = 0;
pub const DEFAULT_MIN_LENGTH: usize = 1;
pub const DEFAULT_MAX_N: usize = 0;
pub const DEFAULT_MIN_MEAN_QUALITY: f64 = 20.0;

/// Read trimming and filtering parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadFilter {
    /// Adapter/primer removed from the 5' end along with everything before it.
    pub front: Option<Vec<u8>>,
    /// Adapter removed from the 3' end along with everything after it.
    pub adapter: Option<Vec<u8>>,
    /// Mismatches allowed per adapter base.
    pub error_rate: f64,
    /// Minimum partial adapter overlap at read ends.
    pub min_overlap: usize,
    /// Fail reads where a configured adapter was not found.
    pub discard_untrimmed: bool,
    /// 3' quality trimming cutoff. 0 disables.
    pub trim_quality: u8,
    pub min_length: usize,
    pub max_length: Option<usize>,
    pub max_n: usize,
    pub min_mean_quality: f64,
}

impl Default for ReadFilter {
    fn default() -> Self {
        Self {
            front: None,
            adapter: None,
            error_rate: DEFAULT_ERROR_RATE,
            min_overlap: DEFAULT_MIN_OVERLAP,
            discard_untrimmed: false,
            trim_quality: DEFAULT_TRIM_QUALITY,
            min_length: DEFAULT_MIN_LENGTH,
            max_length: None,
            max_n: DEFAULT_MAX_N,
            min_mean_quality: DEFAULT_MIN_MEAN_QUALITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Kept. Range of the trimmed read within the original sequence.
    Pass(Range<usize>),
    TooShort,
    TooLong,
    TooManyN,
    LowQuality,
    Untrimmed,
}

/// Index to cut the 3' end at so that low-quality bases are removed.
/// * Same as BWA's `-q`.
/// * Going from the 3' end, sum `cutoff - phred` and cut where the sum is largest.
pub fn quality_trim_index(qual: &[u8], cutoff: u8) -> usize {
    let mut stop = qual.len();
    let mut sum: i64 = 0;
    let mut max_sum: i64 = 0;
    for (i, q) in qual.iter().enumerate().rev() {
        sum += i64::from(cutoff) - i64::from(q.saturating_sub(PHRED_OFFSET));
        if sum < 0 {
            break;
        }
        if sum > max_sum {
            max_sum = sum;
            stop = i;
        }
    }
    stop
}

fn mismatches(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b.iter())
        .filter(|(x, y)| !x.eq_ignore_ascii_case(y) && !x.eq_ignore_ascii_case(&b'N'))
        .count()
}

fn allowed_errors(len: usize, error_rate: f64) -> usize {
    (len as f64 * error_rate).floor() as usize
}

/// Find where a 3' adapter starts in `seq`.
/// * Leftmost full-length ungapped match first.
/// * Otherwise, the longest adapter prefix overlapping the read end.
pub fn find_adapter_3p(
    seq: &[u8],
    adapter: &[u8],
    error_rate: f64,
    min_overlap: usize,
) -> Option<usize> {
    if adapter.is_empty() {
        return None;
    }
    let max_err = allowed_errors(adapter.len(), error_rate);
    if seq.len() >= adapter.len() {
        if let Some(pos) = seq
            .windows(adapter.len())
            .position(|w| mismatches(adapter, w) <= max_err)
        {
            return Some(pos);
        }
    }
    let longest = adapter.len().saturating_sub(1).min(seq.len());
    (min_overlap.max(1)..=longest).rev().find_map(|olen| {
        let start = seq.len() - olen;
        (mismatches(&adapter[..olen], &seq[start..]) <= allowed_errors(olen, error_rate))
            .then_some(start)
    })
}

/// Find where the read begins after a 5' adapter in `seq`.
/// * Leftmost full-length ungapped match first.
/// * Otherwise, the longest adapter suffix overlapping the read start.
pub fn find_adapter_5p(
    seq: &[u8],
    adapter: &[u8],
    error_rate: f64,
    min_overlap: usize,
) -> Option<usize> {
    if adapter.is_empty() {
        return None;
    }
    let max_err = allowed_errors(adapter.len(), error_rate);
    if seq.len() >= adapter.len() {
        if let Some(pos) = seq
            .windows(adapter.len())
            .position(|w| mismatches(adapter, w) <= max_err)
        {
            return Some(pos + adapter.len());
        }
    }
    let longest = adapter.len().saturating_sub(1).min(seq.len());
    (min_overlap.max(1)..=longest).rev().find_map(|olen| {
        let suffix = &adapter[adapter.len() - olen..];
        (mismatches(suffix, &seq[..olen]) <= allowed_errors(olen, error_rate)).then_some(olen)
    })
}

pub fn mean_quality(qual: &[u8]) -> f64 {
    if qual.is_empty() {
        return 0.0;
    }
    qual.iter()
        .map(|q| f64::from(q.saturating_sub(PHRED_OFFSET)))
        .sum::<f64>()
        / qual.len() as f64
}

impl ReadFilter {
    /// Trim and filter a single read.
    ///
    /// # Arguments
    /// * `seq`
    ///     * Read sequence.
    /// * `qual`
    ///     * Phred+33 encoded quality scores. Same length as `seq`.
    ///
    /// # Returns
    /// * [`ReadOutcome`]
    pub fn apply(&self, seq: &[u8], qual: &[u8]) -> ReadOutcome {
        let mut end = if self.trim_quality > 0 {
            quality_trim_index(qual, self.trim_quality)
        } else {
            seq.len()
        };
        let mut start = 0;
        let mut found_adapter = false;

        if let Some(front) = &self.front {
            if let Some(read_start) =
                find_adapter_5p(&seq[..end], front, self.error_rate, self.min_overlap)
            {
                start = read_start;
                found_adapter = true;
            }
        }
        if let Some(adapter) = &self.adapter {
            if let Some(adapter_start) =
                find_adapter_3p(&seq[start..end], adapter, self.error_rate, self.min_overlap)
            {
                end = start + adapter_start;
                found_adapter = true;
            }
        }

        let has_adapters = self.front.is_some() || self.adapter.is_some();
        if self.discard_untrimmed && has_adapters && !found_adapter {
            return ReadOutcome::Untrimmed;
        }

        let trimmed_seq = &seq[start..end];
        if trimmed_seq.len() < self.min_length {
            return ReadOutcome::TooShort;
        }
        if self.max_length.is_some_and(|max| trimmed_seq.len() > max) {
            return ReadOutcome::TooLong;
        }
        if trimmed_seq
            .iter()
            .filter(|b| b.eq_ignore_ascii_case(&b'N'))
            .count()
            > self.max_n
        {
            return ReadOutcome::TooManyN;
        }
        if mean_quality(&qual[start..end]) < self.min_mean_quality {
            return ReadOutcome::LowQuality;
        }
        ReadOutcome::Pass(start..end)
    }
}
