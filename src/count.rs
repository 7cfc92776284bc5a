use std::{
    collections::HashMap,
    fs,
    io::BufRead,
    path::{Path, PathBuf},
};

use eyre::Context;
use itertools::Itertools;
use noodles::fastq;
use polars::prelude::*;
use rayon::prelude::*;

use crate::{
    io::{load_tsv, open_fastq, write_tsv},
    qc::{ReadFilter, ReadOutcome},
    samples::Sample,
    translate::FeatureMode,
};

pub type FeatureCounts = HashMap<String, u64>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub total: u64,
    pub passed: u64,
    pub too_short: u64,
    pub too_long: u64,
    pub too_many_n: u64,
    pub low_quality: u64,
    pub untrimmed: u64,
    pub untranslatable: u64,
    pub unique: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CountParams {
    pub filter: ReadFilter,
    pub mode: FeatureMode,
}

/// Trim, filter and count identical features in a FASTQ stream.
///
/// # Arguments
/// * `reader`
///     * FASTQ reader.
/// * `params`
///     * Read filter and how reads are converted to features.
///
/// # Returns
/// * Count of each unique feature and the tally of what happened to each read.
pub fn count_reads<R: BufRead>(
    reader: &mut fastq::io::Reader<R>,
    params: &CountParams,
) -> eyre::Result<(FeatureCounts, ReadStats)> {
    let mut counts: FeatureCounts = HashMap::new();
    let mut stats = ReadStats::default();

    for rec in reader.records() {
        let rec = rec?;
        let (seq, qual) = (rec.sequence(), rec.quality_scores());
        if seq.len() != qual.len() {
            eyre::bail!(
                "Read {} has sequence and quality of different lengths.",
                stats.total + 1
            );
        }
        stats.total += 1;

        let range = match params.filter.apply(seq, qual) {
            ReadOutcome::Pass(range) => range,
            ReadOutcome::TooShort => {
                stats.too_short += 1;
                continue;
            }
            ReadOutcome::TooLong => {
                stats.too_long += 1;
                continue;
            }
            ReadOutcome::TooManyN => {
                stats.too_many_n += 1;
                continue;
            }
            ReadOutcome::LowQuality => {
                stats.low_quality += 1;
                continue;
            }
            ReadOutcome::Untrimmed => {
                stats.untrimmed += 1;
                continue;
            }
        };
        let Some(feature) = params.mode.feature(&seq[range]) else {
            stats.untranslatable += 1;
            continue;
        };
        stats.passed += 1;
        *counts.entry(feature).or_default() += 1;
    }
    stats.unique = counts.len() as u64;
    Ok((counts, stats))
}

/// Convert counts to a [`DataFrame`] with columns `[feature, count]`.
/// * Sorted by count descending then feature.
pub fn counts_to_df(counts: FeatureCounts) -> eyre::Result<DataFrame> {
    let (features, cnts): (Vec<String>, Vec<u64>) = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .unzip();
    Ok(DataFrame::new(vec![
        Column::new("feature".into(), features),
        Column::new("count".into(), cnts),
    ])?)
}

/// Read a per-sample count table back into a map.
pub fn df_to_counts(df: &DataFrame) -> eyre::Result<FeatureCounts> {
    let col_features = df.column("feature")?.cast(&DataType::String)?;
    let col_counts = df.column("count")?.cast(&DataType::UInt64)?;
    Ok(col_features
        .str()?
        .iter()
        .zip(col_counts.u64()?.iter())
        .filter_map(|(feature, cnt)| Some((feature?.to_owned(), cnt?)))
        .collect())
}

pub fn count_sample(sample: &Sample, params: &CountParams) -> eyre::Result<(FeatureCounts, ReadStats)> {
    let mut reader = open_fastq(&sample.fastq)?;
    let (counts, stats) = count_reads(&mut reader, params)
        .with_context(|| format!("Failed to count reads for sample {}", sample.name))?;
    log::info!(
        "{}: {} of {} reads passed, {} unique features.",
        sample.name,
        stats.passed,
        stats.total,
        stats.unique
    );
    Ok((counts, stats))
}

fn sample_count_path(outdir: &Path, sample: &Sample) -> PathBuf {
    outdir.join(format!("{}.tsv", sample.name))
}

/// Count all samples in parallel.
///
/// # Arguments
/// * `samples`
///     * Samples to count.
/// * `params`
///     * Counting parameters shared by all samples.
/// * `outdir`
///     * Directory for per-sample count tables `{sample}.tsv`.
/// * `resume`
///     * Reload existing per-sample tables instead of counting again. Their read stats are unknown.
///
/// # Returns
/// * Per-sample counts and read stats in sample order.
pub fn count_samples(
    samples: &[Sample],
    params: &CountParams,
    outdir: &Path,
    resume: bool,
) -> eyre::Result<Vec<(FeatureCounts, Option<ReadStats>)>> {
    fs::create_dir_all(outdir).with_context(|| format!("Failed to create {outdir:?}"))?;
    samples
        .par_iter()
        .map(|sample| -> eyre::Result<(FeatureCounts, Option<ReadStats>)> {
            let path = sample_count_path(outdir, sample);
            if resume && path.exists() {
                log::info!("Loading existing file: {path:?}");
                return Ok((df_to_counts(&load_tsv(&path)?)?, None));
            }
            let (counts, stats) = count_sample(sample, params)?;
            let mut df = counts_to_df(counts.clone())?;
            write_tsv(&mut df, &path)?;
            Ok((counts, Some(stats)))
        })
        .collect()
}

fn stats_column(name: &str, stats: &[Option<ReadStats>], get: fn(&ReadStats) -> u64) -> Column {
    let values: Vec<Option<u64>> = stats.iter().map(|s| s.as_ref().map(get)).collect();
    Column::new(name.into(), values)
}

/// QC table with one row per sample. Samples without stats have null values.
pub fn read_stats_df(samples: &[Sample], stats: &[Option<ReadStats>]) -> eyre::Result<DataFrame> {
    let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
    Ok(DataFrame::new(vec![
        Column::new("sample".into(), names),
        stats_column("total", stats, |s| s.total),
        stats_column("passed", stats, |s| s.passed),
        stats_column("too_short", stats, |s| s.too_short),
        stats_column("too_long", stats, |s| s.too_long),
        stats_column("too_many_n", stats, |s| s.too_many_n),
        stats_column("low_quality", stats, |s| s.low_quality),
        stats_column("untrimmed", stats, |s| s.untrimmed),
        stats_column("untranslatable", stats, |s| s.untranslatable),
        stats_column("unique", stats, |s| s.unique),
    ])?)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::samples::Iptg;

    fn fastq_from(seqs: &[&str]) -> String {
        seqs.iter()
            .enumerate()
            .map(|(i, seq)| format!("@read{i}\n{seq}\n+\n{}\n", "I".repeat(seq.len())))
            .join("")
    }

    #[test]
    fn test_count_reads_dedup() {
        let fq = fastq_from(&["ATGAAA", "ATGAAA", "ATGAAG", "ATGNNN", "AT"]);
        let mut reader = fastq::io::Reader::new(Cursor::new(fq.into_bytes()));
        let params = CountParams {
            filter: ReadFilter {
                min_length: 3,
                max_n: 0,
                ..Default::default()
            },
            mode: FeatureMode::Nucleotide,
        };
        let (counts, stats) = count_reads(&mut reader, &params).unwrap();
        assert_eq!(counts.get("ATGAAA"), Some(&2));
        assert_eq!(counts.get("ATGAAG"), Some(&1));
        assert_eq!(stats.total, 5);
        assert_eq!(stats.passed, 3);
        assert_eq!(stats.too_many_n, 1);
        assert_eq!(stats.too_short, 1);
        assert_eq!(stats.unique, 2);
    }

    #[test]
    fn test_count_reads_peptide() {
        // AAA and AAG are both Lys. TAA internal stop is rejected.
        let fq = fastq_from(&["ATGAAA", "ATGAAG", "TAAAAA", "ATGAA"]);
        let mut reader = fastq::io::Reader::new(Cursor::new(fq.into_bytes()));
        let params = CountParams {
            mode: FeatureMode::Peptide,
            ..Default::default()
        };
        let (counts, stats) = count_reads(&mut reader, &params).unwrap();
        assert_eq!(counts.get("MK"), Some(&2));
        assert_eq!(counts.len(), 1);
        assert_eq!(stats.untranslatable, 2);
    }

    #[test]
    fn test_peptide_counts_reload() {
        // AATGCA is Asn-Ala, the same text as R's missing value. TAA alone has no peptide.
        let fq = fastq_from(&["TAA", "AATGCA", "ATGAAA"]);
        let mut reader = fastq::io::Reader::new(Cursor::new(fq.into_bytes()));
        let params = CountParams {
            mode: FeatureMode::Peptide,
            ..Default::default()
        };
        let (counts, stats) = count_reads(&mut reader, &params).unwrap();
        assert_eq!(counts.get("NA"), Some(&1));
        assert_eq!(counts.get("MK"), Some(&1));
        assert_eq!(counts.len(), 2);
        assert_eq!(stats.untranslatable, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.tsv");
        write_tsv(&mut counts_to_df(counts.clone()).unwrap(), &path).unwrap();
        assert_eq!(df_to_counts(&load_tsv(&path).unwrap()).unwrap(), counts);
    }

    #[test]
    fn test_counts_df_sorted() {
        let counts: FeatureCounts = [("B".to_owned(), 2), ("A".to_owned(), 2), ("C".to_owned(), 5)]
            .into_iter()
            .collect();
        let df = counts_to_df(counts.clone()).unwrap();
        let features: Vec<&str> = df.column("feature").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(features, vec!["C", "A", "B"]);
        assert_eq!(df_to_counts(&df).unwrap(), counts);
    }

    #[test]
    fn test_count_samples_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let fq_path = dir.path().join("s1.fastq");
        std::fs::write(&fq_path, fastq_from(&["ACGT", "ACGT", "TTTT"])).unwrap();
        let samples = vec![Sample {
            name: "s1".to_owned(),
            fastq: fq_path.clone(),
            iptg: Iptg::Zero,
            replicate: Some(1),
        }];
        let outdir = dir.path().join("counts");
        let params = CountParams::default();

        let res = count_samples(&samples, &params, &outdir, false).unwrap();
        assert_eq!(res[0].0.get("ACGT"), Some(&2));
        assert!(res[0].1.is_some());
        assert!(outdir.join("s1.tsv").exists());

        // Remove FASTQ so only the cached table can be used.
        std::fs::remove_file(&fq_path).unwrap();
        let res = count_samples(&samples, &params, &outdir, true).unwrap();
        assert_eq!(res[0].0.get("TTTT"), Some(&1));
        assert!(res[0].1.is_none());

        let stats: Vec<Option<ReadStats>> = res.into_iter().map(|(_, s)| s).collect();
        let df = read_stats_df(&samples, &stats).unwrap();
        assert_eq!(df.shape(), (1, 10));
    }
}
