use std::{collections::HashMap, path::Path};

use eyre::bail;
use itertools::Itertools;
use polars::prelude::*;

use crate::{count::FeatureCounts, io::load_tsv, samples::Sample};

pub const FEATURE_COL: &str = "feature";

/// Join per-sample counts into one count matrix.
///
/// # Arguments
/// * `samples`
///     * Samples in the order their columns should appear.
/// * `counts`
///     * Feature counts for each sample. Same order as `samples`.
///
/// # Returns
/// * [`DataFrame`] with columns `[feature, sample_1, ..., sample_n]`.
///     * Features absent from a sample have a count of 0.
///     * Sorted by total count descending then feature.
pub fn join_counts(samples: &[Sample], counts: &[FeatureCounts]) -> eyre::Result<DataFrame> {
    if samples.len() != counts.len() {
        bail!(
            "Got {} samples but {} count tables.",
            samples.len(),
            counts.len()
        );
    }
    let n_samples = samples.len();
    let mut rows: HashMap<&str, Vec<u64>> = HashMap::new();
    for (i, sample_counts) in counts.iter().enumerate() {
        for (feature, cnt) in sample_counts.iter() {
            rows.entry(feature.as_str())
                .or_insert_with(|| vec![0; n_samples])[i] += cnt;
        }
    }

    let sorted_rows = rows
        .into_iter()
        .map(|(feature, cnts)| (cnts.iter().sum::<u64>(), feature, cnts))
        .sorted_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)))
        .collect_vec();

    let features: Vec<&str> = sorted_rows.iter().map(|(_, feature, _)| *feature).collect();
    let mut columns = vec![Column::new(FEATURE_COL.into(), features)];
    for (i, sample) in samples.iter().enumerate() {
        let sample_cnts: Vec<u64> = sorted_rows.iter().map(|(_, _, cnts)| cnts[i]).collect();
        columns.push(Column::new(sample.name.as_str().into(), sample_cnts));
    }
    let df = DataFrame::new(columns)?;
    log::info!("Total number of features in count matrix: {}", df.height());
    Ok(df)
}

/// Names of the sample columns in a count matrix.
pub fn sample_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != FEATURE_COL)
        .map(|name| name.to_string())
        .collect()
}

/// Remove features with too little evidence to model.
///
/// # Arguments
/// * `df_counts`
///     * Count matrix with columns `[feature, sample_1, ..., sample_n]`.
/// * `min_total`
///     * Minimum summed count across all samples.
/// * `min_samples`
///     * Minimum number of samples with a non-zero count.
pub fn filter_low_counts(
    df_counts: &DataFrame,
    min_total: u64,
    min_samples: usize,
) -> eyre::Result<DataFrame> {
    let samples = sample_columns(df_counts);
    let total = samples
        .iter()
        .fold(lit(0u64), |acc, s| acc + col(s.as_str()).cast(DataType::UInt64));
    let n_nonzero = samples.iter().fold(lit(0u32), |acc, s| {
        acc + col(s.as_str()).gt(lit(0)).cast(DataType::UInt32)
    });
    let df = df_counts
        .clone()
        .lazy()
        .filter(
            total
                .gt_eq(lit(min_total))
                .and(n_nonzero.gt_eq(lit(min_samples as u32))),
        )
        .collect()?;
    log::info!(
        "Kept {} of {} features with total count >= {min_total} in >= {min_samples} sample(s).",
        df.height(),
        df_counts.height()
    );
    Ok(df)
}

/// Load a count matrix and check it has the expected layout.
pub fn load_count_matrix(path: impl AsRef<Path>) -> eyre::Result<DataFrame> {
    let df = load_tsv(&path)?;
    if df.column(FEATURE_COL).is_err() {
        bail!(
            "Count matrix {:?} has no '{FEATURE_COL}' column.",
            path.as_ref()
        );
    }
    if sample_columns(&df).is_empty() {
        bail!("Count matrix {:?} has no sample columns.", path.as_ref());
    }
    Ok(df)
}

/// Counts of every sample column as `f64` vectors in column order.
pub fn count_columns(df: &DataFrame, samples: &[String]) -> eyre::Result<Vec<Vec<f64>>> {
    samples
        .iter()
        .map(|s| -> eyre::Result<Vec<f64>> {
            let col = df.column(s)?.cast(&DataType::Float64)?;
            Ok(col.f64()?.iter().map(|v| v.unwrap_or(0.0)).collect())
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::*;
    use crate::{io::write_tsv, samples::Iptg};

    fn sample(name: &str) -> Sample {
        Sample {
            name: name.to_owned(),
            fastq: PathBuf::from(format!("{name}.fq")),
            iptg: Iptg::Zero,
            replicate: None,
        }
    }

    fn counts(pairs: &[(&str, u64)]) -> FeatureCounts {
        pairs.iter().map(|(f, c)| (f.to_string(), *c)).collect()
    }

    #[test]
    fn test_join_counts() {
        let samples = vec![sample("a"), sample("b")];
        let df = join_counts(
            &samples,
            &[counts(&[("X", 5), ("Y", 1)]), counts(&[("Y", 2), ("Z", 4)])],
        )
        .unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["feature", "a", "b"]);
        let features: Vec<&str> = df.column("feature").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(features, vec!["X", "Z", "Y"]);
        let col_b: Vec<u64> = df.column("b").unwrap().u64().unwrap().into_no_null_iter().collect();
        assert_eq!(col_b, vec![0, 4, 2]);
    }

    #[test]
    fn test_join_counts_mismatch() {
        assert!(join_counts(&[sample("a")], &[]).is_err());
    }

    #[test]
    fn test_filter_low_counts() {
        let samples = vec![sample("a"), sample("b")];
        let df = join_counts(
            &samples,
            &[counts(&[("X", 5), ("Y", 1)]), counts(&[("X", 5), ("Z", 12)])],
        )
        .unwrap();
        let df_total = filter_low_counts(&df, 10, 1).unwrap();
        let features: Vec<&str> = df_total.column("feature").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(features, vec!["Z", "X"]);

        let df_both = filter_low_counts(&df, 0, 2).unwrap();
        assert_eq!(df_both.height(), 1);
    }

    #[test]
    fn test_load_count_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.tsv");
        let mut df = join_counts(&[sample("a")], &[counts(&[("NA", 5)])]).unwrap();
        write_tsv(&mut df, &path).unwrap();
        let df = load_count_matrix(&path).unwrap();
        let features: Vec<Option<&str>> = df.column("feature").unwrap().str().unwrap().iter().collect();
        assert_eq!(features, vec![Some("NA")]);
        assert_eq!(sample_columns(&df), vec!["a".to_owned()]);
        assert_eq!(count_columns(&df, &sample_columns(&df)).unwrap(), vec![vec![5.0]]);
    }
}
