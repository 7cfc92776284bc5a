use clap::ValueEnum;
use eyre::bail;
use polars::prelude::*;

use crate::{
    matrix::{count_columns, sample_columns, FEATURE_COL},
    samples::{Iptg, Sample},
    stats::{geometric_mean, median},
};

const PSEUDOCOUNT: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SizeFactorMethod {
    /// Median of ratios to the per-feature geometric mean. Needs features with no zero counts.
    #[default]
    Ratio,
    /// Median of ratios using positive counts only. For sparse libraries.
    PosCounts,
}

/// Estimate per-sample size factors.
///
/// # Arguments
/// * `df_counts`
///     * Count matrix with columns `[feature, sample_1, ..., sample_n]`.
/// * `method`
///     * [`SizeFactorMethod`]
///
/// # Returns
/// * Size factors in sample column order.
pub fn size_factors(df_counts: &DataFrame, method: SizeFactorMethod) -> eyre::Result<Vec<f64>> {
    let samples = sample_columns(df_counts);
    let cols = count_columns(df_counts, &samples)?;
    let n_samples = samples.len() as f64;
    let n_features = df_counts.height();

    // Per-feature log geometric mean. None if the feature is excluded.
    let log_geo_means: Vec<Option<f64>> = (0..n_features)
        .map(|i| {
            let row: Vec<f64> = cols.iter().map(|c| c[i]).collect();
            match method {
                SizeFactorMethod::Ratio => row
                    .iter()
                    .all(|c| *c > 0.0)
                    .then(|| row.iter().map(|c| c.ln()).sum::<f64>() / n_samples),
                SizeFactorMethod::PosCounts => row.iter().any(|c| *c > 0.0).then(|| {
                    row.iter()
                        .filter(|c| **c > 0.0)
                        .map(|c| c.ln())
                        .sum::<f64>()
                        / n_samples
                }),
            }
        })
        .collect();

    if log_geo_means.iter().all(Option::is_none) {
        bail!(
            "Cannot estimate size factors with {method:?}. Every feature has a zero count in at least one sample."
        );
    }

    let mut sfs = Vec::with_capacity(samples.len());
    for (sample, cnts) in samples.iter().zip(cols.iter()) {
        let log_ratios: Vec<f64> = cnts
            .iter()
            .zip(log_geo_means.iter())
            .filter_map(|(c, lgm)| {
                let lgm = (*lgm)?;
                (*c > 0.0).then(|| c.ln() - lgm)
            })
            .collect();
        let Some(med) = median(&log_ratios) else {
            bail!("Cannot estimate size factor for sample {sample}. No usable counts.");
        };
        sfs.push(med.exp());
    }

    if method == SizeFactorMethod::PosCounts {
        let gm = geometric_mean(&sfs);
        sfs.iter_mut().for_each(|sf| *sf /= gm);
    }

    for (sample, sf) in samples.iter().zip(sfs.iter()) {
        log::info!("Size factor for {sample}: {sf:.4}");
    }
    Ok(sfs)
}

/// Size factor table with columns `[sample, size_factor, library_size]`.
pub fn size_factors_df(df_counts: &DataFrame, sfs: &[f64]) -> eyre::Result<DataFrame> {
    let samples = sample_columns(df_counts);
    let lib_sizes: Vec<f64> = count_columns(df_counts, &samples)?
        .iter()
        .map(|c| c.iter().sum())
        .collect();
    Ok(DataFrame::new(vec![
        Column::new("sample".into(), samples),
        Column::new("size_factor".into(), sfs.to_vec()),
        Column::new("library_size".into(), lib_sizes),
    ])?)
}

/// Divide each sample's counts by its size factor.
pub fn normalized_counts(df_counts: &DataFrame, sfs: &[f64]) -> eyre::Result<DataFrame> {
    let samples = sample_columns(df_counts);
    if samples.len() != sfs.len() {
        bail!("Got {} size factors for {} samples.", sfs.len(), samples.len());
    }
    let exprs: Vec<Expr> = samples
        .iter()
        .zip(sfs.iter())
        .map(|(s, sf)| (col(s.as_str()).cast(DataType::Float64) / lit(*sf)).alias(s.as_str()))
        .collect();
    Ok(df_counts.clone().lazy().with_columns(exprs).collect()?)
}

/// Mean normalized count per IPTG group and a descriptive log2 ratio of each group to the baseline.
///
/// # Arguments
/// * `df_norm`
///     * Normalized count matrix.
/// * `samples`
///     * Samples whose names match the matrix columns.
///
/// # Returns
/// * [`DataFrame`] with columns `[feature, mean_{grp}..., log2ratio_{grp}_vs_0uM...]`.
///     * Only groups with samples are included.
///     * `log2((mean_grp + 1) / (mean_0uM + 1))`. Not a model estimate.
pub fn group_means(df_norm: &DataFrame, samples: &[Sample]) -> eyre::Result<DataFrame> {
    for sample in samples {
        if df_norm.column(&sample.name).is_err() {
            bail!("Sample {} is not in the count matrix.", sample.name);
        }
    }
    let groups: Vec<Iptg> = Iptg::ALL
        .into_iter()
        .filter(|grp| samples.iter().any(|s| s.iptg == *grp))
        .collect();

    let mut exprs = vec![col(FEATURE_COL)];
    for grp in groups.iter() {
        let members: Vec<&Sample> = samples.iter().filter(|s| s.iptg == *grp).collect();
        let n = members.len() as f64;
        let sum = members
            .iter()
            .fold(lit(0.0), |acc, s| acc + col(s.name.as_str()).cast(DataType::Float64));
        exprs.push((sum / lit(n)).alias(format!("mean_{grp}")));
    }

    let mut lf = df_norm.clone().lazy().select(exprs);
    if groups.contains(&Iptg::BASELINE) {
        let baseline = col(format!("mean_{}", Iptg::BASELINE).as_str());
        let ratios: Vec<Expr> = groups
            .iter()
            .filter(|grp| **grp != Iptg::BASELINE)
            .map(|grp| {
                let ratio = (col(format!("mean_{grp}").as_str()) + lit(PSEUDOCOUNT))
                    / (baseline.clone() + lit(PSEUDOCOUNT));
                ratio
                    .log(2.0)
                    .alias(format!("log2ratio_{grp}_vs_{}", Iptg::BASELINE))
            })
            .collect();
        lf = lf.with_columns(ratios);
    } else {
        log::warn!("No {} samples. Skipping log2 ratios.", Iptg::BASELINE);
    }
    Ok(lf.collect()?)
}
