use std::path::{Path, PathBuf};

use eyre::{bail, Context};
use polars::prelude::*;

use crate::{
    design::Contrast,
    io::{load_delimited, separator_for, write_tsv},
    matrix::FEATURE_COL,
    stats::benjamini_hochberg,
};

const DEFAULT_ALPHA: f64 = 0.05;
const DEFAULT_LFC_THRESHOLD: f64 = 1.0;

/// Columns kept from each model result table.
const RESULT_COLS: [&str; 4] = ["baseMean", "log2FoldChange", "pvalue", "padj"];

/// Significance thresholds applied to model results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Adjusted p-value cutoff.
    pub alpha: f64,
    /// Minimum absolute log2 fold change.
    pub lfc: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            lfc: DEFAULT_LFC_THRESHOLD,
        }
    }
}

/// Parse a result table argument. Either `name=path` or a path whose file stem is the name.
pub fn parse_result_arg(arg: &str) -> eyre::Result<(String, PathBuf)> {
    let (name, path) = if let Some((name, path)) = arg.split_once('=') {
        if name.is_empty() || path.is_empty() {
            bail!("Invalid result table argument: {arg}");
        }
        (name.to_owned(), PathBuf::from(path))
    } else {
        let path = PathBuf::from(arg);
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            bail!("Cannot get contrast name from {arg}");
        };
        (name.to_owned(), path)
    };
    if Contrast::from_name(&name).is_none() {
        log::warn!("{name} is not an IPTG contrast name. ex. iptg_10_vs_0");
    }
    Ok((name, path))
}

/// Load a DESeq2 result table.
///
/// # Arguments
/// * `path`
///     * CSV or TSV. `NA` is null.
///     * Feature ids are in `feature` or, if absent, the first column (R row names).
///
/// # Returns
/// * [`DataFrame`] with columns `[feature, baseMean, log2FoldChange, pvalue, padj]`.
///     * `padj` is Benjamini-Hochberg adjusted `pvalue` if the table has none.
pub fn load_results(path: impl AsRef<Path>) -> eyre::Result<DataFrame> {
    let path = path.as_ref();
    let mut df = load_delimited(path, separator_for(path))
        .with_context(|| format!("Failed to read result table {path:?}"))?;

    if df.column(FEATURE_COL).is_err() {
        let Some(first) = df.get_column_names().first().map(|c| c.to_string()) else {
            bail!("Result table {path:?} has no columns.");
        };
        df.rename(&first, FEATURE_COL.into())?;
    }
    for required in ["baseMean", "log2FoldChange", "pvalue"] {
        if df.column(required).is_err() {
            bail!("Result table {path:?} is missing column '{required}'.");
        }
    }
    if df.column("padj").is_err() {
        log::warn!("No padj in {path:?}. Adjusting pvalue with Benjamini-Hochberg.");
        let pvalues: Vec<Option<f64>> = df
            .column("pvalue")?
            .cast(&DataType::Float64)?
            .f64()?
            .iter()
            .collect();
        df.with_column(Column::new("padj".into(), benjamini_hochberg(&pvalues)))?;
    }

    let mut exprs = vec![col(FEATURE_COL).cast(DataType::String)];
    exprs.extend(
        RESULT_COLS
            .iter()
            .map(|c| col(*c).cast(DataType::Float64)),
    );
    let df = df.lazy().select(exprs).collect()?;
    log::info!("Loaded {} features from {path:?}", df.height());
    Ok(df)
}

/// Label each feature as `up`, `down`, `ns` (not significant) or `filtered` (no padj).
/// * Adds `neg_log10_padj` for volcano plots.
pub fn label_results(df_res: &DataFrame, thresholds: Thresholds) -> eyre::Result<DataFrame> {
    let significant = col("padj").lt(lit(thresholds.alpha));
    Ok(df_res
        .clone()
        .lazy()
        .with_columns([
            (col("padj").log(10.0) * lit(-1.0)).alias("neg_log10_padj"),
            when(col("padj").is_null())
                .then(lit("filtered"))
                .when(
                    significant
                        .clone()
                        .and(col("log2FoldChange").gt_eq(lit(thresholds.lfc))),
                )
                .then(lit("up"))
                .when(significant.and(col("log2FoldChange").lt_eq(lit(-thresholds.lfc))))
                .then(lit("down"))
                .otherwise(lit("ns"))
                .alias("label"),
        ])
        .collect()?)
}

/// Counts of each label per contrast. Has columns `[contrast, label, n]`.
pub fn summarize(df_labeled: &DataFrame) -> eyre::Result<DataFrame> {
    Ok(df_labeled
        .clone()
        .lazy()
        .group_by([col("contrast"), col("label")])
        .agg([col(FEATURE_COL).len().alias("n")])
        .sort(["contrast", "label"], Default::default())
        .collect()?)
}

/// Only `up` and `down` features, sorted by contrast then padj.
pub fn significant(df_labeled: &DataFrame) -> eyre::Result<DataFrame> {
    Ok(df_labeled
        .clone()
        .lazy()
        .filter(col("label").eq(lit("up")).or(col("label").eq(lit("down"))))
        .sort(["contrast", "padj"], Default::default())
        .collect()?)
}

/// Load, label and combine result tables of several contrasts.
///
/// # Arguments
/// * `results`
///     * Contrast name and result table path.
/// * `thresholds`
///     * [`Thresholds`]
/// * `outdir`
///     * Writes `labeled_results.tsv`, `significant.tsv` and `result_summary.tsv`.
///
/// # Returns
/// * Summary [`DataFrame`] from [`summarize`].
pub fn label_contrasts(
    results: &[(String, PathBuf)],
    thresholds: Thresholds,
    outdir: &Path,
) -> eyre::Result<DataFrame> {
    if results.is_empty() {
        bail!("No result tables to label.");
    }
    log::info!(
        "Labeling with padj < {} and |log2FoldChange| >= {}",
        thresholds.alpha,
        thresholds.lfc
    );
    let mut lfs = Vec::with_capacity(results.len());
    for (name, path) in results {
        let df = label_results(&load_results(path)?, thresholds)?;
        lfs.push(
            df.lazy()
                .with_column(lit(name.as_str()).alias("contrast"))
                .select([
                    col("contrast"),
                    col(FEATURE_COL),
                    col("baseMean"),
                    col("log2FoldChange"),
                    col("pvalue"),
                    col("padj"),
                    col("neg_log10_padj"),
                    col("label"),
                ]),
        );
    }
    let mut df_labeled = concat(lfs, UnionArgs::default())?.collect()?;
    let mut df_sig = significant(&df_labeled)?;
    let mut df_summary = summarize(&df_labeled)?;
    log::info!("Total number of significant features: {}", df_sig.height());

    std::fs::create_dir_all(outdir).with_context(|| format!("Failed to create {outdir:?}"))?;
    write_tsv(&mut df_labeled, outdir.join("labeled_results.tsv"))?;
    write_tsv(&mut df_sig, outdir.join("significant.tsv"))?;
    write_tsv(&mut df_summary, outdir.join("result_summary.tsv"))?;
    Ok(df_summary)
}
