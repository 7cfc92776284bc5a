use std::{fs, path::Path};

use eyre::{bail, Context};

use crate::{
    cli::{ModelArgs, PrefilterArgs},
    count::{count_samples, df_to_counts, read_stats_df, CountParams, FeatureCounts},
    deseq::{run_deseq, DeseqInputs},
    design::testable_contrasts,
    io::{load_tsv, write_tsv},
    matrix::{filter_low_counts, join_counts, load_count_matrix},
    normalize::{group_means, normalized_counts, size_factors, size_factors_df, SizeFactorMethod},
    results::{label_contrasts, Thresholds},
    samples::{coldata, load_sample_sheet, Sample},
};

const COUNTS_DIR: &str = "counts";

/// Count every sample and write `{outdir}/counts/{sample}.tsv` and `{outdir}/read_stats.tsv`.
pub fn run_count(
    samples: &[Sample],
    params: &CountParams,
    outdir: &Path,
    resume: bool,
) -> eyre::Result<Vec<FeatureCounts>> {
    let counted = count_samples(samples, params, &outdir.join(COUNTS_DIR), resume)?;
    let (counts, stats): (Vec<FeatureCounts>, Vec<_>) = counted.into_iter().unzip();
    let mut df_stats = read_stats_df(samples, &stats)?;
    write_tsv(&mut df_stats, outdir.join("read_stats.tsv"))?;
    Ok(counts)
}

/// Load per-sample count tables written by [`run_count`].
pub fn load_sample_counts(samples: &[Sample], counts_dir: &Path) -> eyre::Result<Vec<FeatureCounts>> {
    samples
        .iter()
        .map(|sample| {
            let path = counts_dir.join(format!("{}.tsv", sample.name));
            df_to_counts(&load_tsv(&path).with_context(|| {
                format!("No count table for sample {} at {path:?}", sample.name)
            })?)
        })
        .collect()
}

/// Join counts into `counts_raw.tsv` next to `output` and the prefiltered matrix at `output`.
pub fn run_matrix(
    samples: &[Sample],
    counts: &[FeatureCounts],
    output: &Path,
    prefilter: PrefilterArgs,
) -> eyre::Result<()> {
    let mut df_raw = join_counts(samples, counts)?;
    let raw_path = output.with_file_name("counts_raw.tsv");
    if raw_path != output {
        write_tsv(&mut df_raw, raw_path)?;
    }
    let mut df = filter_low_counts(&df_raw, prefilter.min_total, prefilter.min_samples)?;
    if df.height() == 0 {
        bail!("No features left after prefiltering.");
    }
    write_tsv(&mut df, output)?;
    Ok(())
}

/// Write `size_factors.tsv`, `normalized_counts.tsv`, `group_means.tsv` and `coldata.tsv` to `outdir`.
pub fn run_normalize(
    samples: &[Sample],
    counts_path: &Path,
    outdir: &Path,
    method: SizeFactorMethod,
) -> eyre::Result<()> {
    fs::create_dir_all(outdir).with_context(|| format!("Failed to create {outdir:?}"))?;
    let df_counts = load_count_matrix(counts_path)?;
    let sfs = size_factors(&df_counts, method)?;
    let mut df_norm = normalized_counts(&df_counts, &sfs)?;
    let mut df_means = group_means(&df_norm, samples)?;
    let mut df_sf = size_factors_df(&df_counts, &sfs)?;
    let mut df_coldata = coldata(samples)?;

    write_tsv(&mut df_sf, outdir.join("size_factors.tsv"))?;
    write_tsv(&mut df_norm, outdir.join("normalized_counts.tsv"))?;
    write_tsv(&mut df_means, outdir.join("group_means.tsv"))?;
    write_tsv(&mut df_coldata, outdir.join("coldata.tsv"))?;
    Ok(())
}

/// Write `coldata.tsv` and run the DESeq2 driver. Returns the expected result tables.
pub fn run_model(
    samples: &[Sample],
    counts_path: &Path,
    outdir: &Path,
    model: &ModelArgs,
) -> eyre::Result<Vec<(String, std::path::PathBuf)>> {
    fs::create_dir_all(outdir).with_context(|| format!("Failed to create {outdir:?}"))?;
    let contrasts = testable_contrasts(samples)?;
    let coldata_path = outdir.join("coldata.tsv");
    write_tsv(&mut coldata(samples)?, &coldata_path)?;

    let inputs = DeseqInputs {
        counts: counts_path
            .canonicalize()
            .with_context(|| format!("Cannot find count matrix {counts_path:?}"))?,
        coldata: coldata_path
            .canonicalize()
            .with_context(|| format!("Cannot find colData {coldata_path:?}"))?,
        outdir: outdir
            .canonicalize()
            .with_context(|| format!("Cannot find output directory {outdir:?}"))?,
        contrasts,
        alpha: model.model_alpha,
        shrink: model.shrink,
        sf_method: model.sf_method,
    };
    Ok(run_deseq(&inputs, &model.rscript, model.dry_run)?
        .into_iter()
        .map(|(contrast, path)| (contrast.name(), path))
        .collect())
}

pub struct RunOptions<'a> {
    pub count: CountParams,
    pub prefilter: PrefilterArgs,
    pub model: &'a ModelArgs,
    pub thresholds: Thresholds,
    pub resume: bool,
    pub skip_model: bool,
}

/// Run every step from FASTQs to labeled results.
///
/// # Arguments
/// * `sample_sheet`
///     * Sample sheet path.
/// * `outdir`
///     * Output directory.
///         * `counts/`: per-sample counts
///         * `read_stats.tsv`, `counts_raw.tsv`, `counts.tsv`
///         * `normalized/`: size factors, normalized counts, group means
///         * `deseq/`: driver script, per-contrast results, diagnostic plots
///         * `labeled/`: labeled results
pub fn run_all(sample_sheet: &Path, outdir: &Path, opts: RunOptions<'_>) -> eyre::Result<()> {
    let samples = load_sample_sheet(sample_sheet)?;
    fs::create_dir_all(outdir).with_context(|| format!("Failed to create {outdir:?}"))?;

    let counts = run_count(&samples, &opts.count, outdir, opts.resume)?;
    let counts_path = outdir.join("counts.tsv");
    run_matrix(&samples, &counts, &counts_path, opts.prefilter)?;
    run_normalize(
        &samples,
        &counts_path,
        &outdir.join("normalized"),
        opts.model.sf_method,
    )?;
    if opts.skip_model {
        log::info!("Skipping model.");
        return Ok(());
    }

    let results = run_model(&samples, &counts_path, &outdir.join("deseq"), opts.model)?;
    let available: Vec<_> = results.into_iter().filter(|(_, path)| path.exists()).collect();
    if available.is_empty() {
        log::warn!("No model result tables found. Skipping labeling.");
        return Ok(());
    }
    label_contrasts(&available, opts.thresholds, &outdir.join("labeled"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::fmt::Write;

    use super::*;
    use crate::translate::FeatureMode;

    // Two features at a 1:1 ratio in baseline and 1:4 with 100 µM.
    fn write_experiment(dir: &Path) -> std::path::PathBuf {
        let mut sheet = String::from("sample\tfastq\tiptg\treplicate\n");
        for (name, iptg, n_a, n_b) in [("c1", 0, 20, 20), ("c2", 0, 30, 30), ("t1", 100, 10, 40)] {
            let mut fq = String::new();
            for i in 0..n_a {
                write!(fq, "@{name}_a{i}\nATGAAAGATCGG\n+\nIIIIIIIIIIII\n").unwrap();
            }
            for i in 0..n_b {
                write!(fq, "@{name}_b{i}\nATGTGGGATCGG\n+\nIIIIIIIIIIII\n").unwrap();
            }
            fs::write(dir.join(format!("{name}.fastq")), fq).unwrap();
            writeln!(sheet, "{name}\t{name}.fastq\t{iptg}\t1").unwrap();
        }
        let path = dir.join("samples.tsv");
        fs::write(&path, sheet).unwrap();
        path
    }

    fn model_args() -> ModelArgs {
        ModelArgs {
            model_alpha: 0.05,
            shrink: false,
            sf_method: SizeFactorMethod::Ratio,
            rscript: "Rscript".to_owned(),
            dry_run: true,
        }
    }

    #[test]
    fn test_run_all_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = write_experiment(dir.path());
        let outdir = dir.path().join("out");
        let model = model_args();
        let opts = RunOptions {
            count: CountParams {
                filter: crate::qc::ReadFilter {
                    adapter: Some(b"GATCGG".to_vec()),
                    ..Default::default()
                },
                mode: FeatureMode::Peptide,
            },
            prefilter: PrefilterArgs {
                min_total: 10,
                min_samples: 1,
            },
            model: &model,
            thresholds: Thresholds::default(),
            resume: false,
            skip_model: false,
        };
        run_all(&sheet, &outdir, opts).unwrap();

        let df_counts = load_count_matrix(outdir.join("counts.tsv")).unwrap();
        assert_eq!(df_counts.shape(), (2, 4));
        let features: Vec<&str> = df_counts.column("feature").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(features, vec!["MW", "MK"]);

        assert!(outdir.join("read_stats.tsv").exists());
        assert!(outdir.join("counts_raw.tsv").exists());
        assert!(outdir.join("normalized/size_factors.tsv").exists());
        assert!(outdir.join("normalized/group_means.tsv").exists());
        assert!(outdir.join("deseq/deseq.R").exists());
        assert!(outdir.join("deseq/coldata.tsv").exists());
        // Dry run writes no results so nothing is labeled.
        assert!(!outdir.join("labeled").exists());
    }

    #[test]
    fn test_run_model_missing_counts() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = write_experiment(dir.path());
        let samples = load_sample_sheet(&sheet).unwrap();
        let counts_path = dir.path().join("missing.tsv");
        let err = run_model(&samples, &counts_path, &dir.path().join("deseq"), &model_args())
            .unwrap_err();
        assert!(format!("{err:?}").contains("missing.tsv"));
    }

    #[test]
    fn test_count_then_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = write_experiment(dir.path());
        let samples = load_sample_sheet(&sheet).unwrap();
        let outdir = dir.path().join("out");
        run_count(&samples, &CountParams::default(), &outdir, false).unwrap();

        let counts = load_sample_counts(&samples, &outdir.join(COUNTS_DIR)).unwrap();
        assert_eq!(counts[2].get("ATGTGGGATCGG"), Some(&40));
        let output = outdir.join("counts.tsv");
        run_matrix(
            &samples,
            &counts,
            &output,
            PrefilterArgs {
                min_total: 1000,
                min_samples: 1,
            },
        )
        .unwrap_err();
    }
}
