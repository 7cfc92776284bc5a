use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use eyre::{bail, Context};
use itertools::Itertools;

use crate::{design::Contrast, normalize::SizeFactorMethod, samples::Iptg};

// Driver for the negative binomial model. DESeq2 does the fitting, testing and plotting.
pub const DESEQ_R: &str = r#"
# rs-selseq DESeq2 driver
#
# Fits ~ iptg per feature and tests each IPTG group against {{baseline}}.

suppressPackageStartupMessages(library(DESeq2))

write("Loading count matrix", stderr())

counts <- read.table(
    "{{counts}}",
    header = TRUE,
    sep = "\t",
    row.names = 1,
    check.names = FALSE,
    quote = "",
    comment.char = ""
)
coldata <- read.table(
    "{{coldata}}",
    header = TRUE,
    sep = "\t",
    row.names = 1,
    check.names = FALSE,
    stringsAsFactors = FALSE
)
counts <- as.matrix(counts[, rownames(coldata), drop = FALSE])
coldata$iptg <- relevel(factor(coldata$iptg), ref = "{{baseline}}")

dds <- DESeqDataSetFromMatrix(countData = counts, colData = coldata, design = ~ iptg)
dds <- estimateSizeFactors(dds, type = "{{sf_type}}")

write("Fitting negative binomial GLM", stderr())
dds <- DESeq(dds)

write.table(
    data.frame(sample = colnames(dds), size_factor = sizeFactors(dds)),
    file = file.path("{{outdir}}", "deseq_size_factors.tsv"),
    sep = "\t",
    quote = FALSE,
    row.names = FALSE
)

pdf(file.path("{{outdir}}", "diagnostics.pdf"))
plotDispEsts(dds)

vsd <- varianceStabilizingTransformation(dds, blind = TRUE)
print(plotPCA(vsd, intgroup = "iptg"))

sample_dists <- as.matrix(dist(t(assay(vsd))))
heatmap(sample_dists, symm = TRUE, main = "Sample distances")

for (level in c({{levels}})) {
    contrast <- c("iptg", level, "{{baseline}}")
    name <- paste0("iptg_", sub("uM", "", level), "_vs_", sub("uM", "", "{{baseline}}"))
    write(paste("Testing", name), stderr())

    res <- results(dds, contrast = contrast, alpha = {{alpha}})
    if ({{shrink}}) {
        res <- lfcShrink(dds, contrast = contrast, res = res, type = "normal")
    }
    plotMA(res, main = name, alpha = {{alpha}})
    plot(
        res$log2FoldChange,
        -log10(res$padj),
        pch = 20,
        cex = 0.4,
        main = name,
        xlab = "log2FoldChange",
        ylab = "-log10(padj)"
    )

    res_df <- data.frame(feature = rownames(res), as.data.frame(res), check.names = FALSE)
    write.csv(res_df, file.path("{{outdir}}", paste0(name, ".csv")), row.names = FALSE)
}
invisible(dev.off())

write("Done", stderr())
"#;

/// Inputs for the DESeq2 driver script.
#[derive(Debug, Clone)]
pub struct DeseqInputs {
    pub counts: PathBuf,
    pub coldata: PathBuf,
    pub outdir: PathBuf,
    pub contrasts: Vec<Contrast>,
    pub alpha: f64,
    pub shrink: bool,
    pub sf_method: SizeFactorMethod,
}

fn r_path(path: &Path) -> eyre::Result<String> {
    let Some(path) = path.to_str() else {
        bail!("Path is not valid UTF-8: {path:?}");
    };
    // R string literal.
    Ok(path.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Fill in the driver script template.
pub fn render_script(inputs: &DeseqInputs) -> eyre::Result<String> {
    if inputs.contrasts.is_empty() {
        bail!("No contrasts to test.");
    }
    if !(0.0..=1.0).contains(&inputs.alpha) {
        bail!("alpha must be within [0, 1]. Got {}.", inputs.alpha);
    }
    let levels = inputs
        .contrasts
        .iter()
        .map(|c| format!("\"{}\"", c.numerator.label()))
        .join(", ");
    let sf_type = match inputs.sf_method {
        SizeFactorMethod::Ratio => "ratio",
        SizeFactorMethod::PosCounts => "poscounts",
    };
    Ok(DESEQ_R
        .replace("{{counts}}", &r_path(&inputs.counts)?)
        .replace("{{coldata}}", &r_path(&inputs.coldata)?)
        .replace("{{outdir}}", &r_path(&inputs.outdir)?)
        .replace("{{baseline}}", &Iptg::BASELINE.label())
        .replace("{{levels}}", &levels)
        .replace("{{alpha}}", &inputs.alpha.to_string())
        .replace("{{shrink}}", if inputs.shrink { "TRUE" } else { "FALSE" })
        .replace("{{sf_type}}", sf_type))
}

/// Write the driver script to `{outdir}/deseq.R` and run it with `rscript` unless `dry_run`.
///
/// # Returns
/// * Paths of the per-contrast result tables the script writes. ex. `{outdir}/iptg_10_vs_0.csv`
pub fn run_deseq(
    inputs: &DeseqInputs,
    rscript: &str,
    dry_run: bool,
) -> eyre::Result<Vec<(Contrast, PathBuf)>> {
    fs::create_dir_all(&inputs.outdir)
        .with_context(|| format!("Failed to create {:?}", inputs.outdir))?;
    let script_path = inputs.outdir.join("deseq.R");
    fs::write(&script_path, render_script(inputs)?)
        .with_context(|| format!("Failed to write {script_path:?}"))?;
    log::info!("Wrote DESeq2 driver: {script_path:?}");

    let result_paths = inputs
        .contrasts
        .iter()
        .map(|c| (*c, inputs.outdir.join(format!("{}.csv", c.name()))))
        .collect();
    if dry_run {
        log::info!("Dry run. Not running {rscript}.");
        return Ok(result_paths);
    }

    log::info!("Running {rscript} {script_path:?}");
    let status = Command::new(rscript)
        .arg(&script_path)
        .status()
        .with_context(|| format!("Failed to launch `{rscript}`. Is R installed?"))?;
    if !status.success() {
        bail!("`{rscript} {script_path:?}` failed with {status}.");
    }
    Ok(result_paths)
}
