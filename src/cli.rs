use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    count::CountParams,
    normalize::SizeFactorMethod,
    qc::{
        ReadFilter, DEFAULT_ERROR_RATE, DEFAULT_MAX_N, DEFAULT_MIN_LENGTH,
        DEFAULT_MIN_MEAN_QUALITY, DEFAULT_MIN_OVERLAP, DEFAULT_TRIM_QUALITY,
    },
    results::Thresholds,
    translate::FeatureMode,
};

#[derive(Parser, Debug)]
#[command(
    name = "rs-selseq",
    author,
    version,
    about = "Count and model amplicon reads from an IPTG selection experiment",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of threads.
    #[arg(short, long, global = true, default_value_t = 4)]
    pub threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trim, filter and count reads of each sample.
    Count {
        /// Sample sheet. Columns: sample, fastq, iptg, [replicate]
        #[arg(short, long)]
        samples: PathBuf,
        /// Output directory for per-sample counts and read stats.
        #[arg(short, long)]
        outdir: PathBuf,
        #[command(flatten)]
        count: CountArgs,
        /// Reuse existing per-sample count tables.
        #[arg(long)]
        resume: bool,
    },
    /// Join per-sample count tables into a count matrix.
    Matrix {
        #[arg(short, long)]
        samples: PathBuf,
        /// Directory of per-sample count tables from `count`.
        #[arg(short, long)]
        counts: PathBuf,
        /// Output count matrix.
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        prefilter: PrefilterArgs,
    },
    /// Estimate size factors and normalize a count matrix.
    Normalize {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(short, long)]
        counts: PathBuf,
        #[arg(short, long)]
        outdir: PathBuf,
        #[arg(long, value_enum, default_value_t = SizeFactorMethod::Ratio)]
        sf_method: SizeFactorMethod,
    },
    /// Write and run the DESeq2 driver script.
    Deseq {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(short, long)]
        counts: PathBuf,
        #[arg(short, long)]
        outdir: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Label model results with significance thresholds.
    Label {
        /// Result tables as `name=path` or a path named after its contrast. ex. `iptg_10_vs_0.csv`
        #[arg(short, long = "result", required = true, num_args = 1..)]
        results: Vec<String>,
        #[arg(short, long)]
        outdir: PathBuf,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Run every step.
    Run {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(short, long)]
        outdir: PathBuf,
        #[command(flatten)]
        count: CountArgs,
        #[command(flatten)]
        prefilter: PrefilterArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
        #[arg(long)]
        resume: bool,
        /// Stop after normalization.
        #[arg(long)]
        skip_model: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CountArgs {
    /// 5' adapter or primer. Removed with everything before it.
    #[arg(short = 'g', long)]
    pub front: Option<String>,
    /// 3' adapter. Removed with everything after it.
    #[arg(short = 'a', long)]
    pub adapter: Option<String>,
    /// Allowed mismatches per adapter base.
    #[arg(short = 'e', long, default_value_t = DEFAULT_ERROR_RATE)]
    pub error_rate: f64,
    /// Minimum partial adapter overlap at read ends.
    #[arg(long, default_value_t = DEFAULT_MIN_OVERLAP)]
    pub min_overlap: usize,
    /// Discard reads where no adapter was found.
    #[arg(long)]
    pub discard_untrimmed: bool,
    /// 3' quality trimming cutoff. 0 disables.
    #[arg(short = 'q', long, default_value_t = DEFAULT_TRIM_QUALITY)]
    pub trim_quality: u8,
    #[arg(short = 'm', long, default_value_t = DEFAULT_MIN_LENGTH)]
    pub min_length: usize,
    #[arg(short = 'M', long)]
    pub max_length: Option<usize>,
    /// Maximum number of N bases.
    #[arg(long, default_value_t = DEFAULT_MAX_N)]
    pub max_n: usize,
    /// Minimum mean phred score of the trimmed read.
    #[arg(long, default_value_t = DEFAULT_MIN_MEAN_QUALITY)]
    pub min_mean_quality: f64,
    /// Count reads as nucleotide sequences or as translated peptides.
    #[arg(long, value_enum, default_value_t = FeatureMode::Nucleotide)]
    pub mode: FeatureMode,
}

impl CountArgs {
    pub fn params(&self) -> CountParams {
        CountParams {
            filter: ReadFilter {
                front: self.front.as_ref().map(|s| s.to_ascii_uppercase().into_bytes()),
                adapter: self.adapter.as_ref().map(|s| s.to_ascii_uppercase().into_bytes()),
                error_rate: self.error_rate,
                min_overlap: self.min_overlap,
                discard_untrimmed: self.discard_untrimmed,
                trim_quality: self.trim_quality,
                min_length: self.min_length,
                max_length: self.max_length,
                max_n: self.max_n,
                min_mean_quality: self.min_mean_quality,
            },
            mode: self.mode,
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
pub struct PrefilterArgs {
    /// Minimum total count of a feature across samples.
    #[arg(long, default_value_t = 10)]
    pub min_total: u64,
    /// Minimum number of samples a feature is seen in.
    #[arg(long, default_value_t = 1)]
    pub min_samples: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Significance level passed to DESeq2 results().
    #[arg(long, default_value_t = 0.05)]
    pub model_alpha: f64,
    /// Shrink log2 fold changes with lfcShrink().
    #[arg(long)]
    pub shrink: bool,
    #[arg(long, value_enum, default_value_t = SizeFactorMethod::Ratio)]
    pub sf_method: SizeFactorMethod,
    /// Rscript binary.
    #[arg(long, default_value = "Rscript")]
    pub rscript: String,
    /// Only write the driver script.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct ThresholdArgs {
    /// Adjusted p-value cutoff.
    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,
    /// Minimum absolute log2 fold change.
    #[arg(long, default_value_t = 1.0)]
    pub lfc_threshold: f64,
}

impl From<ThresholdArgs> for Thresholds {
    fn from(args: ThresholdArgs) -> Self {
        Thresholds {
            alpha: args.alpha,
            lfc: args.lfc_threshold,
        }
    }
}
