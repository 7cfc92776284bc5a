use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

mod cli;
mod count;
mod deseq;
mod design;
mod io;
mod matrix;
mod normalize;
mod pipeline;
mod qc;
mod results;
mod samples;
mod stats;
mod translate;

use cli::{Cli, Commands};
use pipeline::{
    load_sample_counts, run_all, run_count, run_matrix, run_model, run_normalize, RunOptions,
};
use results::{label_contrasts, parse_result_arg};
use samples::load_sample_sheet;

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    SimpleLogger::new()
        .with_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .env()
        .init()?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()?;

    match cli.command {
        Commands::Count {
            samples,
            outdir,
            count,
            resume,
        } => {
            let samples = load_sample_sheet(samples)?;
            run_count(&samples, &count.params(), &outdir, resume)?;
        }
        Commands::Matrix {
            samples,
            counts,
            output,
            prefilter,
        } => {
            let samples = load_sample_sheet(samples)?;
            let sample_counts = load_sample_counts(&samples, &counts)?;
            run_matrix(&samples, &sample_counts, &output, prefilter)?;
        }
        Commands::Normalize {
            samples,
            counts,
            outdir,
            sf_method,
        } => {
            let samples = load_sample_sheet(samples)?;
            run_normalize(&samples, &counts, &outdir, sf_method)?;
        }
        Commands::Deseq {
            samples,
            counts,
            outdir,
            model,
        } => {
            let samples = load_sample_sheet(samples)?;
            let results = run_model(&samples, &counts, &outdir, &model)?;
            for (name, path) in results {
                log::info!("{name}: {path:?}");
            }
        }
        Commands::Label {
            results,
            outdir,
            thresholds,
        } => {
            let results = results
                .iter()
                .map(|arg| parse_result_arg(arg))
                .collect::<eyre::Result<Vec<_>>>()?;
            label_contrasts(&results, thresholds.into(), &outdir)?;
        }
        Commands::Run {
            samples,
            outdir,
            count,
            prefilter,
            model,
            thresholds,
            resume,
            skip_model,
        } => run_all(
            &samples,
            &outdir,
            RunOptions {
                count: count.params(),
                prefilter,
                model: &model,
                thresholds: thresholds.into(),
                resume,
                skip_model,
            },
        )?,
    }
    Ok(())
}
