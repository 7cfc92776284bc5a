use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

use eyre::{bail, Context};
use polars::prelude::*;

use crate::io::load_tsv;

/// IPTG inducer concentration groups of the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Iptg {
    Zero,
    One,
    Ten,
    Hundred,
}

impl Iptg {
    pub const ALL: [Iptg; 4] = [Iptg::Zero, Iptg::One, Iptg::Ten, Iptg::Hundred];
    /// Every other group is compared against this one.
    pub const BASELINE: Iptg = Iptg::Zero;

    pub fn micromolar(self) -> u32 {
        match self {
            Iptg::Zero => 0,
            Iptg::One => 1,
            Iptg::Ten => 10,
            Iptg::Hundred => 100,
        }
    }

    pub fn from_micromolar(conc: f64) -> Option<Self> {
        Iptg::ALL
            .into_iter()
            .find(|grp| (grp.micromolar() as f64 - conc).abs() < f64::EPSILON)
    }

    /// Factor level used in the colData and the R driver. ex. `10uM`
    pub fn label(self) -> String {
        format!("{}uM", self.micromolar())
    }
}

impl fmt::Display for Iptg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub fastq: PathBuf,
    pub iptg: Iptg,
    pub replicate: Option<u32>,
}

/// Read the sample sheet.
///
/// # Arguments
/// * `path`
///     * TSV with header. Required columns: `[sample, fastq, iptg]`. Optional: `[replicate]`.
///     * `iptg` is the inducer concentration in µM. One of 0, 1, 10, 100.
///     * Relative FASTQ paths are resolved against the directory of the sheet.
///
/// # Returns
/// * Samples in sheet order.
pub fn load_sample_sheet(path: impl AsRef<Path>) -> eyre::Result<Vec<Sample>> {
    let path = path.as_ref();
    let df = load_tsv(path).with_context(|| format!("Failed to read sample sheet {path:?}"))?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for required in ["sample", "fastq", "iptg"] {
        if df.column(required).is_err() {
            bail!("Sample sheet {path:?} is missing required column '{required}'.");
        }
    }
    if df.height() == 0 {
        bail!("Sample sheet {path:?} has no samples.");
    }

    let col_names = df.column("sample")?.cast(&DataType::String)?;
    let col_fastqs = df.column("fastq")?.cast(&DataType::String)?;
    let col_iptg = df.column("iptg")?.cast(&DataType::Float64)?;
    let col_replicates = match df.column("replicate") {
        Ok(col) => Some(col.cast(&DataType::UInt32)?),
        Err(_) => None,
    };

    let mut seen = HashSet::new();
    let mut samples = Vec::with_capacity(df.height());
    for (i, ((name, fastq), iptg)) in col_names
        .str()?
        .iter()
        .zip(col_fastqs.str()?.iter())
        .zip(col_iptg.f64()?.iter())
        .enumerate()
    {
        let (Some(name), Some(fastq)) = (name, fastq) else {
            bail!("Sample sheet row {} has an empty sample or fastq field.", i + 1);
        };
        let Some(iptg) = iptg.and_then(Iptg::from_micromolar) else {
            bail!("Sample {name} has an invalid IPTG concentration. Expected one of 0, 1, 10, 100 µM.");
        };
        if !seen.insert(name.to_owned()) {
            bail!("Duplicate sample name in sample sheet: {name}");
        }
        let fastq = PathBuf::from(fastq);
        let fastq = if fastq.is_relative() {
            base_dir.join(fastq)
        } else {
            fastq
        };
        let replicate = col_replicates
            .as_ref()
            .map(|col| col.u32().map(|ca| ca.get(i)))
            .transpose()?
            .flatten();

        samples.push(Sample {
            name: name.to_owned(),
            fastq,
            iptg,
            replicate,
        });
    }
    log::info!("Total number of samples: {}", samples.len());
    Ok(samples)
}

/// Sample metadata for the model. Has columns `[sample, iptg, replicate]`.
pub fn coldata(samples: &[Sample]) -> eyre::Result<DataFrame> {
    let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
    let groups: Vec<String> = samples.iter().map(|s| s.iptg.label()).collect();
    let replicates: Vec<Option<u32>> = samples.iter().map(|s| s.replicate).collect();
    Ok(DataFrame::new(vec![
        Column::new("sample".into(), names),
        Column::new("iptg".into(), groups),
        Column::new("replicate".into(), replicates),
    ])?)
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    fn write_sheet(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.tsv");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_sample_sheet() {
        let (dir, path) = write_sheet(
            "sample\tfastq\tiptg\treplicate\n\
             a\ta.fastq.gz\t0\t1\n\
             b\t/data/b.fastq\t100\t2\n",
        );
        let samples = load_sample_sheet(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].fastq, dir.path().join("a.fastq.gz"));
        assert_eq!(samples[0].iptg, Iptg::Zero);
        assert_eq!(samples[0].replicate, Some(1));
        assert_eq!(samples[1].fastq, PathBuf::from("/data/b.fastq"));
        assert_eq!(samples[1].iptg, Iptg::Hundred);
    }

    #[test]
    fn test_sample_sheet_without_replicates() {
        let (_dir, path) = write_sheet("sample\tfastq\tiptg\na\ta.fq\t10\n");
        let samples = load_sample_sheet(&path).unwrap();
        assert_eq!(samples[0].iptg, Iptg::Ten);
        assert_eq!(samples[0].replicate, None);
    }

    #[test]
    fn test_sample_sheet_rejects_unknown_concentration() {
        let (_dir, path) = write_sheet("sample\tfastq\tiptg\na\ta.fq\t5\n");
        assert!(load_sample_sheet(&path).is_err());
    }

    #[test]
    fn test_sample_sheet_rejects_duplicates() {
        let (_dir, path) = write_sheet("sample\tfastq\tiptg\na\ta.fq\t0\na\tb.fq\t1\n");
        assert!(load_sample_sheet(&path).is_err());
    }

    #[test]
    fn test_sample_sheet_missing_column() {
        let (_dir, path) = write_sheet("sample\tfastq\na\ta.fq\n");
        assert!(load_sample_sheet(&path).is_err());
    }

    #[test]
    fn test_coldata() {
        let samples = vec![Sample {
            name: "a".to_owned(),
            fastq: PathBuf::from("a.fq"),
            iptg: Iptg::One,
            replicate: None,
        }];
        let df = coldata(&samples).unwrap();
        assert_eq!(df.shape(), (1, 3));
        assert_eq!(df.column("iptg").unwrap().str().unwrap().get(0), Some("1uM"));
    }
}
