use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use eyre::Context;
use flate2::read::MultiGzDecoder;
use noodles::fastq;
use polars::prelude::*;

use crate::matrix::FEATURE_COL;

pub type FastqReader = fastq::io::Reader<Box<dyn BufRead + Send>>;

/// Open a FASTQ file for reading. Gzipped if the extension is `.gz`.
///
/// # Arguments
/// * `infile`
///     * FASTQ path. ex. `sample_1.fastq.gz`
///
/// # Returns
/// * [`FastqReader`]
pub fn open_fastq(infile: impl AsRef<Path>) -> eyre::Result<FastqReader> {
    let fq_path = infile.as_ref();
    let fh = File::open(fq_path).with_context(|| format!("Failed to open FASTQ {fq_path:?}"))?;
    let is_gzipped = fq_path.extension().and_then(|e| e.to_str()) == Some("gz");
    let inner: Box<dyn BufRead + Send> = if is_gzipped {
        log::debug!("Reading gzipped FASTQ {fq_path:?}");
        Box::new(BufReader::new(MultiGzDecoder::new(fh)))
    } else {
        Box::new(BufReader::new(fh))
    };
    Ok(fastq::io::Reader::new(inner))
}

pub fn write_tsv(df: &mut DataFrame, path: impl AsRef<Path>) -> eyre::Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path).with_context(|| format!("Failed to create {path:?}"))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .finish(df)?;
    log::debug!("Wrote {} rows to {path:?}", df.height());
    Ok(())
}

/// Load a tab-separated table written by this crate.
/// * No null markers so features like `NA` (Asn-Ala) are kept as is.
/// * `feature` is always read as a string.
pub fn load_tsv(path: impl AsRef<Path>) -> eyre::Result<DataFrame> {
    let mut schema = Schema::default();
    schema.with_column(FEATURE_COL.into(), DataType::String);
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(Some(Arc::new(schema)))
        .with_parse_options(CsvParseOptions::default().with_separator(b'\t'))
        .try_into_reader_with_file_path(Some(PathBuf::from(path.as_ref())))?
        .finish()?)
}

/// Load a delimited table with header where `NA` is treated as null.
/// * R writes missing values as `NA`. Only use for tables written by R.
pub fn load_delimited(path: impl AsRef<Path>, separator: u8) -> eyre::Result<DataFrame> {
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_null_values(Some(NullValues::AllColumnsSingle("NA".into()))),
        )
        .try_into_reader_with_file_path(Some(PathBuf::from(path.as_ref())))?
        .finish()?)
}

/// Pick a separator from the file extension. `.csv` is comma, anything else is tab.
pub fn separator_for(path: impl AsRef<Path>) -> u8 {
    match path.as_ref().extension().and_then(|e| e.to_str()) {
        Some("csv") => b',',
        _ => b'\t',
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    const FASTQ: &str = "@r1\nACGT\n+\nIIII\n@r2\nGGCC\n+\nIIII\n";

    #[test]
    fn test_open_fastq_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("reads.fastq");
        std::fs::write(&plain, FASTQ).unwrap();

        let gz = dir.path().join("reads.fastq.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(FASTQ.as_bytes()).unwrap();
        encoder.finish().unwrap();

        for path in [plain, gz] {
            let mut reader = open_fastq(&path).unwrap();
            let seqs: Vec<Vec<u8>> = reader
                .records()
                .map(|rec| rec.unwrap().sequence().to_vec())
                .collect();
            assert_eq!(seqs, vec![b"ACGT".to_vec(), b"GGCC".to_vec()]);
        }
    }

    #[test]
    fn test_tsv_roundtrip_with_na() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("res.csv");
        std::fs::write(&path, "\"\",baseMean,padj\n\"f1\",10.5,NA\n\"f2\",3,0.01\n").unwrap();
        let df = load_delimited(&path, separator_for(&path)).unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("padj").unwrap().null_count(), 1);

        let mut df = df;
        let out = dir.path().join("res.tsv");
        write_tsv(&mut df, &out).unwrap();
        assert_eq!(load_tsv(&out).unwrap().shape(), (2, 3));
    }

    #[test]
    fn test_load_tsv_keeps_na_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.tsv");
        std::fs::write(&path, "feature\tcount\nNA\t3\nNAN\t2\nMK\t1\n").unwrap();
        let df = load_tsv(&path).unwrap();
        let col = df.column("feature").unwrap();
        assert_eq!(col.null_count(), 0);
        let features: Vec<&str> = col.str().unwrap().into_no_null_iter().collect();
        assert_eq!(features, vec!["NA", "NAN", "MK"]);
    }
}
