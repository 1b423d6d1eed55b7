use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use ntuple_pattern::{
    catalog::PatternCatalog,
    encoder::MalformedRecordError,
    record::{PlyRange, PositionRecord, RecordLayout, ReadRecordError, RecordReader},
};

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) => Output::open(path),
            None => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Game-history input options shared by the commands that read records.
#[derive(Debug, Clone, clap::Args)]
pub struct RecordInputArg {
    /// Game-history CSV files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Pattern catalog JSON file (defaults to the reference Othello catalog)
    #[arg(long)]
    pub catalog: Option<PathBuf>,
    /// Column holding the ply
    #[arg(long, default_value_t = 0)]
    pub ply_column: usize,
    /// Column holding the final score
    #[arg(long, default_value_t = 1)]
    pub score_column: usize,
    /// Column of the first pattern code
    #[arg(long, default_value_t = 2)]
    pub codes_column: usize,
    /// Symmetry variants recorded per pattern
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub variants: u16,
    /// Drop positions before this ply
    #[arg(long)]
    pub min_ply: Option<u32>,
    /// Drop positions after this ply
    #[arg(long)]
    pub max_ply: Option<u32>,
}

impl RecordInputArg {
    pub fn load_catalog(&self) -> anyhow::Result<PatternCatalog> {
        match &self.catalog {
            Some(path) => read_json_file("pattern catalog", path),
            None => Ok(PatternCatalog::reference()),
        }
    }

    pub fn layout(&self) -> RecordLayout {
        RecordLayout {
            ply_column: self.ply_column,
            score_column: self.score_column,
            codes_column: self.codes_column,
            variant_count: usize::from(self.variants),
        }
    }

    pub fn ply_range(&self) -> PlyRange {
        PlyRange {
            min: self.min_ply,
            max: self.max_ply,
        }
    }

    /// Reads every input file and keeps the records inside the ply range.
    ///
    /// Record identifiers are unique across all inputs; the returned
    /// [`RecordSources`] maps them back to a file and line.
    pub fn load_records(
        &self,
        catalog: &PatternCatalog,
    ) -> anyhow::Result<(Vec<PositionRecord>, RecordSources)> {
        let layout = self.layout();
        let ply_range = self.ply_range();
        let mut sources = RecordSources::default();
        let mut records = vec![];
        for path in &self.inputs {
            let file = File::open(path)
                .with_context(|| format!("Failed to open game history: {}", path.display()))?;
            let read = sources
                .read(path, BufReader::new(file), layout, catalog.len())
                .with_context(|| format!("Failed to read game history: {}", path.display()))?;
            log::info!("Read {} records from {}", read.len(), path.display());
            records.extend(read.into_iter().filter(|record| ply_range.contains(record)));
        }
        log::info!("{} records within the ply range", records.len());
        Ok((records, sources))
    }
}

#[derive(Debug, Clone)]
struct SourceSpan {
    first_id: u64,
    end_id: u64,
    path: PathBuf,
}

/// Maps record identifiers back to the input file and line they came from.
#[derive(Debug, Clone, Default)]
pub struct RecordSources {
    spans: Vec<SourceSpan>,
}

impl RecordSources {
    /// Reads all records of `source`, numbering them after the previous source.
    pub fn read<R>(
        &mut self,
        path: &Path,
        source: R,
        layout: RecordLayout,
        pattern_count: usize,
    ) -> Result<Vec<PositionRecord>, ReadRecordError>
    where
        R: io::Read,
    {
        let first_id = self.spans.last().map_or(1, |span| span.end_id);
        let records = RecordReader::new(source, layout, pattern_count)
            .with_first_id(first_id)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(last) = records.last() {
            self.spans.push(SourceSpan {
                first_id,
                end_id: last.id() + 1,
                path: path.to_owned(),
            });
        }
        Ok(records)
    }

    /// File and 1-based line of a record.
    pub fn locate(&self, record_id: u64) -> Option<(&Path, u64)> {
        let index = self
            .spans
            .partition_point(|span| span.first_id <= record_id)
            .checked_sub(1)?;
        let span = &self.spans[index];
        (record_id < span.end_id).then(|| (span.path.as_path(), record_id - span.first_id + 1))
    }

    /// Attaches the file and line of the offending record to `err`.
    pub fn explain(&self, err: MalformedRecordError) -> anyhow::Error {
        let location = self.locate(err.record_id()).map(|(path, line)| {
            format!("Malformed record at line {line} of {}", path.display())
        });
        let err = anyhow::Error::new(err);
        match location {
            Some(location) => err.context(location),
            None => err,
        }
    }
}

pub fn print_histogram<I, S>(data: I)
where
    I: Iterator<Item = (S, usize)>,
    S: fmt::Display,
{
    let data = data.collect::<Vec<_>>();
    let max_count = data.iter().map(|(_, c)| *c).max().unwrap_or(1).max(1);
    let max_bar_width = 50;
    for (label, count) in &data {
        let bar_width = (count * max_bar_width) / max_count;
        println!("{:>15} | {:<7} {}", label, count, "#".repeat(bar_width));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: RecordLayout = RecordLayout {
        ply_column: 0,
        score_column: 1,
        codes_column: 2,
        variant_count: 1,
    };

    #[test]
    fn test_record_ids_are_unique_across_sources() {
        let mut sources = RecordSources::default();
        let first = sources
            .read(Path::new("a.csv"), "20,4,0\n21,4,1\n".as_bytes(), LAYOUT, 1)
            .unwrap();
        let second = sources
            .read(Path::new("b.csv"), "30,-2,0\n31,-2,7\n".as_bytes(), LAYOUT, 1)
            .unwrap();

        let ids = |records: &[PositionRecord]| {
            records.iter().map(PositionRecord::id).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), [1, 2]);
        assert_eq!(ids(&second), [3, 4]);

        assert_eq!(sources.locate(2), Some((Path::new("a.csv"), 2)));
        assert_eq!(sources.locate(4), Some((Path::new("b.csv"), 2)));
        assert_eq!(sources.locate(0), None);
        assert_eq!(sources.locate(5), None);
    }

    #[test]
    fn test_malformed_record_names_its_file() {
        let catalog = PatternCatalog::new(&["single"], &[1]).unwrap();
        let mut sources = RecordSources::default();
        let mut records = sources
            .read(Path::new("a.csv"), "20,4,0\n21,4,1\n".as_bytes(), LAYOUT, 1)
            .unwrap();
        records.extend(
            sources
                .read(Path::new("b.csv"), "30,-2,0\n31,-2,7\n".as_bytes(), LAYOUT, 1)
                .unwrap(),
        );

        let encoder = ntuple_pattern::encoder::FeatureEncoder::new(
            &catalog,
            ntuple_pattern::encoder::RowGrouping::default(),
        );
        let err = records
            .iter()
            .map(|record| encoder.encode(record))
            .find_map(Result::err)
            .unwrap();
        assert_eq!(err.record_id(), 4);

        let message = format!("{:#}", sources.explain(err));
        assert!(message.starts_with("Malformed record at line 2 of b.csv"), "{message}");
    }
}
