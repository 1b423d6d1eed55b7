use std::path::PathBuf;

use anyhow::Context as _;
use ntuple_pattern::catalog::PatternCatalog;

use crate::util::{Output, read_json_file};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct CatalogArg {
    /// Pattern catalog JSON file (defaults to the reference Othello catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Print the catalog as JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &CatalogArg) -> anyhow::Result<()> {
    let CatalogArg {
        catalog,
        json,
        output,
    } = arg;
    let catalog = match catalog {
        Some(path) => read_json_file("pattern catalog", path)?,
        None => PatternCatalog::reference(),
    };

    if *json {
        return Output::save_json(&catalog, output.clone());
    }
    let mut output = Output::from_output_path(output.clone())?;
    write_table(&mut output, &catalog)
        .with_context(|| format!("Failed to write catalog to {}", output.display_path()))
}

fn write_table<W>(writer: &mut W, catalog: &PatternCatalog) -> std::io::Result<()>
where
    W: std::io::Write,
{
    writeln!(
        writer,
        "{:>3}  {:<12} {:>5} {:>8} {:>8}  columns",
        "id", "name", "cells", "size", "offset"
    )?;
    for pattern in catalog.patterns() {
        let columns = pattern.columns();
        writeln!(
            writer,
            "{:>3}  {:<12} {:>5} {:>8} {:>8}  {}..{}",
            pattern.id(),
            pattern.name(),
            pattern.cell_count(),
            pattern.space_size(),
            pattern.offset(),
            columns.start,
            columns.end,
        )?;
    }
    writeln!(writer, "total feature dimension: {}", catalog.total_feature_dim())?;
    writer.flush()
}
