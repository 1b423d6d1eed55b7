use std::collections::BTreeMap;

use ntuple_pattern::{
    catalog::PatternCatalog,
    encoder::{FeatureEncoder, MalformedRecordError, RowGrouping},
    record::PositionRecord,
};
use ntuple_training::metrics::DescriptiveStats;

use crate::util::{RecordInputArg, print_histogram};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SummarizeArg {
    #[clap(flatten)]
    input: RecordInputArg,
    /// Width of the ply histogram buckets
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    ply_bucket: u32,
}

pub(crate) fn run(arg: &SummarizeArg) -> anyhow::Result<()> {
    let catalog = arg.input.load_catalog()?;
    let (records, sources) = arg.input.load_records(&catalog)?;
    let coverage = feature_coverage(&catalog, &records).map_err(|err| sources.explain(err))?;

    println!("Records: {}", records.len());
    println!();

    println!("Ply histogram:");
    print_histogram(
        ply_histogram(&records, arg.ply_bucket)
            .into_iter()
            .map(|(start, count)| (format!("{start}-{}", start + arg.ply_bucket - 1), count)),
    );
    println!();

    if let Some(stats) = DescriptiveStats::new(records.iter().map(PositionRecord::score)) {
        println!("Final score:");
        println!("  Min:    {:.2}", stats.min);
        println!("  Max:    {:.2}", stats.max);
        println!("  Mean:   {:.2}", stats.mean);
        println!("  Median: {:.2}", stats.median);
        println!("  StdDev: {:.2}", stats.std_dev);
        println!();
    }

    println!("Feature coverage:");
    for (pattern, seen) in catalog
        .patterns()
        .iter()
        .zip(coverage)
    {
        #[expect(clippy::cast_precision_loss)]
        let percent = 100.0 * seen as f64 / f64::from(pattern.space_size());
        println!(
            "  {:<12} {:>8} / {:<8} ({percent:5.1}%)",
            pattern.name(),
            seen,
            pattern.space_size(),
        );
    }
    Ok(())
}

/// Record counts keyed by the first ply of each bucket.
fn ply_histogram(records: &[PositionRecord], bucket: u32) -> BTreeMap<u32, usize> {
    let mut histogram = BTreeMap::new();
    for record in records {
        *histogram
            .entry(record.ply() / bucket * bucket)
            .or_insert(0) += 1;
    }
    histogram
}

/// Distinct local indices observed per pattern, in catalog order.
fn feature_coverage(
    catalog: &PatternCatalog,
    records: &[PositionRecord],
) -> Result<Vec<usize>, MalformedRecordError> {
    let encoder = FeatureEncoder::new(catalog, RowGrouping::OneRowPerPosition);
    let mut seen = vec![false; catalog.total_feature_dim() as usize];
    for record in records {
        for (_, column) in encoder.encode(record)?.coordinates(0) {
            seen[column as usize] = true;
        }
    }
    Ok(catalog
        .patterns()
        .iter()
        .map(|pattern| {
            let columns = pattern.columns();
            seen[columns.start as usize..columns.end as usize]
                .iter()
                .filter(|&&hit| hit)
                .count()
        })
        .collect())
}
