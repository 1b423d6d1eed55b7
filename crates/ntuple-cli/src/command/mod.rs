use clap::{Parser, Subcommand};

use self::{catalog::CatalogArg, summarize::SummarizeArg, train::TrainArg};

mod catalog;
mod summarize;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train pattern weights from game-history files
    Train(#[clap(flatten)] TrainArg),
    /// Print the pattern catalog layout
    Catalog(#[clap(flatten)] CatalogArg),
    /// Summarize game-history files without training
    Summarize(#[clap(flatten)] SummarizeArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Catalog(arg) => catalog::run(&arg)?,
        Mode::Summarize(arg) => summarize::run(&arg)?,
    }
    Ok(())
}
