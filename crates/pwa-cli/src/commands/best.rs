use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use pwa_core::{iteration_store_path, BinRanges};
use pwa_fit::IterationStore;

#[derive(Args, Debug)]
pub struct BestArgs {
    /// Directory holding the iteration stores.
    #[arg(long, default_value = "fits")]
    pub out_dir: PathBuf,
    /// Bin ranges of the fit.
    #[arg(short = 'b', long = "bins", default_value = "all-bins")]
    pub bins: String,
    /// Explicit store file, overriding `--out-dir`.
    #[arg(long)]
    pub store: Option<PathBuf>,
}

pub fn run(args: &BestArgs) -> Result<(), Box<dyn Error>> {
    let ranges: BinRanges = args.bins.parse()?;
    let path = args
        .store
        .clone()
        .unwrap_or_else(|| iteration_store_path(&args.out_dir, &ranges));
    let store = IterationStore::new(path);
    let record = store
        .best(&ranges.descriptor())?
        .ok_or_else(|| format!("no iteration for {} in {}", ranges, store.path().display()))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
