use std::path::PathBuf;

use clap::Parser;
use oxidized_classify::telemetry::init_tracing;
use runner_tch::export::{export, Architecture, WeightsSource};

/// Export a pretrained ImageNet classifier as a TorchScript graph.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Where to write the traced model
    #[clap(long)]
    out: PathBuf,

    /// Network architecture (mobilenet_v2, resnet18, resnet34)
    #[clap(long, default_value_t = Architecture::default())]
    arch: Architecture,

    /// Local `.ot` weights to use instead of downloading the published ones
    #[clap(long)]
    weights: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("info");

    let weights = match args.weights {
        Some(path) => WeightsSource::File(path),
        None => WeightsSource::Download,
    };
    export(args.arch, &weights, &args.out)?;

    println!("Saved TorchScript to {}", args.out.display());
    Ok(())
}
