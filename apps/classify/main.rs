use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use image::ImageReader;
use oxidized_classify::telemetry::init_tracing;
use runner_core::labels::{LabelSource, DEFAULT_FETCH_TIMEOUT, IMAGENET_CLASSES_URL};
use runner_core::{Classifier, LabelTable, Runner, RunnerConfig};
use runner_tch::TchRunner;
use tracing::{debug, info};

/// Classify one image with a TorchScript ImageNet model and print the top-K
/// predictions as JSON.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Image to classify
    #[clap(long)]
    image: PathBuf,

    /// TorchScript model produced by `export_model`
    #[clap(long, default_value = "/app/model.pt")]
    model: String,

    /// Number of predictions to print
    #[clap(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    topk: u32,

    /// Read class names from a local file (one per line)
    #[clap(long, conflicts_with_all = ["labels_url", "no_fetch_labels"])]
    labels: Option<PathBuf>,

    /// Fetch class names from this URL
    #[clap(long, default_value = IMAGENET_CLASSES_URL)]
    labels_url: String,

    /// Skip fetching class names and print `class_<id>` labels
    #[clap(long)]
    no_fetch_labels: bool,
}

impl Args {
    fn label_source(&self) -> LabelSource {
        if let Some(path) = &self.labels {
            LabelSource::File(path.clone())
        } else if self.no_fetch_labels {
            LabelSource::Synthetic
        } else {
            LabelSource::Url {
                url: self.labels_url.clone(),
                timeout: DEFAULT_FETCH_TIMEOUT,
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("warn");

    let runner = TchRunner::from_config(&RunnerConfig::for_model(&args.model))?;
    debug!(info = ?runner.info(), "model ready");
    let classifier = Classifier::new(runner)?;

    info!(image = %args.image.display(), "reading input image");
    let image = ImageReader::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image.display()))?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("failed to decode image {}", args.image.display()))?;

    let labels = LabelTable::load(&args.label_source());
    let predictions = classifier.classify(&image, args.topk as usize, &labels)?;

    println!("{}", serde_json::to_string_pretty(&predictions)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["classify", "--image", "cat.jpg"]).unwrap();
        assert_eq!(args.model, "/app/model.pt");
        assert_eq!(args.topk, 3);
        assert_eq!(args.label_source(), LabelSource::default());
    }

    #[test]
    fn test_image_is_required() {
        assert!(Args::try_parse_from(["classify"]).is_err());
    }

    #[test]
    fn test_topk_must_be_positive() {
        assert!(Args::try_parse_from(["classify", "--image", "a.png", "--topk", "0"]).is_err());
        let args = Args::try_parse_from(["classify", "--image", "a.png", "--topk", "1"]).unwrap();
        assert_eq!(args.topk, 1);
    }

    #[test]
    fn test_label_sources() {
        let args =
            Args::try_parse_from(["classify", "--image", "a.png", "--labels", "classes.txt"])
                .unwrap();
        assert_eq!(args.label_source(), LabelSource::File("classes.txt".into()));

        let args =
            Args::try_parse_from(["classify", "--image", "a.png", "--no-fetch-labels"]).unwrap();
        assert_eq!(args.label_source(), LabelSource::Synthetic);

        assert!(Args::try_parse_from([
            "classify",
            "--image",
            "a.png",
            "--labels",
            "classes.txt",
            "--no-fetch-labels",
        ])
        .is_err());
    }
}
