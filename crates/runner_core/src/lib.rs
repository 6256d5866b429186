//! # runner_core
//!
//! Shared trait and types for OxidizedVision image classification.
//! Backend crates (`runner_tch`) implement the [`Runner`] trait defined here,
//! and everything around the model call lives in this crate so it can be
//! exercised without a concrete backend:
//!
//! - [`preprocess`]: resize / center-crop / normalize into an NCHW batch
//! - [`postprocess`]: softmax, top-K selection and prediction records
//! - [`labels`]: best-effort ImageNet label table loading
//! - [`pipeline`]: the [`Classifier`] tying them together

use anyhow::Result;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

pub mod labels;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;

pub use labels::{LabelCache, LabelSource, LabelTable};
pub use pipeline::Classifier;
pub use postprocess::Prediction;
pub use preprocess::{PreprocessConfig, PreprocessError, Preprocessor};

/// Input shape of the exported classifiers: one RGB 224x224 image.
pub const DEFAULT_INPUT_SHAPE: [usize; 4] = [1, 3, 224, 224];

/// Metadata describing a loaded model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Human-readable name of the model.
    pub name: String,
    /// Backend used for inference (e.g. "tch").
    pub backend: String,
    /// Expected input shape (e.g. `[1, 3, 224, 224]`).
    pub input_shape: Vec<usize>,
    /// Expected output shape (may be empty if unknown until first run).
    pub output_shape: Vec<usize>,
}

/// Configuration for loading a runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Path to the serialized model graph.
    pub model_path: String,
    /// Input shape the graph was traced with; `Classifier` checks it against
    /// the preprocessing output.
    pub input_shape: Vec<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            input_shape: DEFAULT_INPUT_SHAPE.to_vec(),
        }
    }
}

impl RunnerConfig {
    /// Config for a model at `path` with the default input shape.
    pub fn for_model(path: impl Into<String>) -> Self {
        Self {
            model_path: path.into(),
            ..Self::default()
        }
    }
}

/// The capability every inference backend provides: given a fixed-shape
/// input batch, return the raw class scores.
///
/// The classification pipeline only talks to the model through this trait,
/// so it can be driven by a stub in tests.
///
/// # Example
/// ```ignore
/// let runner = TchRunner::from_config(&RunnerConfig::for_model("model.pt"))?;
/// let input = ndarray::ArrayD::<f32>::zeros(IxDyn(&[1, 3, 224, 224]));
/// let logits = runner.run(&input)?;
/// println!("Output shape: {:?}", logits.shape());
/// ```
pub trait Runner {
    /// Create a runner from a configuration.
    fn from_config(config: &RunnerConfig) -> Result<Self>
    where
        Self: Sized;

    /// Run inference on the given input tensor.
    /// Input and output are dynamic-dimensional arrays; classifiers return
    /// `[1, num_classes]` logits.
    fn run(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Return metadata about the loaded model.
    fn info(&self) -> ModelInfo;
}
