use anyhow::{bail, Context, Result};
use image::DynamicImage;
use tracing::debug;

use crate::labels::{LabelTable, IMAGENET_CLASS_COUNT};
use crate::postprocess::{decode, softmax, Prediction};
use crate::preprocess::Preprocessor;
use crate::Runner;

/// Single-image classifier: preprocess, run the model, softmax, top-K.
pub struct Classifier<R: Runner> {
    runner: R,
    preprocessor: Preprocessor,
    num_classes: usize,
}

impl<R: Runner> Classifier<R> {
    /// ImageNet preprocessing and a 1000-class output.
    ///
    /// Fails when the runner declares an input shape other than the
    /// preprocessed batch shape.
    pub fn new(runner: R) -> Result<Self> {
        Self::with_preprocessor(runner, Preprocessor::default())
    }

    pub fn with_preprocessor(runner: R, preprocessor: Preprocessor) -> Result<Self> {
        let [c, h, w] = preprocessor.output_shape();
        let batch_shape = [1, c, h, w];
        let declared = runner.info().input_shape;
        if !declared.is_empty() && declared != batch_shape {
            bail!(
                "model expects input shape {:?} but preprocessing produces {:?}",
                declared,
                batch_shape
            );
        }
        Ok(Self {
            runner,
            preprocessor,
            num_classes: IMAGENET_CLASS_COUNT,
        })
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Raw class scores for one image.
    pub fn logits(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let batch = self.preprocessor.preprocess_batch(image)?;
        debug!(shape = ?batch.shape(), "preprocessed input");

        let output = self
            .runner
            .run(&batch.into_dyn())
            .context("model forward pass failed")?;
        if output.len() != self.num_classes {
            bail!(
                "model returned {} scores (shape {:?}), expected {}",
                output.len(),
                output.shape(),
                self.num_classes
            );
        }
        Ok(output.iter().copied().collect())
    }

    /// Class probabilities for one image.
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        Ok(softmax(&self.logits(image)?))
    }

    /// The `k` most likely classes, rank 1 first.
    pub fn classify(
        &self,
        image: &DynamicImage,
        k: usize,
        labels: &LabelTable,
    ) -> Result<Vec<Prediction>> {
        if k == 0 {
            bail!("top-k must be at least 1");
        }
        let probs = self.probabilities(image)?;
        Ok(decode(&probs, k, labels))
    }
}
