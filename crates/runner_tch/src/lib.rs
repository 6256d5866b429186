//! # runner_tch
//!
//! TorchScript support using the `tch-rs` crate (LibTorch bindings):
//! [`TchRunner`] runs a serialized graph on the CPU, and [`export`] produces
//! such graphs from pretrained `tch::vision` classifiers.

use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};
use runner_core::{ModelInfo, Runner, RunnerConfig};
use tch::{CModule, Device, Tensor};
use tracing::info;

pub mod export;

/// A runner backed by LibTorch (TorchScript models).
pub struct TchRunner {
    module: CModule,
    config: RunnerConfig,
}

impl Runner for TchRunner {
    fn from_config(config: &RunnerConfig) -> Result<Self> {
        let mut module = CModule::load_on_device(&config.model_path, Device::Cpu)
            .with_context(|| format!("failed to load TorchScript model {}", config.model_path))?;
        module.set_eval();
        info!(path = %config.model_path, "loaded TorchScript model");
        Ok(Self {
            module,
            config: config.clone(),
        })
    }

    fn run(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let input_shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = input.iter().cloned().collect();
        let t = Tensor::from_slice(&flat).view(input_shape.as_slice());

        let out = tch::no_grad(|| self.module.forward_ts(&[t]))?;
        let out = out.to_kind(tch::Kind::Float);

        let out_shape: Vec<usize> = out.size().iter().map(|&d| d as usize).collect();
        let numel: usize = out_shape.iter().product();
        let mut out_vec = vec![0f32; numel];
        out.copy_data(&mut out_vec, numel);

        Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), out_vec)?)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.config.model_path.clone(),
            backend: "tch".to_string(),
            input_shape: self.config.input_shape.clone(),
            output_shape: vec![], // determined at runtime
        }
    }
}

impl TchRunner {
    /// Load a TorchScript model from a file path.
    pub fn load(path: &str) -> Result<Self> {
        Self::from_config(&RunnerConfig::for_model(path))
    }
}
