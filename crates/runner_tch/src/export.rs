//! Export pretrained `tch::vision` classifiers to TorchScript.
//!
//! The network is built from its Rust definition, loaded with the published
//! ImageNet weights, evaluated in inference mode and traced on a random
//! `1x3x224x224` input. The saved graph no longer needs the model code.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tch::nn::{self, ModuleT};
use tch::vision::{imagenet, mobilenet, resnet};
use tch::{CModule, Device, Kind, Tensor};
use tracing::info;

/// Release hosting the converted torchvision weights.
pub const WEIGHTS_BASE_URL: &str = "https://github.com/LaurentMazare/tch-rs/releases/download/mw";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Input shape the graph is traced with.
pub const TRACE_INPUT_SHAPE: [i64; 4] = [1, 3, 224, 224];

/// Classifiers with published ImageNet weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Architecture {
    #[default]
    MobilenetV2,
    Resnet18,
    Resnet34,
}

impl Architecture {
    pub const ALL: [Architecture; 3] = [Self::MobilenetV2, Self::Resnet18, Self::Resnet34];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MobilenetV2 => "mobilenet_v2",
            Self::Resnet18 => "resnet18",
            Self::Resnet34 => "resnet34",
        }
    }

    fn weights_file(&self) -> &'static str {
        match self {
            Self::MobilenetV2 => "mobilenet-v2.ot",
            Self::Resnet18 => "resnet18.ot",
            Self::Resnet34 => "resnet34.ot",
        }
    }

    pub fn weights_url(&self) -> String {
        format!("{WEIGHTS_BASE_URL}/{}", self.weights_file())
    }

    /// Build the network with freshly initialized variables under `p`.
    pub fn build(&self, p: &nn::Path) -> Box<dyn ModuleT> {
        match self {
            Self::MobilenetV2 => Box::new(mobilenet::v2(p, imagenet::CLASS_COUNT)),
            Self::Resnet18 => Box::new(resnet::resnet18(p, imagenet::CLASS_COUNT)),
            Self::Resnet34 => Box::new(resnet::resnet34(p, imagenet::CLASS_COUNT)),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(Architecture::name).collect();
                anyhow!("unknown architecture `{s}` (expected one of {})", known.join(", "))
            })
    }
}

/// Where the pretrained variables come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// The published weights for the architecture.
    Download,
    /// A local `.ot` file.
    File(PathBuf),
}

/// A network with its variables loaded.
pub struct Pretrained {
    pub arch: Architecture,
    pub vs: nn::VarStore,
    pub net: Box<dyn ModuleT>,
}

pub fn load_pretrained(arch: Architecture, weights: &WeightsSource) -> Result<Pretrained> {
    let mut vs = nn::VarStore::new(Device::Cpu);
    let net = arch.build(&vs.root());
    match weights {
        WeightsSource::File(path) => vs
            .load(path)
            .with_context(|| format!("failed to load weights from {}", path.display()))?,
        WeightsSource::Download => {
            let url = arch.weights_url();
            let bytes = download(&url)?;
            vs.load_from_stream(Cursor::new(bytes))
                .with_context(|| format!("failed to load weights downloaded from {url}"))?;
        }
    }
    vs.freeze();
    Ok(Pretrained { arch, vs, net })
}

fn download(url: &str) -> Result<Vec<u8>> {
    info!(%url, "downloading weights");
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let bytes = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .with_context(|| format!("failed to download weights from {url}"))?;
    Ok(bytes.to_vec())
}

/// Trace the inference-mode forward pass on a random input of `input_shape`.
pub fn trace(net: &dyn ModuleT, input_shape: &[i64]) -> Result<CModule> {
    let example = Tensor::randn(input_shape, (Kind::Float, Device::Cpu));
    let mut forward = |inputs: &[Tensor]| vec![net.forward_t(&inputs[0], false)];
    let module = tch::no_grad(|| {
        CModule::create_by_tracing("ImageClassifier", "forward", &[example], &mut forward)
    })
    .context("failed to trace model")?;
    Ok(module)
}

/// Export `arch` with its pretrained weights as TorchScript at `out`.
pub fn export(arch: Architecture, weights: &WeightsSource, out: &Path) -> Result<()> {
    let pretrained = load_pretrained(arch, weights)?;
    info!(arch = %pretrained.arch, "tracing model");
    let module = trace(pretrained.net.as_ref(), &TRACE_INPUT_SHAPE)?;
    module
        .save(out)
        .with_context(|| format!("failed to write TorchScript to {}", out.display()))?;
    Ok(())
}
