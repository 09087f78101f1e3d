//! Conformer phoneme classifier
//!
//! ```text
//! features [T, D]
//!   -> proj (D -> dim) + pos_emb[:T]
//!   -> N x block:
//!        ln1(x + ff2(gelu(ff1(x))))
//!        ln2(x + mhsa(x))
//!        ln3(x + conv(x))      pw(dim -> 2dim), glu, dw(k), bn, gelu, pw
//!        ln_final(x)
//!   -> fc (dim -> classes) -> log_softmax
//! ```
//!
//! Weights use the PyTorch state-dict names. Layer sizes are read from the
//! checkpoint; only the head count is supplied by the caller.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Module, ModuleT, Tensor, D};
use candle_nn::{BatchNorm, Conv1d, Conv1dConfig, LayerNorm, Linear, VarBuilder};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;
use tracing::info;

use crate::error::{PronError, Result};

pub const DEFAULT_HEADS: usize = 4;

/// LayerNorm / BatchNorm epsilon (PyTorch default)
const NORM_EPS: f64 = 1e-5;

/// Options that cannot be inferred from tensor shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConformerOptions {
    pub heads: usize,
    /// Optional cap below the positional table length
    pub max_positions: Option<usize>,
}

impl Default for ConformerOptions {
    fn default() -> Self {
        Self {
            heads: DEFAULT_HEADS,
            max_positions: None,
        }
    }
}

/// Dimensions recovered from a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConformerDims {
    pub input_dim: usize,
    pub dim: usize,
    pub depth: usize,
    pub ff_dim: usize,
    pub kernel_size: usize,
    pub max_positions: usize,
    pub num_classes: usize,
    pub heads: usize,
}

/// `nn.MultiheadAttention` with packed input projection
#[derive(Debug, Clone)]
struct SelfAttention {
    in_proj: Linear,
    out_proj: Linear,
    heads: usize,
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    fn load(dim: usize, heads: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let weight = vb.get((3 * dim, dim), "in_proj_weight")?;
        let bias = vb.get(3 * dim, "in_proj_bias")?;
        let head_dim = dim / heads;
        Ok(Self {
            in_proj: Linear::new(weight, Some(bias)),
            out_proj: candle_nn::linear(dim, dim, vb.pp("out_proj"))?,
            heads,
            head_dim,
            scale: (head_dim as f64).powf(-0.5),
        })
    }

    /// `[T, dim] -> [T, dim]`
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (t, dim) = xs.dims2()?;
        let qkv = self.in_proj.forward(xs)?;
        let split = |index: usize| {
            qkv.narrow(1, index * dim, dim)?
                .reshape((t, self.heads, self.head_dim))?
                .transpose(0, 1)?
                .contiguous()
        };

        let q = (split(0)? * self.scale)?;
        let k = split(1)?;
        let v = split(2)?;

        let attn = candle_nn::ops::softmax(&q.matmul(&k.t()?.contiguous()?)?, D::Minus1)?;
        let out = attn
            .matmul(&v)?
            .transpose(0, 1)?
            .contiguous()?
            .reshape((t, dim))?;
        self.out_proj.forward(&out)
    }
}

/// Pointwise, GLU, depthwise, BatchNorm, GELU, pointwise
#[derive(Debug, Clone)]
struct ConvModule {
    expand: Conv1d,
    depthwise: Conv1d,
    norm: BatchNorm,
    project: Conv1d,
    dim: usize,
}

impl ConvModule {
    fn load(dim: usize, kernel_size: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let depthwise_cfg = Conv1dConfig {
            padding: kernel_size / 2,
            groups: dim,
            ..Default::default()
        };
        Ok(Self {
            expand: candle_nn::conv1d(dim, 2 * dim, 1, Conv1dConfig::default(), vb.pp("0"))?,
            depthwise: candle_nn::conv1d(dim, dim, kernel_size, depthwise_cfg, vb.pp("2"))?,
            norm: candle_nn::batch_norm(dim, NORM_EPS, vb.pp("3"))?,
            project: candle_nn::conv1d(dim, dim, 1, Conv1dConfig::default(), vb.pp("5"))?,
            dim,
        })
    }

    /// `[T, dim] -> [T, dim]`; convolutions run channel-first
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = xs.t()?.unsqueeze(0)?.contiguous()?;
        let h = self.expand.forward(&xs)?;
        let gate = candle_nn::ops::sigmoid(&h.narrow(1, self.dim, self.dim)?)?;
        let h = h.narrow(1, 0, self.dim)?.mul(&gate)?;
        let h = self.depthwise.forward(&h)?;
        let h = self.norm.forward_t(&h, false)?.gelu_erf()?;
        self.project.forward(&h)?.squeeze(0)?.t()?.contiguous()
    }
}

#[derive(Debug, Clone)]
struct ConformerBlock {
    ff1: Linear,
    ff2: Linear,
    ln1: LayerNorm,
    mhsa: SelfAttention,
    ln2: LayerNorm,
    conv: ConvModule,
    ln3: LayerNorm,
    ln_final: LayerNorm,
}

impl ConformerBlock {
    fn load(dims: &ConformerDims, vb: VarBuilder) -> candle_core::Result<Self> {
        let dim = dims.dim;
        Ok(Self {
            ff1: candle_nn::linear(dim, dims.ff_dim, vb.pp("ff1"))?,
            ff2: candle_nn::linear(dims.ff_dim, dim, vb.pp("ff2"))?,
            ln1: candle_nn::layer_norm(dim, NORM_EPS, vb.pp("ln1"))?,
            mhsa: SelfAttention::load(dim, dims.heads, vb.pp("mhsa"))?,
            ln2: candle_nn::layer_norm(dim, NORM_EPS, vb.pp("ln2"))?,
            conv: ConvModule::load(dim, dims.kernel_size, vb.pp("conv"))?,
            ln3: candle_nn::layer_norm(dim, NORM_EPS, vb.pp("ln3"))?,
            ln_final: candle_nn::layer_norm(dim, NORM_EPS, vb.pp("ln_final"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let ff = self.ff2.forward(&self.ff1.forward(xs)?.gelu_erf()?)?;
        let xs = self.ln1.forward(&(ff + xs)?)?;

        let xs = self.ln2.forward(&(self.mhsa.forward(&xs)? + &xs)?)?;

        let xs = self.ln3.forward(&(self.conv.forward(&xs)? + &xs)?)?;

        self.ln_final.forward(&xs)
    }
}

fn shape_of<'a>(tensors: &'a HashMap<String, Tensor>, name: &str) -> Result<&'a [usize]> {
    tensors
        .get(name)
        .map(|t| t.dims())
        .ok_or_else(|| PronError::model_load(format!("Checkpoint is missing '{}'", name)))
}

/// Frame-level phoneme classifier producing CTC log-probabilities
#[derive(Debug, Clone)]
pub struct ConformerClassifier {
    proj: Linear,
    /// `[max_positions, dim]`
    pos_emb: Tensor,
    blocks: Vec<ConformerBlock>,
    fc: Linear,
    dims: ConformerDims,
    device: Device,
}

impl ConformerClassifier {
    /// Read layer sizes from tensor shapes
    fn infer_dims(tensors: &HashMap<String, Tensor>, options: ConformerOptions) -> Result<ConformerDims> {
        let (dim, input_dim) = match shape_of(tensors, "proj.weight")? {
            &[dim, input_dim] => (dim, input_dim),
            other => return Err(PronError::shape(format!("proj.weight should be 2-D, got {:?}", other))),
        };

        let positions = match shape_of(tensors, "pos_emb")? {
            &[1, positions, d] if d == dim => positions,
            other => {
                return Err(PronError::shape(format!(
                    "pos_emb should be [1, positions, {}], got {:?}",
                    dim, other
                )))
            }
        };
        let max_positions = match options.max_positions {
            Some(cap) if cap == 0 || cap > positions => {
                return Err(PronError::model_load(format!(
                    "max_positions {} must be between 1 and {}",
                    cap, positions
                )))
            }
            Some(cap) => cap,
            None => positions,
        };

        if options.heads == 0 || dim % options.heads != 0 {
            return Err(PronError::model_load(format!(
                "{} attention heads do not divide model dim {}",
                options.heads, dim
            )));
        }

        let depth = (0..)
            .take_while(|i| tensors.contains_key(&format!("blocks.{i}.ln1.weight")))
            .count();
        if depth == 0 {
            return Err(PronError::model_load("Checkpoint has no Conformer blocks"));
        }

        let ff_dim = match shape_of(tensors, "blocks.0.ff1.weight")? {
            &[ff_dim, d] if d == dim => ff_dim,
            other => {
                return Err(PronError::shape(format!(
                    "blocks.0.ff1.weight should be [ff_dim, {}], got {:?}",
                    dim, other
                )))
            }
        };

        let kernel_size = match shape_of(tensors, "blocks.0.conv.2.weight")? {
            &[d, 1, k] if d == dim && k % 2 == 1 => k,
            other => {
                return Err(PronError::shape(format!(
                    "Depthwise conv should be [{}, 1, odd kernel], got {:?}",
                    dim, other
                )))
            }
        };

        let num_classes = match shape_of(tensors, "fc.weight")? {
            &[classes, d] if d == dim => classes,
            other => {
                return Err(PronError::shape(format!(
                    "fc.weight should be [classes, {}], got {:?}",
                    dim, other
                )))
            }
        };

        Ok(ConformerDims {
            input_dim,
            dim,
            depth,
            ff_dim,
            kernel_size,
            max_positions,
            num_classes,
            heads: options.heads,
        })
    }

    /// Build from named checkpoint tensors
    pub fn from_tensors(tensors: HashMap<String, Tensor>, options: ConformerOptions) -> Result<Self> {
        let dims = Self::infer_dims(&tensors, options)?;
        let device = Device::Cpu;

        let load_err = |what: String, e: candle_core::Error| {
            PronError::model_load(format!("Failed to load {}: {}", what, e))
        };

        // Leading rows only when capped
        let pos_emb = tensors
            .get("pos_emb")
            .ok_or_else(|| PronError::model_load("Checkpoint is missing 'pos_emb'"))?
            .to_dtype(DType::F32)
            .and_then(|t| t.narrow(1, 0, dims.max_positions))
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.contiguous())
            .map_err(|e| load_err("pos_emb".into(), e))?;

        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let proj = candle_nn::linear(dims.input_dim, dims.dim, vb.pp("proj"))
            .map_err(|e| load_err("proj".into(), e))?;

        let blocks = (0..dims.depth)
            .map(|i| {
                ConformerBlock::load(&dims, vb.pp(format!("blocks.{i}")))
                    .map_err(|e| load_err(format!("block {}", i), e))
            })
            .collect::<Result<Vec<_>>>()?;

        let fc = candle_nn::linear(dims.dim, dims.num_classes, vb.pp("fc"))
            .map_err(|e| load_err("fc".into(), e))?;

        Ok(Self {
            proj,
            pos_emb,
            blocks,
            fc,
            dims,
            device,
        })
    }

    /// Load a `.safetensors` checkpoint
    pub fn load<P: AsRef<Path>>(path: P, options: ConformerOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading Conformer classifier from {}", path.display());
        let tensors = candle_core::safetensors::load(path, &Device::Cpu).map_err(|e| {
            PronError::model_load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let model = Self::from_tensors(tensors, options)?;
        info!(
            "Conformer: {} -> {} x {} blocks ({} heads, kernel {}), {} classes",
            model.dims.input_dim,
            model.dims.dim,
            model.dims.depth,
            model.dims.heads,
            model.dims.kernel_size,
            model.dims.num_classes
        );
        Ok(model)
    }

    pub fn dims(&self) -> ConformerDims {
        self.dims
    }

    pub fn num_classes(&self) -> usize {
        self.dims.num_classes
    }

    pub fn input_dim(&self) -> usize {
        self.dims.input_dim
    }

    /// Log-probabilities `[T, classes]` for features `[T, input_dim]`
    pub fn forward(&self, features: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (frames, input_dim) = features.dim();
        if input_dim != self.dims.input_dim {
            return Err(PronError::shape(format!(
                "Expected {}-dim features, got {}",
                self.dims.input_dim, input_dim
            )));
        }
        if frames == 0 {
            return Err(PronError::invalid_input("No feature frames to classify"));
        }
        if frames > self.dims.max_positions {
            return Err(PronError::invalid_input(format!(
                "{} frames exceeds the model's {} positions",
                frames, self.dims.max_positions
            )));
        }

        let values: Vec<f32> = features.iter().copied().collect();
        let xs = Tensor::from_vec(values, (frames, input_dim), &self.device)?;

        let mut xs = self
            .proj
            .forward(&xs)?
            .add(&self.pos_emb.narrow(0, 0, frames)?)?;
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }

        let logits = self.fc.forward(&xs)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
        let values = log_probs.flatten_all()?.to_vec1::<f32>()?;
        Ok(Array2::from_shape_vec((frames, self.dims.num_classes), values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Small deterministic pseudo-random values in [-scale, scale]
    fn filled(shape: &[usize], seed: u32, scale: f32) -> Tensor {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        let n: usize = shape.iter().product();
        let values: Vec<f32> = (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32 * 2.0 - 1.0) * scale
            })
            .collect();
        Tensor::from_vec(values, shape, &Device::Cpu).unwrap()
    }

    fn constant(shape: &[usize], value: f32) -> Tensor {
        Tensor::full(value, shape, &Device::Cpu)
            .and_then(|t| t.contiguous())
            .unwrap()
    }

    /// Checkpoint with PyTorch state-dict names for a tiny Conformer
    fn tiny_tensors(
        input_dim: usize,
        dim: usize,
        depth: usize,
        classes: usize,
    ) -> HashMap<String, Tensor> {
        let mut w = HashMap::new();
        let mut seed = 1;
        let mut put = |w: &mut HashMap<String, Tensor>, name: String, shape: &[usize]| {
            seed += 1;
            w.insert(name, filled(shape, seed, 0.3));
        };

        put(&mut w, "proj.weight".into(), &[dim, input_dim]);
        put(&mut w, "proj.bias".into(), &[dim]);
        put(&mut w, "pos_emb".into(), &[1, 50, dim]);
        for i in 0..depth {
            let p = format!("blocks.{i}");
            put(&mut w, format!("{p}.ff1.weight"), &[dim * 4, dim]);
            put(&mut w, format!("{p}.ff1.bias"), &[dim * 4]);
            put(&mut w, format!("{p}.ff2.weight"), &[dim, dim * 4]);
            put(&mut w, format!("{p}.ff2.bias"), &[dim]);
            put(&mut w, format!("{p}.mhsa.in_proj_weight"), &[3 * dim, dim]);
            put(&mut w, format!("{p}.mhsa.in_proj_bias"), &[3 * dim]);
            put(&mut w, format!("{p}.mhsa.out_proj.weight"), &[dim, dim]);
            put(&mut w, format!("{p}.mhsa.out_proj.bias"), &[dim]);
            put(&mut w, format!("{p}.conv.0.weight"), &[2 * dim, dim, 1]);
            put(&mut w, format!("{p}.conv.0.bias"), &[2 * dim]);
            put(&mut w, format!("{p}.conv.2.weight"), &[dim, 1, 5]);
            put(&mut w, format!("{p}.conv.2.bias"), &[dim]);
            put(&mut w, format!("{p}.conv.3.weight"), &[dim]);
            put(&mut w, format!("{p}.conv.3.bias"), &[dim]);
            put(&mut w, format!("{p}.conv.3.running_mean"), &[dim]);
            w.insert(format!("{p}.conv.3.running_var"), constant(&[dim], 1.0));
            put(&mut w, format!("{p}.conv.5.weight"), &[dim, dim, 1]);
            put(&mut w, format!("{p}.conv.5.bias"), &[dim]);
            for ln in ["ln1", "ln2", "ln3", "ln_final"] {
                w.insert(format!("{p}.{ln}.weight"), constant(&[dim], 1.0));
                w.insert(format!("{p}.{ln}.bias"), constant(&[dim], 0.0));
            }
        }
        put(&mut w, "fc.weight".into(), &[classes, dim]);
        put(&mut w, "fc.bias".into(), &[classes]);
        w
    }

    fn features(frames: usize, dim: usize) -> Array2<f32> {
        let values = filled(&[frames, dim], 99, 1.0)
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        Array2::from_shape_vec((frames, dim), values).unwrap()
    }

    #[test]
    fn test_dims_inferred_from_shapes() {
        let model =
            ConformerClassifier::from_tensors(tiny_tensors(12, 8, 2, 6), ConformerOptions::default())
                .unwrap();
        let dims = model.dims();
        assert_eq!(dims.input_dim, 12);
        assert_eq!(dims.dim, 8);
        assert_eq!(dims.depth, 2);
        assert_eq!(dims.ff_dim, 32);
        assert_eq!(dims.kernel_size, 5);
        assert_eq!(dims.max_positions, 50);
        assert_eq!(dims.num_classes, 6);
    }

    #[test]
    fn test_forward_is_log_probabilities() {
        let model =
            ConformerClassifier::from_tensors(tiny_tensors(12, 8, 2, 6), ConformerOptions::default())
                .unwrap();
        let features = features(7, 12);

        let log_probs = model.forward(features.view()).unwrap();
        assert_eq!(log_probs.dim(), (7, 6));
        for row in log_probs.rows() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-4);
            assert!(row.iter().all(|v| v.is_finite() && *v <= 0.0));
        }

        // Reentrant: same input, same output
        assert_eq!(model.forward(features.view()).unwrap(), log_probs);
    }

    #[test]
    fn test_forward_rejects_bad_inputs() {
        let model =
            ConformerClassifier::from_tensors(tiny_tensors(12, 8, 1, 6), ConformerOptions::default())
                .unwrap();
        assert!(model.forward(Array2::<f32>::zeros((5, 11)).view()).is_err());
        assert!(model.forward(Array2::<f32>::zeros((0, 12)).view()).is_err());
        assert!(model.forward(Array2::<f32>::zeros((51, 12)).view()).is_err());
    }

    #[test]
    fn test_head_count_must_divide_dim() {
        let options = ConformerOptions {
            heads: 3,
            max_positions: None,
        };
        assert!(ConformerClassifier::from_tensors(tiny_tensors(12, 8, 1, 6), options).is_err());
    }

    #[test]
    fn test_max_positions_cap() {
        let capped = ConformerOptions {
            heads: 4,
            max_positions: Some(10),
        };
        let model = ConformerClassifier::from_tensors(tiny_tensors(12, 8, 1, 6), capped).unwrap();
        assert_eq!(model.dims().max_positions, 10);
        assert!(model.forward(features(10, 12).view()).is_ok());
        assert!(model.forward(Array2::<f32>::zeros((11, 12)).view()).is_err());

        let too_big = ConformerOptions {
            heads: 4,
            max_positions: Some(51),
        };
        assert!(ConformerClassifier::from_tensors(tiny_tensors(12, 8, 1, 6), too_big).is_err());
    }

    #[test]
    fn test_missing_tensor_is_load_error() {
        let mut partial = tiny_tensors(12, 8, 1, 6);
        partial.remove("blocks.0.mhsa.in_proj_bias");
        let err = ConformerClassifier::from_tensors(partial, ConformerOptions::default());
        assert!(matches!(err, Err(PronError::ModelLoadError(_))));

        let mut no_fc = tiny_tensors(12, 8, 1, 6);
        no_fc.remove("fc.weight");
        let err = ConformerClassifier::from_tensors(no_fc, ConformerOptions::default());
        assert!(matches!(err, Err(PronError::ModelLoadError(_))));
    }

    #[test]
    fn test_mismatched_classifier_head_is_shape_error() {
        let mut tensors = tiny_tensors(12, 8, 1, 6);
        tensors.insert("fc.weight".into(), filled(&[6, 7], 3, 0.3));
        let err = ConformerClassifier::from_tensors(tensors, ConformerOptions::default());
        assert!(matches!(err, Err(PronError::ShapeMismatch(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pronunciation_model.safetensors");
        candle_core::safetensors::save(&tiny_tensors(12, 8, 1, 6), &path).unwrap();

        let model = ConformerClassifier::load(&path, ConformerOptions::default()).unwrap();
        assert_eq!(model.num_classes(), 6);
        assert!(ConformerClassifier::load(dir.path().join("missing"), ConformerOptions::default())
            .is_err());
    }
}
