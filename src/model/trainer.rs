// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/trainer.rs - 检测网络的损失计算、优化与权重读写
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::{
  module::{AutodiffModule, Module},
  optim::{GradientsParams, Optimizer},
  record::{BinFileRecorder, FullPrecisionSettings},
  tensor::{
    Tensor, TensorData,
    activation::log_softmax,
    backend::{AutodiffBackend, Backend},
  },
};
use tracing::debug;

use super::{
  DetectResult, DetectorError, DetectorSpec, LossBreakdown, NetworkKind, TrainableDetector,
  head::{DetectionHeads, DetectionNetwork},
  postprocess::{decode, greedy_match},
};
use crate::transform::{ImageTensor, Sample};

const EPS: f32 = 1e-6;

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, DetectorError> {
  tensor
    .into_data()
    .to_vec::<f32>()
    .map_err(|e| DetectorError::TensorData(format!("{e:?}")))
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32, DetectorError> {
  Ok(to_vec(tensor)?.first().copied().unwrap_or(f32::NAN))
}

/// 包装一个可微网络及其优化器
pub struct DetectorTrainer<B, M, O>
where
  B: AutodiffBackend,
  M: AutodiffModule<B> + DetectionNetwork<B>,
  O: Optimizer<M, B>,
{
  kind: NetworkKind,
  model: M,
  optim: O,
  input_size: usize,
  device: B::Device,
  _backend: PhantomData<B>,
}

impl<B, M, O> DetectorTrainer<B, M, O>
where
  B: AutodiffBackend,
  M: AutodiffModule<B> + DetectionNetwork<B>,
  M::InnerModule: DetectionNetwork<B::InnerBackend>,
  O: Optimizer<M, B>,
{
  pub fn new(
    kind: NetworkKind,
    model: M,
    optim: O,
    spec: &DetectorSpec,
    device: B::Device,
  ) -> Self {
    Self {
      kind,
      model,
      optim,
      input_size: spec.input_size as usize,
      device,
      _backend: PhantomData,
    }
  }

  fn check_shape(&self, image: &ImageTensor) -> Result<(), DetectorError> {
    let expected = [3, self.input_size, self.input_size];
    if image.shape() != expected || image.data.len() != expected.iter().product::<usize>() {
      return Err(DetectorError::ShapeMismatch {
        expected,
        actual: image.shape(),
      });
    }
    Ok(())
  }

  fn image_tensor<BB: Backend>(image: &ImageTensor, device: &BB::Device) -> Tensor<BB, 4> {
    let [c, h, w] = image.shape();
    Tensor::from_data(TensorData::new(image.data.clone(), [1, c, h, w]), device)
  }

  /// 目标框、objectness 与类别的监督信号，全部为 [1, K, ..] 形状
  fn build_targets(
    &self,
    heads: &DetectionHeads<B>,
    sample: &Sample,
  ) -> Result<(Tensor<B, 2>, Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>, usize), DetectorError> {
    let [_, k, _] = heads.boxes.dims();
    let [_, _, c] = heads.class_logits.dims();

    let pred: Vec<[f32; 4]> = to_vec(heads.boxes.clone().detach())?
      .chunks_exact(4)
      .map(|b| [b[0], b[1], b[2], b[3]])
      .collect();
    let assigned = greedy_match(&pred, &sample.targets);

    let mut obj = vec![0.0f32; k];
    let mut boxes = vec![0.0f32; k * 4];
    let mut weights = vec![0.0f32; k * 4];
    let mut classes = vec![0.0f32; k * c];
    let mut matched = 0;
    for (slot, target) in assigned.iter().enumerate() {
      let Some(t) = target else { continue };
      let target = &sample.targets[*t];
      obj[slot] = 1.0;
      boxes[slot * 4..slot * 4 + 4].copy_from_slice(&target.bbox);
      weights[slot * 4..slot * 4 + 4].fill(1.0);
      if target.label < c {
        classes[slot * c + target.label] = 1.0;
      }
      matched += 1;
    }

    let device = &self.device;
    Ok((
      Tensor::from_data(TensorData::new(obj, [1, k]), device),
      Tensor::from_data(TensorData::new(boxes, [1, k, 4]), device),
      Tensor::from_data(TensorData::new(weights, [1, k, 4]), device),
      Tensor::from_data(TensorData::new(classes, [1, k, c]), device),
      matched,
    ))
  }
}

impl<B, M, O> TrainableDetector for DetectorTrainer<B, M, O>
where
  B: AutodiffBackend,
  M: AutodiffModule<B> + DetectionNetwork<B>,
  M::InnerModule: DetectionNetwork<B::InnerBackend>,
  O: Optimizer<M, B>,
{
  fn network(&self) -> NetworkKind {
    self.kind
  }

  fn num_params(&self) -> usize {
    self.model.num_params()
  }

  fn train_step(&mut self, sample: &Sample, lr: f64) -> Result<LossBreakdown, DetectorError> {
    self.check_shape(&sample.image)?;
    let images = Self::image_tensor::<B>(&sample.image, &self.device);
    let heads = self.model.forward(images);
    let (obj_t, box_t, box_w, cls_t, matched) = self.build_targets(&heads, sample)?;

    // objectness: BCE
    let prob = heads.objectness.clamp(EPS, 1.0 - EPS);
    let obj_loss = -(obj_t.clone() * prob.clone().log()
      + (obj_t.ones_like() - obj_t) * (prob.ones_like() - prob).log())
    .mean();

    let (box_loss, cls_loss) = if matched > 0 {
      let box_loss = ((heads.boxes - box_t).abs() * box_w)
        .sum()
        .div_scalar(matched as f32);
      let cls_loss = -(log_softmax(heads.class_logits, 2) * cls_t)
        .sum()
        .div_scalar(matched as f32);
      (box_loss, cls_loss)
    } else {
      let zero = || Tensor::<B, 1>::zeros([1], &self.device);
      (zero(), zero())
    };

    let loss = obj_loss.clone() + box_loss.clone() + cls_loss.clone();
    let breakdown = LossBreakdown {
      objectness: scalar(obj_loss.detach())?,
      box_regression: scalar(box_loss.detach())?,
      classifier: scalar(cls_loss.detach())?,
      total: scalar(loss.clone().detach())?,
    };
    if !breakdown.is_finite() {
      return Ok(breakdown);
    }

    let grads = GradientsParams::from_grads(loss.backward(), &self.model);
    self.model = self.optim.step(lr, self.model.clone(), grads);
    Ok(breakdown)
  }

  fn detect(&self, image: &ImageTensor) -> Result<DetectResult, DetectorError> {
    self.check_shape(image)?;
    let model = self.model.valid();
    let images = Self::image_tensor::<B::InnerBackend>(image, &self.device);
    let heads = model.forward(images);
    let [_, _, c] = heads.class_logits.dims();
    let boxes = to_vec(heads.boxes)?;
    let objectness = to_vec(heads.objectness)?;
    let class_logits = to_vec(heads.class_logits)?;
    Ok(decode(&boxes, &objectness, &class_logits, c))
  }

  fn save_state(&self, path: &Path) -> Result<PathBuf, DetectorError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    self.model.clone().save_file(path, &recorder)?;
    let written = path.with_extension("bin");
    debug!("权重写入 {}", written.display());
    Ok(written)
  }

  fn load_state(&mut self, path: &Path) -> Result<(), DetectorError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    self.model = self.model.clone().load_file(path, &recorder, &self.device)?;
    Ok(())
  }
}
