// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/mlp_detector.rs - 池化特征 + 全连接检测网络
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

use burn::{
  module::Module,
  nn::{
    Linear, LinearConfig,
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
  },
  tensor::{Tensor, activation::relu, backend::Backend},
};

use super::{DetectorSpec, head::{DetectionHeads, DetectionNetwork, SlotHead}};

#[derive(Debug, Clone)]
pub struct MlpDetectorConfig {
  pub pooled: usize,
  pub hidden: usize,
  pub depth: usize,
  pub max_boxes: usize,
  pub num_classes: usize,
}

impl Default for MlpDetectorConfig {
  fn default() -> Self {
    Self {
      pooled: 8,
      hidden: 128,
      depth: 2,
      max_boxes: 16,
      num_classes: 2,
    }
  }
}

impl MlpDetectorConfig {
  pub fn from_spec(spec: &DetectorSpec) -> Self {
    Self {
      max_boxes: spec.max_boxes,
      num_classes: spec.num_classes,
      ..Default::default()
    }
  }
}

#[derive(Module, Debug)]
pub struct MlpDetector<B: Backend> {
  pool: AdaptiveAvgPool2d,
  stem: Linear<B>,
  blocks: Vec<Linear<B>>,
  head: SlotHead<B>,
}

impl<B: Backend> MlpDetector<B> {
  pub fn new(cfg: &MlpDetectorConfig, device: &B::Device) -> Self {
    let pooled = cfg.pooled.max(1);
    let stem = LinearConfig::new(3 * pooled * pooled, cfg.hidden).init(device);
    let blocks = (0..cfg.depth)
      .map(|_| LinearConfig::new(cfg.hidden, cfg.hidden).init(device))
      .collect();
    Self {
      pool: AdaptiveAvgPool2dConfig::new([pooled, pooled]).init(),
      stem,
      blocks,
      head: SlotHead::new(cfg.hidden, cfg.max_boxes, cfg.num_classes, device),
    }
  }
}

impl<B: Backend> DetectionNetwork<B> for MlpDetector<B> {
  fn forward(&self, images: Tensor<B, 4>) -> DetectionHeads<B> {
    let x = self.pool.forward(images).flatten::<2>(1, 3);
    let mut x = relu(self.stem.forward(x));
    for block in &self.blocks {
      x = relu(block.forward(x));
    }
    self.head.forward(x)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use burn::backend::NdArray;

  type B = NdArray<f32>;

  #[test]
  fn forward_accepts_any_square_input() {
    let device = Default::default();
    let cfg = MlpDetectorConfig {
      max_boxes: 4,
      num_classes: 3,
      ..Default::default()
    };
    let model = MlpDetector::<B>::new(&cfg, &device);
    for size in [16, 40] {
      let out = model.forward(Tensor::zeros([1, 3, size, size], &device));
      assert_eq!(out.boxes.dims(), [1, 4, 4]);
      assert_eq!(out.class_logits.dims(), [1, 4, 3]);
    }
  }
}
