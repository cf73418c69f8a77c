// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/conv_detector.rs - 步长卷积检测网络
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
    Linear, LinearConfig, PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
  },
  tensor::{Tensor, activation::relu, backend::Backend},
};

use super::{DetectorSpec, head::{DetectionHeads, DetectionNetwork, SlotHead}};

const POOLED: usize = 4;

#[derive(Debug, Clone)]
pub struct ConvDetectorConfig {
  /// 三层卷积的输出通道
  pub channels: [usize; 3],
  pub hidden: usize,
  pub max_boxes: usize,
  pub num_classes: usize,
}

impl Default for ConvDetectorConfig {
  fn default() -> Self {
    Self {
      channels: [16, 32, 64],
      hidden: 128,
      max_boxes: 16,
      num_classes: 2,
    }
  }
}

impl ConvDetectorConfig {
  pub fn from_spec(spec: &DetectorSpec) -> Self {
    Self {
      max_boxes: spec.max_boxes,
      num_classes: spec.num_classes,
      ..Default::default()
    }
  }
}

fn stride_two<B: Backend>(input: usize, output: usize, device: &B::Device) -> Conv2d<B> {
  Conv2dConfig::new([input, output], [3, 3])
    .with_stride([2, 2])
    .with_padding(PaddingConfig2d::Explicit(1, 1))
    .init(device)
}

#[derive(Module, Debug)]
pub struct ConvDetector<B: Backend> {
  conv1: Conv2d<B>,
  conv2: Conv2d<B>,
  conv3: Conv2d<B>,
  pool: AdaptiveAvgPool2d,
  fc: Linear<B>,
  head: SlotHead<B>,
}

impl<B: Backend> ConvDetector<B> {
  pub fn new(cfg: &ConvDetectorConfig, device: &B::Device) -> Self {
    let [c1, c2, c3] = cfg.channels;
    Self {
      conv1: stride_two(3, c1, device),
      conv2: stride_two(c1, c2, device),
      conv3: stride_two(c2, c3, device),
      pool: AdaptiveAvgPool2dConfig::new([POOLED, POOLED]).init(),
      fc: LinearConfig::new(c3 * POOLED * POOLED, cfg.hidden).init(device),
      head: SlotHead::new(cfg.hidden, cfg.max_boxes, cfg.num_classes, device),
    }
  }
}

impl<B: Backend> DetectionNetwork<B> for ConvDetector<B> {
  fn forward(&self, images: Tensor<B, 4>) -> DetectionHeads<B> {
    let x = relu(self.conv1.forward(images));
    let x = relu(self.conv2.forward(x));
    let x = relu(self.conv3.forward(x));
    let x = self.pool.forward(x).flatten::<2>(1, 3);
    self.head.forward(relu(self.fc.forward(x)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use burn::backend::NdArray;

  type B = NdArray<f32>;

  #[test]
  fn forward_shapes() {
    let device = Default::default();
    let cfg = ConvDetectorConfig {
      channels: [4, 8, 8],
      hidden: 16,
      max_boxes: 3,
      num_classes: 2,
    };
    let model = ConvDetector::<B>::new(&cfg, &device);
    let out = model.forward(Tensor::ones([2, 3, 32, 32], &device));
    assert_eq!(out.boxes.dims(), [2, 3, 4]);
    assert_eq!(out.objectness.dims(), [2, 3]);
    assert_eq!(out.class_logits.dims(), [2, 3, 2]);
  }
}
