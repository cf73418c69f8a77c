// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/head.rs - 检测输出头
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
  nn::{Linear, LinearConfig},
  tensor::{Tensor, activation::sigmoid, backend::Backend},
};

/// 固定数量的预测槽位
#[derive(Debug, Clone)]
pub struct DetectionHeads<B: Backend> {
  /// [N, K, 4]，归一化且保证 x_min <= x_max、y_min <= y_max
  pub boxes: Tensor<B, 3>,
  /// [N, K]，经过 sigmoid
  pub objectness: Tensor<B, 2>,
  /// [N, K, C]，未归一化
  pub class_logits: Tensor<B, 3>,
}

pub trait DetectionNetwork<B: Backend>: Module<B> {
  /// 输入 [N, 3, H, W]，取值 [0, 1]
  fn forward(&self, images: Tensor<B, 4>) -> DetectionHeads<B>;
}

#[derive(Module, Debug)]
pub struct SlotHead<B: Backend> {
  boxes: Linear<B>,
  objectness: Linear<B>,
  classes: Linear<B>,
  max_boxes: usize,
  num_classes: usize,
}

impl<B: Backend> SlotHead<B> {
  pub fn new(features: usize, max_boxes: usize, num_classes: usize, device: &B::Device) -> Self {
    let max_boxes = max_boxes.max(1);
    let num_classes = num_classes.max(2);
    Self {
      boxes: LinearConfig::new(features, max_boxes * 4).init(device),
      objectness: LinearConfig::new(features, max_boxes).init(device),
      classes: LinearConfig::new(features, max_boxes * num_classes).init(device),
      max_boxes,
      num_classes,
    }
  }

  pub fn forward(&self, features: Tensor<B, 2>) -> DetectionHeads<B> {
    let n = features.dims()[0];
    let k = self.max_boxes;

    let boxes = sigmoid(self.boxes.forward(features.clone())).reshape([n, k, 4]);
    let x0 = boxes.clone().slice([0..n, 0..k, 0..1]);
    let y0 = boxes.clone().slice([0..n, 0..k, 1..2]);
    let x1 = boxes.clone().slice([0..n, 0..k, 2..3]);
    let y1 = boxes.slice([0..n, 0..k, 3..4]);

    // min/max 用 (a + b ∓ |a - b|) / 2 表示，保持可导
    let dx = (x0.clone() - x1.clone()).abs();
    let dy = (y0.clone() - y1.clone()).abs();
    let x_min = (x0.clone() + x1.clone() - dx.clone()) * 0.5;
    let x_max = (x0 + x1 + dx) * 0.5;
    let y_min = (y0.clone() + y1.clone() - dy.clone()) * 0.5;
    let y_max = (y0 + y1 + dy) * 0.5;
    let boxes = Tensor::cat(vec![x_min, y_min, x_max, y_max], 2);

    let objectness = sigmoid(self.objectness.forward(features.clone()));
    let class_logits = self
      .classes
      .forward(features)
      .reshape([n, k, self.num_classes]);

    DetectionHeads {
      boxes,
      objectness,
      class_logits,
    }
  }
}
