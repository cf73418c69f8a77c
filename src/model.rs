// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测网络注册表
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

use std::path::{Path, PathBuf};

use burn::{
  optim::{SgdConfig, decay::WeightDecayConfig, momentum::MomentumConfig},
  record::RecorderError,
};
use clap::ValueEnum;
use thiserror::Error;

use crate::{
  TrainAutodiffBackend,
  config::Hyperparameters,
  transform::{ImageTensor, Sample},
};

mod conv_detector;
mod head;
mod mlp_detector;
pub mod postprocess;
mod trainer;

pub use self::conv_detector::{ConvDetector, ConvDetectorConfig};
pub use self::head::{DetectionHeads, DetectionNetwork, SlotHead};
pub use self::mlp_detector::{MlpDetector, MlpDetectorConfig};
pub use self::trainer::DetectorTrainer;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型记录错误: {0}")]
  RecorderError(#[from] RecorderError),
  #[error("输入尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: [usize; 3],
    actual: [usize; 3],
  },
  #[error("张量数据读取失败: {0}")]
  TensorData(String),
}

/// 可选的检测网络
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
  /// 池化特征 + 全连接
  MlpDetector,
  /// 三层步长卷积 + 全连接
  ConvDetector,
}

impl NetworkKind {
  pub const ALL: [NetworkKind; 2] = [NetworkKind::MlpDetector, NetworkKind::ConvDetector];

  pub fn id(&self) -> &'static str {
    match self {
      NetworkKind::MlpDetector => "mlp-detector",
      NetworkKind::ConvDetector => "conv-detector",
    }
  }
}

impl std::fmt::Display for NetworkKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.id())
  }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectItem {
  /// 类别下标，0 为背景
  pub label: usize,
  pub score: f32,
  pub bbox: [f32; 4], // 归一化 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// 单步训练的损失分量
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
  pub objectness: f32,
  pub box_regression: f32,
  pub classifier: f32,
  pub total: f32,
}

impl LossBreakdown {
  pub fn is_finite(&self) -> bool {
    self.total.is_finite()
  }
}

/// 可训练检测器：前向推理、参数统计、一步优化与状态序列化
pub trait TrainableDetector {
  fn network(&self) -> NetworkKind;
  fn num_params(&self) -> usize;
  fn train_step(&mut self, sample: &Sample, lr: f64) -> Result<LossBreakdown, DetectorError>;
  fn detect(&self, image: &ImageTensor) -> Result<DetectResult, DetectorError>;
  /// 保存权重，返回实际写入的文件路径
  fn save_state(&self, path: &Path) -> Result<PathBuf, DetectorError>;
  fn load_state(&mut self, path: &Path) -> Result<(), DetectorError>;
}

/// 构造检测器所需的结构参数
#[derive(Debug, Clone)]
pub struct DetectorSpec {
  pub num_classes: usize,
  pub input_size: u32,
  pub max_boxes: usize,
  pub hyper: Hyperparameters,
}

pub type DetectorConstructor = fn(&DetectorSpec) -> Box<dyn TrainableDetector>;

pub(crate) fn sgd_config(hyper: &Hyperparameters) -> SgdConfig {
  SgdConfig::new()
    .with_momentum(Some(
      MomentumConfig::new()
        .with_momentum(hyper.momentum)
        .with_dampening(0.0),
    ))
    .with_weight_decay(Some(WeightDecayConfig::new(hyper.weight_decay)))
}

fn build_mlp_detector(spec: &DetectorSpec) -> Box<dyn TrainableDetector> {
  type B = TrainAutodiffBackend;
  let device = Default::default();
  let model = MlpDetector::<B>::new(&MlpDetectorConfig::from_spec(spec), &device);
  let optim = sgd_config(&spec.hyper).init::<B, MlpDetector<B>>();
  Box::new(DetectorTrainer::new(
    NetworkKind::MlpDetector,
    model,
    optim,
    spec,
    device,
  ))
}

fn build_conv_detector(spec: &DetectorSpec) -> Box<dyn TrainableDetector> {
  type B = TrainAutodiffBackend;
  let device = Default::default();
  let model = ConvDetector::<B>::new(&ConvDetectorConfig::from_spec(spec), &device);
  let optim = sgd_config(&spec.hyper).init::<B, ConvDetector<B>>();
  Box::new(DetectorTrainer::new(
    NetworkKind::ConvDetector,
    model,
    optim,
    spec,
    device,
  ))
}

/// 网络标识到构造函数的映射
pub fn constructor(kind: NetworkKind) -> DetectorConstructor {
  match kind {
    NetworkKind::MlpDetector => build_mlp_detector,
    NetworkKind::ConvDetector => build_conv_detector,
  }
}

pub fn registry() -> impl Iterator<Item = (NetworkKind, DetectorConstructor)> {
  NetworkKind::ALL
    .into_iter()
    .map(|kind| (kind, constructor(kind)))
}

pub fn build_detector(kind: NetworkKind, spec: &DetectorSpec) -> Box<dyn TrainableDetector> {
  constructor(kind)(spec)
}
