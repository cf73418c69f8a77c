// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine.rs - 训练轮次驱动与评估
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

use std::time::Instant;

use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{error, info};

use crate::{
  config::Hyperparameters,
  dataset::{DatasetError, DatasetView},
  evaluate::{CocoEvaluator, CocoStats},
  model::{DetectorError, LossBreakdown, TrainableDetector},
  settings::{AVERAGE_PRECISION_STAT_INDEX, AVERAGE_RECALL_STAT_INDEX},
};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("数据集错误: {0}")]
  DatasetError(#[from] DatasetError),
  #[error("模型错误: {0}")]
  DetectorError(#[from] DetectorError),
  #[error("第 {epoch} 轮第 {step} 步损失为 {loss}，停止训练")]
  NonFiniteLoss { epoch: usize, step: usize, loss: f32 },
}

/// StepLR：每 `lr_step_size` 轮乘以一次 `lr_gamma`
pub fn epoch_learning_rate(hyper: &Hyperparameters, epoch: usize) -> f64 {
  let step = hyper.lr_step_size.max(1);
  hyper.learning_rate * hyper.lr_gamma.powi((epoch / step) as i32)
}

/// 第 0 轮的线性预热系数，从 `warmup_factor` 线性增长到 1
pub fn warmup_multiplier(hyper: &Hyperparameters, iteration: usize, warmup_iters: usize) -> f64 {
  if iteration >= warmup_iters {
    return 1.0;
  }
  let alpha = iteration as f64 / warmup_iters as f64;
  hyper.warmup_factor * (1.0 - alpha) + alpha
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EpochSummary {
  pub steps: usize,
  pub mean_loss: f32,
  pub last_lr: f64,
}

fn log_step(
  epoch: usize,
  step: usize,
  total: usize,
  lr: f64,
  loss: &LossBreakdown,
  started: Instant,
) {
  info!(
    "Epoch: [{}] [{}/{}] lr: {:.6} loss: {:.4} (objectness: {:.4} box_reg: {:.4} classifier: {:.4}) 耗时: {:.2?}",
    epoch,
    step,
    total,
    lr,
    loss.total,
    loss.objectness,
    loss.box_regression,
    loss.classifier,
    started.elapsed()
  );
}

pub fn train_one_epoch(
  detector: &mut dyn TrainableDetector,
  view: &DatasetView,
  epoch: usize,
  hyper: &Hyperparameters,
  rng: &mut StdRng,
) -> Result<EpochSummary, EngineError> {
  let order = view.epoch_order(true, rng);
  let total = order.len();
  let base_lr = epoch_learning_rate(hyper, epoch);
  let warmup_iters = if epoch == 0 {
    hyper.warmup_iters.min(total.saturating_sub(1))
  } else {
    0
  };
  let print_freq = hyper.print_freq.max(1);

  let started = Instant::now();
  let mut loss_sum = 0.0f32;
  let mut lr = base_lr;
  for (step, position) in order.into_iter().enumerate() {
    let sample = view.get(position, rng)?;
    lr = base_lr * warmup_multiplier(hyper, step, warmup_iters);
    let loss = detector.train_step(&sample, lr)?;
    if !loss.is_finite() {
      error!("损失为 {}，停止训练", loss.total);
      return Err(EngineError::NonFiniteLoss {
        epoch,
        step,
        loss: loss.total,
      });
    }
    loss_sum += loss.total;
    if step % print_freq == 0 || step + 1 == total {
      log_step(epoch, step, total, lr, &loss, started);
    }
  }

  let summary = EpochSummary {
    steps: total,
    mean_loss: if total == 0 { 0.0 } else { loss_sum / total as f32 },
    last_lr: lr,
  };
  info!(
    "第 {} 轮训练完成，平均损失 {:.4}，耗时: {:.2?}",
    epoch,
    summary.mean_loss,
    started.elapsed()
  );
  Ok(summary)
}

/// 在测试视图上推理并计算 12 项统计值
pub fn evaluate(
  detector: &dyn TrainableDetector,
  view: &DatasetView,
  rng: &mut StdRng,
) -> Result<CocoStats, EngineError> {
  let started = Instant::now();
  let mut evaluator = CocoEvaluator::new();
  for position in view.epoch_order(false, rng) {
    let sample = view.get(position, rng)?;
    let detections = detector.detect(&sample.image)?;
    evaluator.add_image(sample.source_size, &sample.targets, &detections);
  }
  let stats = evaluator.summarize();
  info!(
    "评估完成，{} 张图像，耗时: {:.2?}\n{}",
    evaluator.num_images(),
    started.elapsed(),
    stats
  );
  Ok(stats)
}

/// 每轮评估后的 AP 与 AR，以及该轮的平均训练损失
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricHistory {
  precision: Vec<f32>,
  recall: Vec<f32>,
  losses: Vec<f32>,
}

impl MetricHistory {
  pub fn record(&mut self, summary: &EpochSummary, stats: &CocoStats) {
    self.losses.push(summary.mean_loss);
    self.push(stats);
  }

  pub fn push(&mut self, stats: &CocoStats) {
    self
      .precision
      .push(stats.get(AVERAGE_PRECISION_STAT_INDEX).unwrap_or(-1.0) as f32);
    self
      .recall
      .push(stats.get(AVERAGE_RECALL_STAT_INDEX).unwrap_or(-1.0) as f32);
  }

  pub fn len(&self) -> usize {
    self.precision.len()
  }

  pub fn is_empty(&self) -> bool {
    self.precision.is_empty()
  }

  pub fn precision(&self) -> &[f32] {
    &self.precision
  }

  pub fn recall(&self) -> &[f32] {
    &self.recall
  }

  pub fn losses(&self) -> &[f32] {
    &self.losses
  }
}

/// 完整的训练过程：每轮训练、调整学习率、评估并记录指标
pub fn train(
  detector: &mut dyn TrainableDetector,
  train_view: &DatasetView,
  test_view: &DatasetView,
  num_epochs: usize,
  hyper: &Hyperparameters,
  rng: &mut StdRng,
) -> Result<MetricHistory, EngineError> {
  let mut history = MetricHistory::default();
  for epoch in 0..num_epochs {
    let summary = train_one_epoch(detector, train_view, epoch, hyper, rng)?;
    let stats = evaluate(detector, test_view, rng)?;
    history.record(&summary, &stats);
  }
  Ok(history)
}
