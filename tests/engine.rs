// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/engine.rs - 训练轮次驱动的集成测试
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

mod common;

use std::path::{Path, PathBuf};

use rand::{SeedableRng, rngs::StdRng};
use shanan_train::{
  config::Hyperparameters,
  dataset::{DatasetSplit, DatasetView, DetectionDataset, assemble},
  engine::{self, EngineError},
  labels::LabelSet,
  manifest::Manifest,
  model::{DetectResult, DetectorError, LossBreakdown, NetworkKind, TrainableDetector},
  transform::{ImageTensor, Sample},
};

use common::{LABELS, quick_config, write_dataset, write_labels};

/// 每一步都返回固定损失的检测器
struct FixedLossDetector {
  loss: f32,
  steps: usize,
}

impl FixedLossDetector {
  fn new(loss: f32) -> Self {
    Self { loss, steps: 0 }
  }
}

impl TrainableDetector for FixedLossDetector {
  fn network(&self) -> NetworkKind {
    NetworkKind::MlpDetector
  }

  fn num_params(&self) -> usize {
    0
  }

  fn train_step(&mut self, _sample: &Sample, _lr: f64) -> Result<LossBreakdown, DetectorError> {
    self.steps += 1;
    Ok(LossBreakdown {
      total: self.loss,
      ..Default::default()
    })
  }

  fn detect(&self, _image: &ImageTensor) -> Result<DetectResult, DetectorError> {
    Ok(DetectResult::default())
  }

  fn save_state(&self, path: &Path) -> Result<PathBuf, DetectorError> {
    Ok(path.to_path_buf())
  }

  fn load_state(&mut self, _path: &Path) -> Result<(), DetectorError> {
    Ok(())
  }
}

/// 在 `root` 下生成 `count` 个样本，返回 (训练视图, 测试视图)
fn views(root: &Path, count: usize, rng: &mut StdRng) -> (DatasetView, DatasetView) {
  write_labels(root, LABELS);
  write_dataset(root, count, "manifest_1.json");
  let config = quick_config(root, 1);
  let manifest = Manifest::load(&config.manifest_dir().join("manifest_1.json")).unwrap();
  let labels = LabelSet::load(&config.label_file()).unwrap();
  let dataset = DetectionDataset::from_manifest(
    &config.image_dir(),
    &config.annotation_dir(),
    &manifest,
    labels,
  )
  .unwrap();
  let split = DatasetSplit::random(dataset.len(), 0.2, rng).unwrap();
  assemble(&dataset, split, config.input_size)
}

#[test]
fn nan_loss_stops_at_the_first_step() {
  let dir = tempfile::tempdir().unwrap();
  let mut rng = StdRng::seed_from_u64(11);
  let (train_view, _) = views(dir.path(), 4, &mut rng);
  let mut detector = FixedLossDetector::new(f32::NAN);

  let err = engine::train_one_epoch(
    &mut detector,
    &train_view,
    0,
    &Hyperparameters::default(),
    &mut rng,
  )
  .unwrap_err();
  assert!(matches!(
    err,
    EngineError::NonFiniteLoss {
      epoch: 0,
      step: 0,
      ..
    }
  ));
  assert_eq!(detector.steps, 1);
}

#[test]
fn infinite_loss_aborts_training() {
  let dir = tempfile::tempdir().unwrap();
  let mut rng = StdRng::seed_from_u64(5);
  let (train_view, test_view) = views(dir.path(), 6, &mut rng);
  let mut detector = FixedLossDetector::new(f32::INFINITY);

  let result = engine::train(
    &mut detector,
    &train_view,
    &test_view,
    3,
    &Hyperparameters::default(),
    &mut rng,
  );
  assert!(matches!(result, Err(EngineError::NonFiniteLoss { .. })));
  assert_eq!(detector.steps, 1);
}

#[test]
fn finite_loss_is_recorded_per_epoch() {
  let dir = tempfile::tempdir().unwrap();
  let mut rng = StdRng::seed_from_u64(5);
  let (train_view, test_view) = views(dir.path(), 6, &mut rng);
  let mut detector = FixedLossDetector::new(0.5);

  let history = engine::train(
    &mut detector,
    &train_view,
    &test_view,
    2,
    &Hyperparameters::default(),
    &mut rng,
  )
  .unwrap();
  assert_eq!(history.losses(), &[0.5, 0.5]);
  assert_eq!(history.len(), 2);
  assert_eq!(detector.steps, 2 * train_view.len());
}
