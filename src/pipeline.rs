// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 一次完整的训练运行
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

use anyhow::Result;
use rand::{SeedableRng, rngs::StdRng};
use tracing::{error, info, warn};

use crate::{
  artifact::{RunArtifacts, save_plot, save_weights},
  config::TrainConfig,
  dataset::{DatasetSplit, DetectionDataset, assemble},
  engine::{self, MetricHistory},
  labels::{LabelError, LabelSet},
  manifest::{Manifest, newest_manifest_path},
  model::{DetectorSpec, build_detector},
  plot::load_font,
  remote::{ObjectStore, sync_down, upload_files},
  settings::*,
};

/// 运行被提前终止但不算失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
  MissingLabels(PathBuf),
  EmptyLabels(PathBuf),
  MissingManifest(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RunReport {
  pub artifacts: RunArtifacts,
  pub history: MetricHistory,
  pub num_train: usize,
  pub num_test: usize,
  /// 成功上传的对象键，未启用远端时为空
  pub uploaded: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
  Completed(RunReport),
  Aborted(AbortReason),
}

/// 确认存储桶可用；不可用时退回纯本地模式
fn resolve_remote<'a>(
  config: &TrainConfig,
  store: Option<&'a dyn ObjectStore>,
) -> Option<(&'a dyn ObjectStore, String)> {
  let bucket = config.s3_bucket_name.as_ref()?;
  let Some(store) = store else {
    warn!("未配置对象存储后端，仅使用本地数据");
    return None;
  };
  if !store.bucket_exists(bucket) {
    warn!("存储桶 {} 不存在或无访问权限，仅使用本地数据", bucket);
    return None;
  }
  info!("使用存储桶 {}", bucket);
  Some((store, bucket.clone()))
}

fn pull_data(store: &dyn ObjectStore, bucket: &str, config: &TrainConfig) -> bool {
  let jobs = [
    (IMAGE_DIR_NAME, config.image_dir(), IMAGE_FILE_TYPE),
    (ANNOTATION_DIR_NAME, config.annotation_dir(), ANNOTATION_FILE_TYPE),
    (MANIFEST_DIR_NAME, config.manifest_dir(), MANIFEST_FILE_TYPE),
  ];
  for (subdir, local_dir, file_type) in jobs {
    let prefix = config.remote_prefix(subdir);
    if let Err(e) = sync_down(store, bucket, &prefix, &local_dir, file_type) {
      warn!("从 {}/{} 同步失败: {}，改为仅使用本地数据", bucket, prefix, e);
      return false;
    }
  }
  true
}

fn load_labels(path: &Path) -> Result<std::result::Result<LabelSet, AbortReason>> {
  match LabelSet::load(path) {
    Ok(labels) => Ok(Ok(labels)),
    Err(LabelError::Missing(path)) => {
      error!("缺少标签文件 {}", path.display());
      Ok(Err(AbortReason::MissingLabels(path)))
    }
    Err(LabelError::Empty(path)) => {
      error!("标签文件 {} 中没有类别", path.display());
      Ok(Err(AbortReason::EmptyLabels(path)))
    }
    Err(e) => Err(e.into()),
  }
}

fn publish(
  store: &dyn ObjectStore,
  bucket: &str,
  config: &TrainConfig,
  artifacts: &RunArtifacts,
) -> Vec<String> {
  let uploads = [
    (&artifacts.weights, MODEL_STATE_DIR_NAME),
    (&artifacts.plot, LOGS_DIR_NAME),
  ];
  let mut keys = Vec::new();
  for (file, subdir) in uploads {
    let prefix = config.remote_prefix(subdir);
    match upload_files(store, bucket, std::slice::from_ref(file), &prefix) {
      Ok(uploaded) => keys.extend(uploaded),
      Err(e) => warn!("上传 {} 失败: {}", file.display(), e),
    }
  }
  keys
}

pub fn run(config: &TrainConfig, store: Option<&dyn ObjectStore>) -> Result<RunOutcome> {
  run_at(config, store, chrono::Utc::now().timestamp())
}

/// 以给定的起始时间戳执行一次训练运行
pub fn run_at(
  config: &TrainConfig,
  store: Option<&dyn ObjectStore>,
  start_time: i64,
) -> Result<RunOutcome> {
  let run_name = config.run_name(start_time);
  info!("开始训练运行 {}", run_name);

  let remote = resolve_remote(config, store)
    .filter(|(store, bucket)| pull_data(*store, bucket, config));

  let labels = match load_labels(&config.label_file())? {
    Ok(labels) => labels,
    Err(reason) => return Ok(RunOutcome::Aborted(reason)),
  };
  info!("类别数（含背景）: {}", labels.len());

  let manifest_dir = config.manifest_dir();
  let Some(manifest_path) = newest_manifest_path(&manifest_dir) else {
    error!("在 {} 中找不到清单文件", manifest_dir.display());
    return Ok(RunOutcome::Aborted(AbortReason::MissingManifest(manifest_dir)));
  };
  info!("使用清单 {}", manifest_path.display());
  let manifest = Manifest::load(&manifest_path)?;

  let spec = DetectorSpec {
    num_classes: labels.len(),
    input_size: config.input_size,
    max_boxes: config.max_boxes,
    hyper: config.hyper.clone(),
  };
  let dataset = DetectionDataset::from_manifest(
    &config.image_dir(),
    &config.annotation_dir(),
    &manifest,
    labels,
  )?;

  let mut rng = match config.seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_rng(&mut rand::rng()),
  };
  let split = DatasetSplit::random(dataset.len(), TEST_SPLIT_FRACTION, &mut rng)?;
  let (train_view, test_view) = assemble(&dataset, split, config.input_size);
  info!(
    "训练样本 {} 个，测试样本 {} 个",
    train_view.len(),
    test_view.len()
  );

  let mut detector = build_detector(config.network, &spec);
  info!(
    "网络 {} 参数量: {}",
    detector.network(),
    detector.num_params()
  );

  let history = engine::train(
    detector.as_mut(),
    &train_view,
    &test_view,
    config.num_epochs,
    &config.hyper,
    &mut rng,
  )?;

  let weights = save_weights(detector.as_ref(), config, &run_name)?;
  let font = load_font(config.font.as_deref());
  let plot = save_plot(&history, config, &run_name, font.as_ref())?;
  let artifacts = RunArtifacts {
    run_name,
    weights,
    plot,
  };

  let uploaded = match &remote {
    Some((store, bucket)) => publish(*store, bucket, config, &artifacts),
    None => Vec::new(),
  };

  info!("训练运行 {} 完成", artifacts.run_name);
  Ok(RunOutcome::Completed(RunReport {
    artifacts,
    history,
    num_train: train_view.len(),
    num_test: test_view.len(),
    uploaded,
  }))
}
