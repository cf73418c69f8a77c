// 该文件是 Shanan （山南西风） 项目的一部分。
// src/artifact.rs - 训练产物的命名与落盘
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

use ab_glyph::FontArc;
use thiserror::Error;
use tracing::info;

use crate::{
  config::TrainConfig,
  engine::MetricHistory,
  model::{DetectorError, TrainableDetector},
  plot::{PlotError, save_metrics_plot},
  settings::{LOG_IMAGE_FILE_TYPE, MODEL_STATE_FILE_TYPE},
};

#[derive(Error, Debug)]
pub enum ArtifactError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("权重保存失败: {0}")]
  DetectorError(#[from] DetectorError),
  #[error("图表保存失败: {0}")]
  PlotError(#[from] PlotError),
}

/// 一次运行写出的两个产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
  pub run_name: String,
  pub weights: PathBuf,
  pub plot: PathBuf,
}

/// 目录已存在时不做任何事
pub fn create_output_dir(path: &Path) -> Result<(), ArtifactError> {
  std::fs::create_dir_all(path)?;
  Ok(())
}

pub fn weights_path(config: &TrainConfig, run_name: &str) -> PathBuf {
  config
    .model_state_dir()
    .join(format!("{run_name}.{MODEL_STATE_FILE_TYPE}"))
}

pub fn plot_path(config: &TrainConfig, run_name: &str) -> PathBuf {
  config
    .logs_dir()
    .join(format!("{run_name}.{LOG_IMAGE_FILE_TYPE}"))
}

pub fn save_weights(
  detector: &dyn TrainableDetector,
  config: &TrainConfig,
  run_name: &str,
) -> Result<PathBuf, ArtifactError> {
  create_output_dir(&config.model_state_dir())?;
  let path = detector.save_state(&weights_path(config, run_name))?;
  info!("模型权重已保存: {}", path.display());
  Ok(path)
}

pub fn save_plot(
  history: &MetricHistory,
  config: &TrainConfig,
  run_name: &str,
  font: Option<&FontArc>,
) -> Result<PathBuf, ArtifactError> {
  create_output_dir(&config.logs_dir())?;
  let path = plot_path(config, run_name);
  save_metrics_plot(history, run_name, font, &path)?;
  info!("评估图表已保存: {}", path.display());
  Ok(path)
}
