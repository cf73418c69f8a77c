// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 训练运行配置
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

use std::path::PathBuf;

use crate::{model::NetworkKind, settings::*};

/// 优化器与学习率调度参数
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
  pub learning_rate: f64,
  pub momentum: f64,
  pub weight_decay: f32,
  pub lr_step_size: usize,
  pub lr_gamma: f64,
  pub print_freq: usize,
  pub warmup_factor: f64,
  pub warmup_iters: usize,
}

impl Default for Hyperparameters {
  fn default() -> Self {
    Self {
      learning_rate: DEFAULT_LEARNING_RATE,
      momentum: DEFAULT_MOMENTUM,
      weight_decay: DEFAULT_WEIGHT_DECAY,
      lr_step_size: DEFAULT_LR_STEP_SIZE,
      lr_gamma: DEFAULT_LR_GAMMA,
      print_freq: DEFAULT_PRINT_FREQ,
      warmup_factor: DEFAULT_WARMUP_FACTOR,
      warmup_iters: DEFAULT_WARMUP_ITERS,
    }
  }
}

/// 一次训练运行的完整配置，启动时构造一次，之后只读
#[derive(Debug, Clone)]
pub struct TrainConfig {
  pub local_data_dir: PathBuf,
  pub s3_bucket_name: Option<String>,
  pub s3_data_dir: String,
  pub network: NetworkKind,
  pub num_epochs: usize,
  pub seed: Option<u64>,
  pub font: Option<PathBuf>,
  pub input_size: u32,
  pub max_boxes: usize,
  pub hyper: Hyperparameters,
}

impl TrainConfig {
  pub fn new(local_data_dir: impl Into<PathBuf>, network: NetworkKind) -> Self {
    Self {
      local_data_dir: local_data_dir.into(),
      s3_bucket_name: None,
      s3_data_dir: DEFAULT_S3_DATA_DIR.to_string(),
      network,
      num_epochs: DEFAULT_NUM_EPOCHS,
      seed: None,
      font: None,
      input_size: DEFAULT_INPUT_SIZE,
      max_boxes: DEFAULT_MAX_BOXES,
      hyper: Hyperparameters::default(),
    }
  }

  pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
    self.s3_bucket_name = Some(bucket.into());
    self
  }

  pub fn with_num_epochs(mut self, num_epochs: usize) -> Self {
    self.num_epochs = num_epochs;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn remote_requested(&self) -> bool {
    self.s3_bucket_name.is_some()
  }

  pub fn local_dir(&self, name: &str) -> PathBuf {
    self.local_data_dir.join(name)
  }

  pub fn image_dir(&self) -> PathBuf {
    self.local_dir(IMAGE_DIR_NAME)
  }

  pub fn annotation_dir(&self) -> PathBuf {
    self.local_dir(ANNOTATION_DIR_NAME)
  }

  pub fn manifest_dir(&self) -> PathBuf {
    self.local_dir(MANIFEST_DIR_NAME)
  }

  pub fn model_state_dir(&self) -> PathBuf {
    self.local_dir(MODEL_STATE_DIR_NAME)
  }

  pub fn logs_dir(&self) -> PathBuf {
    self.local_dir(LOGS_DIR_NAME)
  }

  pub fn label_file(&self) -> PathBuf {
    self.local_dir(LABEL_FILE_NAME)
  }

  /// 远端对象前缀：`{s3_data_dir}/{subdir}`
  pub fn remote_prefix(&self, subdir: &str) -> String {
    let base = self.s3_data_dir.trim_end_matches('/');
    if base.is_empty() {
      subdir.to_string()
    } else {
      format!("{}/{}", base, subdir)
    }
  }

  pub fn run_name(&self, start_time: i64) -> String {
    format!("{}-{}", start_time, self.network.id())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layout_is_rooted_at_local_data_dir() {
    let config = TrainConfig::new("/tmp/boxes", NetworkKind::MlpDetector);
    assert_eq!(config.image_dir(), PathBuf::from("/tmp/boxes/images"));
    assert_eq!(config.label_file(), PathBuf::from("/tmp/boxes/labels.txt"));
    assert_eq!(config.model_state_dir(), PathBuf::from("/tmp/boxes/models"));
  }

  #[test]
  fn remote_prefix_joins_with_single_slash() {
    let mut config = TrainConfig::new("data", NetworkKind::ConvDetector);
    config.s3_data_dir = "team/data/".into();
    assert_eq!(config.remote_prefix("images"), "team/data/images");
    config.s3_data_dir = String::new();
    assert_eq!(config.remote_prefix("logs"), "logs");
  }

  #[test]
  fn run_name_combines_timestamp_and_network() {
    let config = TrainConfig::new("data", NetworkKind::ConvDetector);
    assert_eq!(config.run_name(1_700_000_000), "1700000000-conv-detector");
  }
}
