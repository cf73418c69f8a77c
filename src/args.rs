// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use crate::{
  config::{Hyperparameters, TrainConfig},
  model::NetworkKind,
  settings::{
    DEFAULT_INPUT_SIZE, DEFAULT_LOCAL_DATA_DIR, DEFAULT_MAX_BOXES, DEFAULT_NUM_EPOCHS,
    DEFAULT_S3_DATA_DIR, DEFAULT_S3_ENDPOINT,
  },
};

/// Shanan 检测模型训练参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 本地数据目录
  #[arg(long, default_value = DEFAULT_LOCAL_DATA_DIR, value_name = "DIR")]
  pub local_data_dir: PathBuf,

  /// 用于拉取图像与上传模型的 S3 存储桶，不指定则只使用本地数据
  #[arg(long, value_name = "BUCKET")]
  pub s3_bucket_name: Option<String>,

  /// 存储桶内数据对象的前缀
  #[arg(long, default_value = DEFAULT_S3_DATA_DIR, value_name = "PREFIX")]
  pub s3_data_dir: String,

  /// 对象存储访问地址
  /// 不直接访问 S3 协议，S3 存储桶需先挂载到本地目录（例如 s3fs）
  /// 支持格式:
  /// - 挂载目录: file:///mnt/s3 （存储桶位于 /mnt/s3/<BUCKET>）
  /// - 内存存储: memory://
  #[arg(long, default_value = DEFAULT_S3_ENDPOINT, value_name = "URL")]
  pub s3_endpoint: Url,

  /// 目标检测网络
  #[arg(long, value_enum, default_value_t = NetworkKind::ConvDetector)]
  pub network: NetworkKind,

  /// 训练轮数
  #[arg(long, default_value_t = DEFAULT_NUM_EPOCHS, value_name = "COUNT")]
  pub num_epochs: usize,

  /// 数据集划分与数据增强使用的随机种子
  #[arg(long, value_name = "SEED")]
  pub seed: Option<u64>,

  /// 绘制评估曲线标题与图例所用的 TTF 字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 网络输入边长（像素）
  #[arg(long, default_value_t = DEFAULT_INPUT_SIZE, value_name = "PIXELS")]
  pub input_size: u32,

  /// 每张图像参与训练的最大目标数
  #[arg(long, default_value_t = DEFAULT_MAX_BOXES, value_name = "COUNT")]
  pub max_boxes: usize,
}

impl Args {
  pub fn into_config(self) -> TrainConfig {
    TrainConfig {
      local_data_dir: self.local_data_dir,
      s3_bucket_name: self.s3_bucket_name,
      s3_data_dir: self.s3_data_dir,
      network: self.network,
      num_epochs: self.num_epochs,
      seed: self.seed,
      font: self.font,
      input_size: self.input_size.max(8),
      max_boxes: self.max_boxes.max(1),
      hyper: Hyperparameters::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn endpoint_help_mentions_mounted_bucket() {
    let help = Args::command().render_long_help().to_string();
    assert!(help.contains("S3 存储桶需先挂载到本地目录"));
    assert!(help.contains("file:///mnt/s3"));
  }

  #[test]
  fn defaults_match_settings() {
    let args = Args::parse_from(["shanan-train"]);
    let config = args.into_config();
    assert_eq!(config.local_data_dir, PathBuf::from(DEFAULT_LOCAL_DATA_DIR));
    assert_eq!(config.s3_bucket_name, None);
    assert_eq!(config.s3_data_dir, DEFAULT_S3_DATA_DIR);
    assert_eq!(config.network, NetworkKind::ConvDetector);
    assert_eq!(config.num_epochs, 10);
    assert!(!config.remote_requested());
  }

  #[test]
  fn parses_network_and_bucket() {
    let args = Args::parse_from([
      "shanan-train",
      "--network",
      "mlp-detector",
      "--s3-bucket-name",
      "boxes",
      "--num-epochs",
      "3",
    ]);
    assert_eq!(args.network, NetworkKind::MlpDetector);
    let config = args.into_config();
    assert_eq!(config.s3_bucket_name.as_deref(), Some("boxes"));
    assert_eq!(config.num_epochs, 3);
    assert!(config.remote_requested());
  }

  #[test]
  fn rejects_unknown_network() {
    assert!(Args::try_parse_from(["shanan-train", "--network", "yolo"]).is_err());
  }
}
