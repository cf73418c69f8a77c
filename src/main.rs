// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 训练程序入口
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use shanan_train::{
  FromUrl,
  args::Args,
  pipeline::{self, RunOutcome},
  remote::{ObjectStore, StoreWrapper},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("本地数据目录: {}", args.local_data_dir.display());
  info!("检测网络: {}", args.network);
  info!("训练轮数: {}", args.num_epochs);

  let store = match &args.s3_bucket_name {
    Some(bucket) => {
      info!("存储桶: {} ({})", bucket, args.s3_endpoint);
      match StoreWrapper::from_url(&args.s3_endpoint) {
        Ok(store) => Some(store),
        Err(e) => {
          warn!("无法打开对象存储 {}: {}", args.s3_endpoint, e);
          None
        }
      }
    }
    None => None,
  };

  let config = args.into_config();
  let store = store.as_ref().map(|s| s as &dyn ObjectStore);
  match pipeline::run(&config, store)? {
    RunOutcome::Completed(report) => {
      info!("模型权重: {}", report.artifacts.weights.display());
      info!("评估图表: {}", report.artifacts.plot.display());
    }
    RunOutcome::Aborted(reason) => {
      warn!("训练未执行: {:?}", reason);
    }
  }

  Ok(())
}
