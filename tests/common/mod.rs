// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 集成测试的合成数据集
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

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use shanan_train::{config::TrainConfig, model::NetworkKind};

pub const LABELS: &str = "cat\ndog\n";

pub fn annotation_xml(width: u32, height: u32, objects: &[(&str, [u32; 4])]) -> String {
  let mut xml = format!(
    "<annotation><size><width>{width}</width><height>{height}</height><depth>3</depth></size>"
  );
  for (name, [x0, y0, x1, y1]) in objects {
    xml.push_str(&format!(
      "<object><name>{name}</name><bndbox><xmin>{x0}</xmin><ymin>{y0}</ymin><xmax>{x1}</xmax><ymax>{y1}</ymax></bndbox></object>"
    ));
  }
  xml.push_str("</annotation>");
  xml
}

fn image(i: usize) -> RgbImage {
  RgbImage::from_fn(32, 24, |x, y| {
    let inside = (8..20).contains(&x) && (4..16).contains(&y);
    if inside {
      Rgb([200, (i * 20) as u8, 30])
    } else {
      Rgb([10, 10, 10])
    }
  })
}

/// 在 `root` 下写出 images/、annotations/、manifests/，返回清单中的样本数
///
/// 额外写入一条标注为 "invalid" 的记录，应当被跳过。
pub fn write_dataset(root: &Path, count: usize, manifest_name: &str) -> usize {
  let images = root.join("images");
  let annotations = root.join("annotations");
  let manifests = root.join("manifests");
  for dir in [&images, &annotations, &manifests] {
    std::fs::create_dir_all(dir).unwrap();
  }

  let mut entries = Vec::new();
  for i in 0..count {
    let image_name = format!("{i}.jpg");
    let annotation_name = format!("{i}.xml");
    image(i).save(images.join(&image_name)).unwrap();
    let label = if i % 2 == 0 { "cat" } else { "dog" };
    std::fs::write(
      annotations.join(&annotation_name),
      annotation_xml(32, 24, &[(label, [8, 4, 20, 16])]),
    )
    .unwrap();
    entries.push(serde_json::json!({ "image": image_name, "annotation": annotation_name }));
  }
  entries.push(serde_json::json!({ "image": "rejected.jpg", "annotation": "invalid" }));
  std::fs::write(
    manifests.join(manifest_name),
    serde_json::to_string_pretty(&entries).unwrap(),
  )
  .unwrap();
  count
}

pub fn write_labels(root: &Path, content: &str) -> PathBuf {
  std::fs::create_dir_all(root).unwrap();
  let path = root.join("labels.txt");
  std::fs::write(&path, content).unwrap();
  path
}

/// 小输入尺寸、少轮数的配置，保证测试很快结束
pub fn quick_config(root: &Path, num_epochs: usize) -> TrainConfig {
  let mut config = TrainConfig::new(root, NetworkKind::MlpDetector)
    .with_num_epochs(num_epochs)
    .with_seed(7)
    .with_input_size(16);
  config.max_boxes = 2;
  config
}
