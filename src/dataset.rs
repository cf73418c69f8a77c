// 该文件是 Shanan （山南西风） 项目的一部分。
// src/dataset.rs - 检测数据集与训练/测试划分
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
use std::sync::Arc;

use image::RgbImage;
use rand::{rngs::StdRng, seq::SliceRandom};
use thiserror::Error;
use tracing::debug;

use crate::{
  annotation::{Annotation, AnnotationError, Target},
  labels::LabelSet,
  manifest::Manifest,
  transform::{Compose, Sample, get_transform},
};

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("清单引用的文件不存在: {0}")]
  MissingFile(PathBuf),
  #[error("图像 {path} 读取失败: {source}")]
  ImageError {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("标注 {path} 解析失败: {source}")]
  AnnotationError {
    path: PathBuf,
    source: AnnotationError,
  },
  #[error("索引越界: {index} >= {len}")]
  IndexOutOfRange { index: usize, len: usize },
  #[error("划分索引不是 0..{0} 的排列")]
  InvalidPermutation(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  pub image: PathBuf,
  pub annotation: PathBuf,
}

/// 清单中全部有效样本，训练与测试视图共享同一份记录
#[derive(Debug, Clone)]
pub struct DetectionDataset {
  records: Arc<[Record]>,
  labels: Arc<LabelSet>,
}

impl DetectionDataset {
  pub fn from_manifest(
    image_dir: &Path,
    annotation_dir: &Path,
    manifest: &Manifest,
    labels: LabelSet,
  ) -> Result<Self, DatasetError> {
    let mut records = Vec::with_capacity(manifest.len());
    for entry in manifest.valid_entries() {
      let record = Record {
        image: image_dir.join(&entry.image),
        annotation: annotation_dir.join(&entry.annotation),
      };
      for path in [&record.image, &record.annotation] {
        if !path.is_file() {
          return Err(DatasetError::MissingFile(path.clone()));
        }
      }
      records.push(record);
    }
    debug!(
      "清单 {} 中有效样本 {} 个",
      manifest.path().display(),
      records.len()
    );
    Ok(Self {
      records: records.into(),
      labels: Arc::new(labels),
    })
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  fn record(&self, index: usize) -> Result<&Record, DatasetError> {
    self.records.get(index).ok_or(DatasetError::IndexOutOfRange {
      index,
      len: self.records.len(),
    })
  }

  /// 读取原始图像与归一化目标
  pub fn load(&self, index: usize) -> Result<(RgbImage, Vec<Target>), DatasetError> {
    let record = self.record(index)?;
    let image = image::open(&record.image)
      .map_err(|source| DatasetError::ImageError {
        path: record.image.clone(),
        source,
      })?
      .to_rgb8();
    let annotation =
      Annotation::load(&record.annotation).map_err(|source| DatasetError::AnnotationError {
        path: record.annotation.clone(),
        source,
      })?;
    Ok((image, annotation.targets(&self.labels)))
  }
}

/// 一次随机排列得到的训练/测试下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSplit {
  pub train: Vec<usize>,
  pub test: Vec<usize>,
}

impl DatasetSplit {
  /// 测试集大小为 floor(fraction × n)，取排列末尾
  pub fn num_test(n: usize, test_fraction: f64) -> usize {
    ((n as f64) * test_fraction).floor().min(n as f64) as usize
  }

  /// 校验 `permutation` 恰好覆盖 0..n，再切出末尾的测试集
  pub fn from_permutation(
    permutation: Vec<usize>,
    test_fraction: f64,
  ) -> Result<Self, DatasetError> {
    let n = permutation.len();
    let mut seen = vec![false; n];
    for &idx in &permutation {
      if idx >= n || std::mem::replace(&mut seen[idx], true) {
        return Err(DatasetError::InvalidPermutation(n));
      }
    }
    let num_test = Self::num_test(n, test_fraction);
    let mut train = permutation;
    let test = train.split_off(n - num_test);
    Ok(Self { train, test })
  }

  pub fn random(n: usize, test_fraction: f64, rng: &mut StdRng) -> Result<Self, DatasetError> {
    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(rng);
    Self::from_permutation(permutation, test_fraction)
  }
}

/// 数据集的一个子集视图，附带自己的变换流水线
pub struct DatasetView {
  dataset: DetectionDataset,
  indices: Vec<usize>,
  transforms: Compose,
}

impl DatasetView {
  pub fn new(dataset: DetectionDataset, indices: Vec<usize>, transforms: Compose) -> Self {
    Self {
      dataset,
      indices,
      transforms,
    }
  }

  pub fn len(&self) -> usize {
    self.indices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.indices.is_empty()
  }

  pub fn indices(&self) -> &[usize] {
    &self.indices
  }

  pub fn get(&self, position: usize, rng: &mut StdRng) -> Result<Sample, DatasetError> {
    let index = *self
      .indices
      .get(position)
      .ok_or(DatasetError::IndexOutOfRange {
        index: position,
        len: self.indices.len(),
      })?;
    let (image, targets) = self.dataset.load(index)?;
    Ok(self.transforms.apply(&image, targets, rng))
  }

  /// 一轮遍历的访问顺序，批大小固定为 1
  pub fn epoch_order(&self, shuffle: bool, rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..self.indices.len()).collect();
    if shuffle {
      order.shuffle(rng);
    }
    order
  }
}

/// 同一份数据集、同一次排列切出训练视图与测试视图
pub fn assemble(
  dataset: &DetectionDataset,
  split: DatasetSplit,
  input_size: u32,
) -> (DatasetView, DatasetView) {
  let train = DatasetView::new(
    dataset.clone(),
    split.train,
    get_transform(true, input_size),
  );
  let test = DatasetView::new(dataset.clone(), split.test, get_transform(false, input_size));
  debug!(
    "训练变换 {} 步，测试变换 {} 步",
    train.transforms.stages(),
    test.transforms.stages()
  );
  (train, test)
}
