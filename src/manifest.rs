// 该文件是 Shanan （山南西风） 项目的一部分。
// src/manifest.rs - 数据清单
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

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::settings::{INVALID_ANNOTATION_FILE_IDENTIFIER, MANIFEST_FILE_TYPE};

#[derive(Error, Debug)]
pub enum ManifestError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("清单 {path} 解析失败: {source}")]
  ParseError {
    path: PathBuf,
    source: serde_json::Error,
  },
}

/// 清单中的一条图像与标注对应关系
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
  pub image: String,
  pub annotation: String,
}

impl ManifestEntry {
  pub fn is_valid(&self) -> bool {
    self.annotation != INVALID_ANNOTATION_FILE_IDENTIFIER
  }
}

#[derive(Debug, Clone)]
pub struct Manifest {
  path: PathBuf,
  entries: Vec<ManifestEntry>,
}

impl Manifest {
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read(path)?;
    let entries: Vec<ManifestEntry> =
      serde_json::from_slice(&content).map_err(|source| ManifestError::ParseError {
        path: path.to_path_buf(),
        source,
      })?;
    debug!("清单 {} 共 {} 条记录", path.display(), entries.len());
    Ok(Self {
      path: path.to_path_buf(),
      entries,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 按文件中的顺序返回有效条目
  pub fn valid_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
    self.entries.iter().filter(|entry| entry.is_valid())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// 文件名主干中第一段连续数字
fn embedded_number(stem: &str) -> Option<u64> {
  let start = stem.find(|c: char| c.is_ascii_digit())?;
  let digits: String = stem[start..]
    .chars()
    .take_while(|c| c.is_ascii_digit())
    .collect();
  digits.parse().ok()
}

/// 在 `dir` 中查找扩展名为 `file_type` 且内嵌编号最大的文件
pub fn highest_numbered_file(dir: &Path, file_type: &str) -> Option<PathBuf> {
  let entries = std::fs::read_dir(dir).ok()?;
  entries
    .filter_map(Result::ok)
    .map(|entry| entry.path())
    .filter(|path| path.is_file())
    .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(file_type))
    .filter_map(|path| {
      let number = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(embedded_number)?;
      Some((number, path))
    })
    .max_by(|(a, pa), (b, pb)| a.cmp(b).then_with(|| pa.cmp(pb)))
    .map(|(_, path)| path)
}

pub fn newest_manifest_path(manifest_dir: &Path) -> Option<PathBuf> {
  highest_numbered_file(manifest_dir, MANIFEST_FILE_TYPE)
}
