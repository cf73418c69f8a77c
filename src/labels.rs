// 该文件是 Shanan （山南西风） 项目的一部分。
// src/labels.rs - 类别标签
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

use thiserror::Error;

use crate::settings::BACKGROUND_LABEL;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("缺少标签文件 {0}")]
  Missing(PathBuf),
  #[error("标签文件 {0} 中没有类别")]
  Empty(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 有序类别标签，下标 0 固定为背景类
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  labels: Vec<String>,
}

impl LabelSet {
  /// 每行一个类别，行号即类别下标，中间的空行同样占一个下标
  ///
  /// 没有任何非空行时视为空文件。
  pub fn parse(content: &str) -> Option<Self> {
    if content.lines().all(|line| line.trim().is_empty()) {
      return None;
    }
    let categories: Vec<String> = content.lines().map(str::to_string).collect();
    let mut labels = Vec::with_capacity(categories.len() + 1);
    labels.push(BACKGROUND_LABEL.to_string());
    labels.extend(categories);
    Some(Self { labels })
  }

  pub fn load(path: &Path) -> Result<Self, LabelError> {
    if !path.is_file() {
      return Err(LabelError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Self::parse(&content).ok_or_else(|| LabelError::Empty(path.to_path_buf()))
  }

  /// 含背景类在内的类别数
  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self
      .labels
      .iter()
      .skip(1)
      .position(|label| label == name)
      .map(|idx| idx + 1)
  }

  pub fn name(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn as_slice(&self) -> &[String] {
    &self.labels
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn background_is_prepended() {
    let labels = LabelSet::parse("cat\ndog\n").unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.name(0), Some(BACKGROUND_LABEL));
    assert_eq!(labels.index_of("dog"), Some(2));
    assert_eq!(labels.index_of(BACKGROUND_LABEL), None);
  }

  #[test]
  fn interior_blank_line_keeps_its_index() {
    let labels = LabelSet::parse("cat\n\ndog\n").unwrap();
    assert_eq!(labels.len(), 4);
    assert_eq!(labels.as_slice(), &["background", "cat", "", "dog"]);
    assert_eq!(labels.index_of("cat"), Some(1));
    assert_eq!(labels.index_of("dog"), Some(3));
  }

  #[test]
  fn whitespace_only_content_is_empty() {
    assert!(LabelSet::parse("").is_none());
    assert!(LabelSet::parse("\n  \n\t\n").is_none());
  }

  #[test]
  fn empty_file_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("labels.txt");
    std::fs::write(&path, "\n\n").unwrap();
    assert!(matches!(LabelSet::load(&path), Err(LabelError::Empty(_))));
  }

  #[test]
  fn absent_file_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(matches!(
      LabelSet::load(&tmp.path().join("labels.txt")),
      Err(LabelError::Missing(_))
    ));
  }
}
