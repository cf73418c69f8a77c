// 该文件是 Shanan （山南西风） 项目的一部分。
// src/remote.rs - 对象存储同步与发布
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
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod memory_store;
mod mounted_bucket;

pub use self::memory_store::MemoryStore;
pub use self::mounted_bucket::MountedBucketStore;

#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("存储桶不存在或无访问权限: {0}")]
  BucketUnavailable(String),
  #[error("对象不存在: {bucket}/{key}")]
  ObjectNotFound { bucket: String, key: String },
  #[error("无效的对象键: {0}")]
  InvalidKey(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
  pub key: String,
  pub size: u64,
}

/// 远端对象存储
///
/// 键使用 `/` 分隔，`list_objects` 按前缀递归列出对象。
pub trait ObjectStore {
  fn bucket_exists(&self, bucket: &str) -> bool;
  fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError>;
  fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), RemoteError>;
  fn put_object(&self, bucket: &str, key: &str, src: &Path) -> Result<(), RemoteError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Box<S> {
  fn bucket_exists(&self, bucket: &str) -> bool {
    (**self).bucket_exists(bucket)
  }

  fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError> {
    (**self).list_objects(bucket, prefix)
  }

  fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), RemoteError> {
    (**self).get_object(bucket, key, dest)
  }

  fn put_object(&self, bucket: &str, key: &str, src: &Path) -> Result<(), RemoteError> {
    (**self).put_object(bucket, key, src)
  }
}

pub(crate) fn validate_key(key: &str) -> Result<(), RemoteError> {
  if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
    return Err(RemoteError::InvalidKey(key.to_string()));
  }
  Ok(())
}

/// 同步结果统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
  pub downloaded: usize,
  pub skipped: usize,
}

/// 将 `prefix/` 下扩展名为 `file_type` 的对象拉取到 `local_dir`
///
/// 本地已存在且大小一致的文件不会重复下载。
pub fn sync_down<S: ObjectStore + ?Sized>(
  store: &S,
  bucket: &str,
  prefix: &str,
  local_dir: &Path,
  file_type: &str,
) -> Result<SyncReport, RemoteError> {
  std::fs::create_dir_all(local_dir)?;

  let prefix = prefix.trim_end_matches('/');
  let suffix = format!(".{}", file_type);
  let mut report = SyncReport::default();

  for object in store.list_objects(bucket, prefix)? {
    if !object.key.ends_with(&suffix) {
      continue;
    }
    let relative = object
      .key
      .strip_prefix(prefix)
      .unwrap_or(&object.key)
      .trim_start_matches('/');
    validate_key(relative)?;
    let dest = local_dir.join(relative);

    if let Ok(meta) = std::fs::metadata(&dest)
      && meta.len() == object.size
    {
      report.skipped += 1;
      continue;
    }

    if let Some(parent) = dest.parent() {
      std::fs::create_dir_all(parent)?;
    }
    debug!("下载 {}/{} -> {}", bucket, object.key, dest.display());
    store.get_object(bucket, &object.key, &dest)?;
    report.downloaded += 1;
  }

  info!(
    "同步 {}/{} 完成: 下载 {} 个, 跳过 {} 个",
    bucket, prefix, report.downloaded, report.skipped
  );
  Ok(report)
}

/// 将本地文件上传到 `prefix/<文件名>`，返回成功上传的对象键
pub fn upload_files<S: ObjectStore + ?Sized>(
  store: &S,
  bucket: &str,
  files: &[PathBuf],
  prefix: &str,
) -> Result<Vec<String>, RemoteError> {
  let prefix = prefix.trim_end_matches('/');
  let mut keys = Vec::with_capacity(files.len());
  for file in files {
    let name = file
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| RemoteError::InvalidKey(file.display().to_string()))?;
    let key = if prefix.is_empty() {
      name.to_string()
    } else {
      format!("{}/{}", prefix, name)
    };
    store.put_object(bucket, &key, file)?;
    info!("已上传 {} -> {}/{}", file.display(), bucket, key);
    keys.push(key);
  }
  Ok(keys)
}

/// 根据地址选择的存储后端
pub enum StoreWrapper {
  MountedBucket(MountedBucketStore),
  Memory(MemoryStore),
}

impl FromUrl for StoreWrapper {
  type Error = RemoteError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      MountedBucketStore::SCHEME => Ok(StoreWrapper::MountedBucket(
        MountedBucketStore::from_url(url)?,
      )),
      MemoryStore::SCHEME => Ok(StoreWrapper::Memory(MemoryStore::from_url(url)?)),
      other => {
        warn!("不支持的对象存储地址: {}", url);
        Err(RemoteError::SchemeMismatch(other.to_string()))
      }
    }
  }
}

impl ObjectStore for StoreWrapper {
  fn bucket_exists(&self, bucket: &str) -> bool {
    match self {
      StoreWrapper::MountedBucket(store) => store.bucket_exists(bucket),
      StoreWrapper::Memory(store) => store.bucket_exists(bucket),
    }
  }

  fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError> {
    match self {
      StoreWrapper::MountedBucket(store) => store.list_objects(bucket, prefix),
      StoreWrapper::Memory(store) => store.list_objects(bucket, prefix),
    }
  }

  fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), RemoteError> {
    match self {
      StoreWrapper::MountedBucket(store) => store.get_object(bucket, key, dest),
      StoreWrapper::Memory(store) => store.get_object(bucket, key, dest),
    }
  }

  fn put_object(&self, bucket: &str, key: &str, src: &Path) -> Result<(), RemoteError> {
    match self {
      StoreWrapper::MountedBucket(store) => store.put_object(bucket, key, src),
      StoreWrapper::Memory(store) => store.put_object(bucket, key, src),
    }
  }
}
