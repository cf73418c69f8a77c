// 该文件是 Shanan （山南西风） 项目的一部分。
// src/remote/mounted_bucket.rs - 以目录形式挂载的存储桶
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

use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  remote::{ObjectInfo, ObjectStore, RemoteError, validate_key},
};

/// 挂载根目录下的每个子目录视为一个存储桶，对象键即相对路径
#[derive(Debug, Clone)]
pub struct MountedBucketStore {
  root: PathBuf,
}

impl FromUrlWithScheme for MountedBucketStore {
  const SCHEME: &'static str = "file";
}

impl FromUrl for MountedBucketStore {
  type Error = RemoteError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RemoteError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(MountedBucketStore::new(url.path()))
  }
}

impl MountedBucketStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, RemoteError> {
    if bucket.is_empty() || bucket.contains('/') || bucket == ".." || bucket == "." {
      return Err(RemoteError::BucketUnavailable(bucket.to_string()));
    }
    Ok(self.root.join(bucket))
  }

  fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, RemoteError> {
    validate_key(key)?;
    Ok(self.bucket_dir(bucket)?.join(key))
  }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<ObjectInfo>) -> std::io::Result<()> {
  for entry in std::fs::read_dir(dir)? {
    let entry = entry?;
    let path = entry.path();
    let file_type = entry.file_type()?;
    if file_type.is_dir() {
      walk(base, &path, out)?;
    } else if file_type.is_file() {
      let Ok(relative) = path.strip_prefix(base) else {
        continue;
      };
      let key = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
      out.push(ObjectInfo {
        key,
        size: entry.metadata()?.len(),
      });
    }
  }
  Ok(())
}

impl ObjectStore for MountedBucketStore {
  fn bucket_exists(&self, bucket: &str) -> bool {
    self
      .bucket_dir(bucket)
      .map(|dir| dir.is_dir())
      .unwrap_or(false)
  }

  fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError> {
    let bucket_dir = self.bucket_dir(bucket)?;
    if !bucket_dir.is_dir() {
      return Err(RemoteError::BucketUnavailable(bucket.to_string()));
    }
    let prefix = prefix.trim_end_matches('/');
    let start = if prefix.is_empty() {
      bucket_dir.clone()
    } else {
      validate_key(prefix)?;
      bucket_dir.join(prefix)
    };
    let mut objects = Vec::new();
    if start.is_dir() {
      walk(&bucket_dir, &start, &mut objects)?;
    }
    objects.sort_by(|a, b| a.key.cmp(&b.key));
    debug!("列出 {}/{}: {} 个对象", bucket, prefix, objects.len());
    Ok(objects)
  }

  fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), RemoteError> {
    let path = self.object_path(bucket, key)?;
    if !path.is_file() {
      return Err(RemoteError::ObjectNotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
      });
    }
    std::fs::copy(&path, dest)?;
    Ok(())
  }

  fn put_object(&self, bucket: &str, key: &str, src: &Path) -> Result<(), RemoteError> {
    if !self.bucket_exists(bucket) {
      return Err(RemoteError::BucketUnavailable(bucket.to_string()));
    }
    let path = self.object_path(bucket, key)?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, &path)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bucket_is_a_directory_under_root() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("boxes/data/images")).unwrap();
    std::fs::write(tmp.path().join("boxes/data/images/a.jpg"), b"abc").unwrap();

    let store = MountedBucketStore::new(tmp.path());
    assert!(store.bucket_exists("boxes"));
    assert!(!store.bucket_exists("missing"));
    assert!(!store.bucket_exists("../boxes"));

    let objects = store.list_objects("boxes", "data/images").unwrap();
    assert_eq!(
      objects,
      vec![ObjectInfo {
        key: "data/images/a.jpg".into(),
        size: 3
      }]
    );
  }

  #[test]
  fn missing_prefix_lists_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("boxes")).unwrap();
    let store = MountedBucketStore::new(tmp.path());
    assert!(store.list_objects("boxes", "data/manifests").unwrap().is_empty());
  }

  #[test]
  fn put_then_get_round_trips_through_directory() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("boxes")).unwrap();
    let store = MountedBucketStore::new(tmp.path());

    let src = tmp.path().join("plot.jpg");
    std::fs::write(&src, b"jpeg").unwrap();
    store.put_object("boxes", "data/logs/plot.jpg", &src).unwrap();
    assert!(tmp.path().join("boxes/data/logs/plot.jpg").is_file());

    let dest = tmp.path().join("copy.jpg");
    store.get_object("boxes", "data/logs/plot.jpg", &dest).unwrap();
    assert_eq!(std::fs::read(dest).unwrap(), b"jpeg");
  }
}
