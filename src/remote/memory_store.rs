// 该文件是 Shanan （山南西风） 项目的一部分。
// src/remote/memory_store.rs - 内存对象存储
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

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  remote::{ObjectInfo, ObjectStore, RemoteError, validate_key},
};

type Buckets = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// 进程内对象存储，克隆后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  buckets: Arc<Mutex<Buckets>>,
}

impl FromUrlWithScheme for MemoryStore {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemoryStore {
  type Error = RemoteError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RemoteError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(MemoryStore::default())
  }
}

impl MemoryStore {
  fn buckets(&self) -> MutexGuard<'_, Buckets> {
    self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn create_bucket(&self, bucket: &str) {
    self.buckets().entry(bucket.to_string()).or_default();
  }

  pub fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
    self
      .buckets()
      .entry(bucket.to_string())
      .or_default()
      .insert(key.to_string(), data);
  }

  pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
    self.buckets().get(bucket)?.get(key).cloned()
  }

  pub fn keys(&self, bucket: &str) -> Vec<String> {
    self
      .buckets()
      .get(bucket)
      .map(|objects| objects.keys().cloned().collect())
      .unwrap_or_default()
  }
}

impl ObjectStore for MemoryStore {
  fn bucket_exists(&self, bucket: &str) -> bool {
    self.buckets().contains_key(bucket)
  }

  fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError> {
    let buckets = self.buckets();
    let objects = buckets
      .get(bucket)
      .ok_or_else(|| RemoteError::BucketUnavailable(bucket.to_string()))?;
    let dir_prefix = if prefix.is_empty() {
      String::new()
    } else {
      format!("{}/", prefix.trim_end_matches('/'))
    };
    Ok(
      objects
        .iter()
        .filter(|(key, _)| key.starts_with(&dir_prefix))
        .map(|(key, data)| ObjectInfo {
          key: key.clone(),
          size: data.len() as u64,
        })
        .collect(),
    )
  }

  fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), RemoteError> {
    let data = self
      .object(bucket, key)
      .ok_or_else(|| RemoteError::ObjectNotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
      })?;
    std::fs::write(dest, data)?;
    Ok(())
  }

  fn put_object(&self, bucket: &str, key: &str, src: &Path) -> Result<(), RemoteError> {
    validate_key(key)?;
    if !self.bucket_exists(bucket) {
      return Err(RemoteError::BucketUnavailable(bucket.to_string()));
    }
    let data = std::fs::read(src)?;
    self.insert(bucket, key, data);
    Ok(())
  }
}
