// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 训练运行的端到端测试
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

mod common;

use std::cell::Cell;
use std::path::Path;

use shanan_train::{
  dataset::DatasetError,
  model::NetworkKind,
  pipeline::{AbortReason, RunOutcome, run_at},
  remote::{MemoryStore, ObjectInfo, ObjectStore, RemoteError},
};

use common::{LABELS, quick_config, write_dataset, write_labels};

const START: i64 = 1_700_000_000;

/// 记录调用次数的存储，用于确认没有发生远端访问
#[derive(Default)]
struct CountingStore {
  calls: Cell<usize>,
}

impl ObjectStore for CountingStore {
  fn bucket_exists(&self, _bucket: &str) -> bool {
    self.calls.set(self.calls.get() + 1);
    true
  }

  fn list_objects(&self, _bucket: &str, _prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError> {
    self.calls.set(self.calls.get() + 1);
    Ok(Vec::new())
  }

  fn get_object(&self, _bucket: &str, _key: &str, _dest: &Path) -> Result<(), RemoteError> {
    self.calls.set(self.calls.get() + 1);
    Ok(())
  }

  fn put_object(&self, _bucket: &str, _key: &str, _src: &Path) -> Result<(), RemoteError> {
    self.calls.set(self.calls.get() + 1);
    Ok(())
  }
}

/// 按配置在同步或上传阶段返回错误的存储
#[derive(Default)]
struct FailingStore {
  fail_sync: bool,
  fail_put: bool,
  puts: Cell<usize>,
}

impl FailingStore {
  fn denied(bucket: &str) -> RemoteError {
    RemoteError::BucketUnavailable(bucket.to_string())
  }
}

impl ObjectStore for FailingStore {
  fn bucket_exists(&self, _bucket: &str) -> bool {
    true
  }

  fn list_objects(&self, bucket: &str, _prefix: &str) -> Result<Vec<ObjectInfo>, RemoteError> {
    if self.fail_sync {
      return Err(Self::denied(bucket));
    }
    Ok(Vec::new())
  }

  fn get_object(&self, bucket: &str, _key: &str, _dest: &Path) -> Result<(), RemoteError> {
    Err(Self::denied(bucket))
  }

  fn put_object(&self, bucket: &str, _key: &str, _src: &Path) -> Result<(), RemoteError> {
    self.puts.set(self.puts.get() + 1);
    if self.fail_put {
      return Err(Self::denied(bucket));
    }
    Ok(())
  }
}

fn upload_tree(store: &MemoryStore, bucket: &str, local: &Path, prefix: &str) {
  for sub in ["images", "annotations", "manifests"] {
    for entry in std::fs::read_dir(local.join(sub)).unwrap() {
      let path = entry.unwrap().path();
      let name = path.file_name().unwrap().to_str().unwrap().to_string();
      store.insert(
        bucket,
        &format!("{prefix}/{sub}/{name}"),
        std::fs::read(&path).unwrap(),
      );
    }
  }
}

#[test]
fn local_run_writes_named_artifacts() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 6, "manifest_1.json");
  let config = quick_config(dir.path(), 2);

  let RunOutcome::Completed(report) = run_at(&config, None, START).unwrap() else {
    panic!("run should complete");
  };
  assert_eq!(report.artifacts.run_name, "1700000000-mlp-detector");
  assert_eq!(
    report.artifacts.weights,
    dir.path().join("models/1700000000-mlp-detector.bin")
  );
  assert_eq!(
    report.artifacts.plot,
    dir.path().join("logs/1700000000-mlp-detector.jpg")
  );
  assert!(report.artifacts.weights.is_file());
  assert!(report.artifacts.plot.is_file());
  assert_eq!(report.history.len(), 2);
  assert_eq!(report.history.recall().len(), 2);
  assert_eq!(report.history.losses().len(), 2);
  assert!(report.history.losses().iter().all(|loss| loss.is_finite()));
  assert_eq!((report.num_train, report.num_test), (5, 1));
  assert!(report.uploaded.is_empty());
}

#[test]
fn newest_manifest_is_used() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 10, "manifest_10.json");
  write_dataset(dir.path(), 5, "manifest_2.json");
  let config = quick_config(dir.path(), 1);

  let RunOutcome::Completed(report) = run_at(&config, None, START).unwrap() else {
    panic!("run should complete");
  };
  assert_eq!(report.num_train + report.num_test, 10);
  assert_eq!(report.num_test, 2);
}

#[test]
fn tiny_dataset_has_empty_test_split() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 3, "manifest_1.json");
  let config = quick_config(dir.path(), 1);

  let RunOutcome::Completed(report) = run_at(&config, None, START).unwrap() else {
    panic!("run should complete");
  };
  assert_eq!((report.num_train, report.num_test), (3, 0));
  assert_eq!(report.history.precision(), &[-1.0]);
}

#[test]
fn missing_labels_abort_without_artifacts() {
  let dir = tempfile::tempdir().unwrap();
  write_dataset(dir.path(), 6, "manifest_1.json");
  let config = quick_config(dir.path(), 1);

  let outcome = run_at(&config, None, START).unwrap();
  assert!(matches!(
    outcome,
    RunOutcome::Aborted(AbortReason::MissingLabels(_))
  ));
  assert!(!dir.path().join("models").exists());
  assert!(!dir.path().join("logs").exists());
}

#[test]
fn blank_labels_abort_without_artifacts() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), "\n  \n");
  write_dataset(dir.path(), 6, "manifest_1.json");
  let config = quick_config(dir.path(), 1);

  let outcome = run_at(&config, None, START).unwrap();
  assert!(matches!(
    outcome,
    RunOutcome::Aborted(AbortReason::EmptyLabels(_))
  ));
  assert!(!dir.path().join("models").exists());
}

#[test]
fn missing_manifest_aborts() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  let config = quick_config(dir.path(), 1);

  let outcome = run_at(&config, None, START).unwrap();
  assert!(matches!(
    outcome,
    RunOutcome::Aborted(AbortReason::MissingManifest(_))
  ));
  assert!(!dir.path().join("models").exists());
}

#[test]
fn no_bucket_means_no_remote_calls() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 5, "manifest_1.json");
  let config = quick_config(dir.path(), 1);
  let store = CountingStore::default();

  let outcome = run_at(&config, Some(&store), START).unwrap();
  assert!(matches!(outcome, RunOutcome::Completed(_)));
  assert_eq!(store.calls.get(), 0);
}

#[test]
fn remote_data_is_pulled_and_artifacts_published() {
  let staging = tempfile::tempdir().unwrap();
  write_dataset(staging.path(), 6, "manifest_3.json");
  let store = MemoryStore::default();
  store.create_bucket("boxes");
  upload_tree(&store, "boxes", staging.path(), "data");

  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  let mut config = quick_config(dir.path(), 1).with_bucket("boxes");
  config.network = NetworkKind::ConvDetector;

  let RunOutcome::Completed(report) = run_at(&config, Some(&store), START).unwrap() else {
    panic!("run should complete");
  };
  assert!(dir.path().join("images/0.jpg").is_file());
  assert!(dir.path().join("manifests/manifest_3.json").is_file());

  let keys = store.keys("boxes");
  assert!(keys.contains(&"data/models/1700000000-conv-detector.bin".to_string()));
  assert!(keys.contains(&"data/logs/1700000000-conv-detector.jpg".to_string()));
  assert_eq!(report.uploaded.len(), 2);
}

#[test]
fn inaccessible_bucket_falls_back_to_local_data() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 5, "manifest_1.json");
  let config = quick_config(dir.path(), 1).with_bucket("missing");
  let store = MemoryStore::default();

  let RunOutcome::Completed(report) = run_at(&config, Some(&store), START).unwrap() else {
    panic!("run should complete");
  };
  assert!(report.uploaded.is_empty());
  assert!(store.keys("missing").is_empty());
}

#[test]
fn failed_sync_switches_to_local_only() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 5, "manifest_1.json");
  let config = quick_config(dir.path(), 1).with_bucket("boxes");
  let store = FailingStore {
    fail_sync: true,
    ..Default::default()
  };

  let RunOutcome::Completed(report) = run_at(&config, Some(&store), START).unwrap() else {
    panic!("run should complete");
  };
  assert_eq!(report.num_train + report.num_test, 5);
  assert!(report.uploaded.is_empty());
  assert_eq!(store.puts.get(), 0);
}

#[test]
fn failed_upload_keeps_local_artifacts() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 5, "manifest_1.json");
  let config = quick_config(dir.path(), 1).with_bucket("boxes");
  let store = FailingStore {
    fail_put: true,
    ..Default::default()
  };

  let RunOutcome::Completed(report) = run_at(&config, Some(&store), START).unwrap() else {
    panic!("run should complete");
  };
  assert!(report.uploaded.is_empty());
  assert_eq!(store.puts.get(), 2);
  assert!(report.artifacts.weights.is_file());
  assert!(report.artifacts.plot.is_file());
}

#[test]
fn manifest_entry_without_image_fails_the_run() {
  let dir = tempfile::tempdir().unwrap();
  write_labels(dir.path(), LABELS);
  write_dataset(dir.path(), 5, "manifest_1.json");
  let missing = dir.path().join("images/2.jpg");
  std::fs::remove_file(&missing).unwrap();
  let config = quick_config(dir.path(), 1);

  let err = run_at(&config, None, START).unwrap_err();
  match err.downcast_ref::<DatasetError>() {
    Some(DatasetError::MissingFile(path)) => assert_eq!(path, &missing),
    other => panic!("unexpected error: {other:?}"),
  }
  assert!(!dir.path().join("models").exists());
}
