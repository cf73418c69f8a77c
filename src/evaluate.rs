// 该文件是 Shanan （山南西风） 项目的一部分。
// src/evaluate.rs - COCO 风格的边框检测指标
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

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{
  annotation::Target,
  model::{DetectResult, postprocess::iou_xyxy},
};

pub const NUM_STATS: usize = 12;
const NUM_IOU_THRESHOLDS: usize = 10;
const NUM_RECALL_POINTS: usize = 101;
const MAX_DETS: [usize; 3] = [1, 10, 100];

fn iou_threshold(index: usize) -> f32 {
  0.5 + 0.05 * index as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AreaRange {
  All,
  Small,
  Medium,
  Large,
}

impl AreaRange {
  pub const ALL: [AreaRange; 4] = [
    AreaRange::All,
    AreaRange::Small,
    AreaRange::Medium,
    AreaRange::Large,
  ];

  /// 像素面积区间（闭区间）
  fn bounds(&self) -> (f32, f32) {
    match self {
      AreaRange::All => (0.0, 1e10),
      AreaRange::Small => (0.0, 32.0 * 32.0),
      AreaRange::Medium => (32.0 * 32.0, 96.0 * 96.0),
      AreaRange::Large => (96.0 * 96.0, 1e10),
    }
  }

  fn excludes(&self, area: f32) -> bool {
    let (lo, hi) = self.bounds();
    area < lo || area > hi
  }

  fn name(&self) -> &'static str {
    match self {
      AreaRange::All => "all",
      AreaRange::Small => "small",
      AreaRange::Medium => "medium",
      AreaRange::Large => "large",
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct Instance {
  label: usize,
  bbox: [f32; 4],
  area: f32,
  score: f32,
}

impl Instance {
  fn in_pixels(label: usize, bbox: [f32; 4], score: f32, (w, h): (u32, u32)) -> Self {
    let (w, h) = (w as f32, h as f32);
    let bbox = [bbox[0] * w, bbox[1] * h, bbox[2] * w, bbox[3] * h];
    let area = (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0);
    Self {
      label,
      bbox,
      area,
      score,
    }
  }
}

#[derive(Debug, Default)]
struct ImageRecord {
  ground_truth: Vec<Instance>,
  detections: Vec<Instance>,
}

/// 单张图像、单个类别、单个面积区间的匹配结果
struct ImageMatch {
  scores: Vec<f32>,
  /// [T][D]
  matched: Vec<Vec<bool>>,
  ignored: Vec<Vec<bool>>,
  num_positive: usize,
}

/// 某类别在某 (面积, maxDets) 组合下的精度/召回
struct Accumulated {
  precision: [[f64; NUM_RECALL_POINTS]; NUM_IOU_THRESHOLDS],
  recall: [f64; NUM_IOU_THRESHOLDS],
}

/// 12 项统计值，-1 表示没有可计算的真值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CocoStats(pub [f64; NUM_STATS]);

impl CocoStats {
  pub fn empty() -> Self {
    Self([-1.0; NUM_STATS])
  }

  pub fn get(&self, index: usize) -> Option<f64> {
    self.0.get(index).copied()
  }
}

const STAT_LAYOUT: [(bool, Option<usize>, AreaRange, usize); NUM_STATS] = [
  (true, None, AreaRange::All, 100),
  (true, Some(0), AreaRange::All, 100),
  (true, Some(5), AreaRange::All, 100),
  (true, None, AreaRange::Small, 100),
  (true, None, AreaRange::Medium, 100),
  (true, None, AreaRange::Large, 100),
  (false, None, AreaRange::All, 1),
  (false, None, AreaRange::All, 10),
  (false, None, AreaRange::All, 100),
  (false, None, AreaRange::Small, 100),
  (false, None, AreaRange::Medium, 100),
  (false, None, AreaRange::Large, 100),
];

impl fmt::Display for CocoStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for ((ap, iou, area, max_dets), value) in STAT_LAYOUT.iter().zip(self.0.iter()) {
      let (title, short) = if *ap {
        ("Average Precision", "(AP)")
      } else {
        ("Average Recall", "(AR)")
      };
      let iou = match iou {
        Some(t) => format!("{:.2}", iou_threshold(*t)),
        None => "0.50:0.95".to_string(),
      };
      writeln!(
        f,
        " {title:<18} {short} @[ IoU={iou:<9} | area={:>6} | maxDets={max_dets:>3} ] = {value:.3}",
        area.name()
      )?;
    }
    Ok(())
  }
}

/// 逐图像收集真值与检测结果，最后一次性汇总
#[derive(Debug, Default)]
pub struct CocoEvaluator {
  images: Vec<ImageRecord>,
}

impl CocoEvaluator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn num_images(&self) -> usize {
    self.images.len()
  }

  /// `image_size` 为原图宽高，归一化坐标会换算为像素以划分面积区间
  pub fn add_image(
    &mut self,
    image_size: (u32, u32),
    targets: &[Target],
    detections: &DetectResult,
  ) {
    let ground_truth = targets
      .iter()
      .map(|t| Instance::in_pixels(t.label, t.bbox, 1.0, image_size))
      .collect();
    let detections = detections
      .items
      .iter()
      .map(|d| Instance::in_pixels(d.label, d.bbox, d.score, image_size))
      .collect();
    self.images.push(ImageRecord {
      ground_truth,
      detections,
    });
  }

  fn match_image(record: &ImageRecord, label: usize, area: AreaRange) -> Option<ImageMatch> {
    let mut gts: Vec<(Instance, bool)> = record
      .ground_truth
      .iter()
      .filter(|g| g.label == label)
      .map(|g| (*g, area.excludes(g.area)))
      .collect();
    let mut dts: Vec<Instance> = record
      .detections
      .iter()
      .filter(|d| d.label == label)
      .copied()
      .collect();
    if gts.is_empty() && dts.is_empty() {
      return None;
    }
    // 未忽略的真值排在前面
    gts.sort_by_key(|(_, ignored)| *ignored);
    dts.sort_by(|a, b| b.score.total_cmp(&a.score));
    dts.truncate(MAX_DETS[MAX_DETS.len() - 1]);

    let mut matched = vec![vec![false; dts.len()]; NUM_IOU_THRESHOLDS];
    let mut ignored = vec![vec![false; dts.len()]; NUM_IOU_THRESHOLDS];
    for t in 0..NUM_IOU_THRESHOLDS {
      let mut gt_taken = vec![false; gts.len()];
      for (d, dt) in dts.iter().enumerate() {
        let mut best_iou = iou_threshold(t).min(1.0 - 1e-10);
        let mut best: Option<usize> = None;
        for (g, (gt, gt_ignored)) in gts.iter().enumerate() {
          if gt_taken[g] {
            continue;
          }
          if let Some(m) = best
            && !gts[m].1
            && *gt_ignored
          {
            break;
          }
          let iou = iou_xyxy(dt.bbox, gt.bbox);
          if iou < best_iou {
            continue;
          }
          best_iou = iou;
          best = Some(g);
        }
        match best {
          Some(m) => {
            gt_taken[m] = true;
            matched[t][d] = true;
            ignored[t][d] = gts[m].1;
          }
          None => ignored[t][d] = area.excludes(dt.area),
        }
      }
    }

    Some(ImageMatch {
      scores: dts.iter().map(|d| d.score).collect(),
      matched,
      ignored,
      num_positive: gts.iter().filter(|(_, ignored)| !ignored).count(),
    })
  }

  fn accumulate(matches: &[ImageMatch], max_dets: usize) -> Option<Accumulated> {
    let num_positive: usize = matches.iter().map(|m| m.num_positive).sum();
    if num_positive == 0 {
      return None;
    }

    // (score, image, detection)
    let mut order: Vec<(f32, usize, usize)> = matches
      .iter()
      .enumerate()
      .flat_map(|(i, m)| {
        m.scores
          .iter()
          .take(max_dets)
          .enumerate()
          .map(move |(d, s)| (*s, i, d))
      })
      .collect();
    order.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut acc = Accumulated {
      precision: [[0.0; NUM_RECALL_POINTS]; NUM_IOU_THRESHOLDS],
      recall: [0.0; NUM_IOU_THRESHOLDS],
    };
    for t in 0..NUM_IOU_THRESHOLDS {
      let mut tp = 0.0f64;
      let mut fp = 0.0f64;
      let mut rc = Vec::with_capacity(order.len());
      let mut pr = Vec::with_capacity(order.len());
      for &(_, i, d) in &order {
        if !matches[i].ignored[t][d] {
          if matches[i].matched[t][d] {
            tp += 1.0;
          } else {
            fp += 1.0;
          }
        }
        rc.push(tp / num_positive as f64);
        pr.push(tp / (tp + fp + f64::EPSILON));
      }
      acc.recall[t] = rc.last().copied().unwrap_or(0.0);

      for i in (1..pr.len()).rev() {
        if pr[i] > pr[i - 1] {
          pr[i - 1] = pr[i];
        }
      }
      for r in 0..NUM_RECALL_POINTS {
        let threshold = r as f64 / (NUM_RECALL_POINTS - 1) as f64;
        let idx = rc.partition_point(|v| *v < threshold);
        acc.precision[t][r] = pr.get(idx).copied().unwrap_or(0.0);
      }
    }
    Some(acc)
  }

  pub fn summarize(&self) -> CocoStats {
    let labels: BTreeSet<usize> = self
      .images
      .iter()
      .flat_map(|r| r.ground_truth.iter().map(|g| g.label))
      .collect();
    if labels.is_empty() {
      return CocoStats::empty();
    }

    let mut table: BTreeMap<(AreaRange, usize), Vec<Accumulated>> = BTreeMap::new();
    for &label in &labels {
      for area in AreaRange::ALL {
        let matches: Vec<ImageMatch> = self
          .images
          .iter()
          .filter_map(|r| Self::match_image(r, label, area))
          .collect();
        for max_dets in MAX_DETS {
          if let Some(acc) = Self::accumulate(&matches, max_dets) {
            table.entry((area, max_dets)).or_default().push(acc);
          }
        }
      }
    }

    let mut stats = [-1.0; NUM_STATS];
    for (slot, (ap, iou, area, max_dets)) in stats.iter_mut().zip(STAT_LAYOUT) {
      let Some(entries) = table.get(&(area, max_dets)) else {
        continue;
      };
      let thresholds: Vec<usize> = match iou {
        Some(t) => vec![t],
        None => (0..NUM_IOU_THRESHOLDS).collect(),
      };
      let values: Vec<f64> = entries
        .iter()
        .flat_map(|acc| {
          thresholds.iter().flat_map(move |&t| {
            if ap {
              acc.precision[t].to_vec()
            } else {
              vec![acc.recall[t]]
            }
          })
        })
        .collect();
      if !values.is_empty() {
        *slot = values.iter().sum::<f64>() / values.len() as f64;
      }
    }
    CocoStats(stats)
  }
}
