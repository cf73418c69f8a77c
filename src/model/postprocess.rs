// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/postprocess.rs - 目标匹配与检测结果解码
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

use crate::annotation::Target;

use super::{DetectItem, DetectResult};

pub const SCORE_THRESHOLD: f32 = 0.05;
pub const NMS_IOU_THRESHOLD: f32 = 0.5;
pub const MAX_DETECTIONS: usize = 100;

pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
  let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = inter_w * inter_h;
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按目标顺序贪心地为每个目标挑选 IoU 最大且尚未占用的预测槽位
///
/// 返回每个槽位对应的目标下标；目标数多于槽位时，多出的目标不参与匹配。
pub fn greedy_match(pred_boxes: &[[f32; 4]], targets: &[Target]) -> Vec<Option<usize>> {
  let mut assigned = vec![None; pred_boxes.len()];
  for (t, target) in targets.iter().enumerate() {
    let best = pred_boxes
      .iter()
      .enumerate()
      .filter(|(p, _)| assigned[*p].is_none())
      .map(|(p, pb)| (p, iou_xyxy(*pb, target.bbox)))
      .fold(None, |best: Option<(usize, f32)>, (p, iou)| match best {
        Some((_, best_iou)) if best_iou >= iou => best,
        _ => Some((p, iou)),
      });
    match best {
      Some((p, _)) => assigned[p] = Some(t),
      None => break,
    }
  }
  assigned
}

fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exp: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
  let sum: f32 = exp.iter().sum();
  exp.into_iter().map(|v| v / sum).collect()
}

/// 单张图像的网络输出解码为检测结果
///
/// `boxes` 长度为 K×4，`objectness` 为 K，`class_logits` 为 K×C。
pub fn decode(
  boxes: &[f32],
  objectness: &[f32],
  class_logits: &[f32],
  num_classes: usize,
) -> DetectResult {
  let mut candidates: Vec<DetectItem> = objectness
    .iter()
    .enumerate()
    .filter_map(|(k, &obj)| {
      let probs = softmax(class_logits.get(k * num_classes..(k + 1) * num_classes)?);
      let (label, prob) = probs
        .iter()
        .copied()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
      let score = obj * prob;
      let b = boxes.get(k * 4..k * 4 + 4)?;
      (score >= SCORE_THRESHOLD).then_some(DetectItem {
        label,
        score,
        bbox: [b[0], b[1], b[2], b[3]],
      })
    })
    .collect();
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for item in candidates {
    if kept.len() >= MAX_DETECTIONS {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.label == item.label && iou_xyxy(k.bbox, item.bbox) > NMS_IOU_THRESHOLD);
    if !suppressed {
      kept.push(item);
    }
  }

  DetectResult {
    items: kept.into_boxed_slice(),
  }
}
