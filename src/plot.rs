// 该文件是 Shanan （山南西风） 项目的一部分。
// src/plot.rs - 评估指标折线图
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
  },
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::MetricHistory;

pub const PLOT_WIDTH: u32 = 640;
pub const PLOT_HEIGHT: u32 = 480;
pub const PRECISION_LEGEND: &str = "AP: IoU=0.50:0.95 maxDets=100";
pub const RECALL_LEGEND: &str = "AR: IoU=0.50:0.95 maxDets=100";

const FONT_CANDIDATES: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([220, 220, 220]);
const PRECISION_COLOR: Rgb<u8> = Rgb([31, 119, 180]);
const RECALL_COLOR: Rgb<u8> = Rgb([255, 127, 14]);

const MARGIN_LEFT: f32 = 56.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 40.0;
const MARGIN_BOTTOM: f32 = 36.0;
const TICKS: usize = 5;

#[derive(Error, Debug)]
pub enum PlotError {
  #[error("图像保存失败: {0}")]
  ImageError(#[from] image::ImageError),
}

fn read_font(path: &Path) -> Option<FontArc> {
  let data = std::fs::read(path).ok()?;
  match FontArc::try_from_vec(data) {
    Ok(font) => Some(font),
    Err(_) => {
      warn!("无法解析字体文件: {}", path.display());
      None
    }
  }
}

/// 优先使用指定字体，其次查找常见的系统字体
pub fn load_font(explicit: Option<&Path>) -> Option<FontArc> {
  if let Some(path) = explicit {
    if let Some(font) = read_font(path) {
      return Some(font);
    }
    warn!("指定的字体不可用: {}", path.display());
  }
  let found = FONT_CANDIDATES
    .iter()
    .map(PathBuf::from)
    .filter(|p| p.is_file())
    .find_map(|p| read_font(&p).map(|font| (p, font)));
  match found {
    Some((path, font)) => {
      debug!("使用字体 {}", path.display());
      Some(font)
    }
    None => {
      warn!("未找到可用字体，图表将不包含文字");
      None
    }
  }
}

/// 数据坐标到像素坐标的映射
struct Axes {
  left: f32,
  right: f32,
  top: f32,
  bottom: f32,
  x_max: f32,
  y_min: f32,
  y_max: f32,
}

impl Axes {
  fn fit(history: &MetricHistory) -> Self {
    let values = history.precision().iter().chain(history.recall());
    let (lo, hi) = values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
      (lo.min(*v), hi.max(*v))
    });
    let (lo, hi) = if lo.is_finite() && hi.is_finite() {
      (lo, hi)
    } else {
      (0.0, 1.0)
    };
    let pad = if hi - lo > f32::EPSILON {
      (hi - lo) * 0.05
    } else {
      0.5
    };
    Self {
      left: MARGIN_LEFT,
      right: PLOT_WIDTH as f32 - MARGIN_RIGHT,
      top: MARGIN_TOP,
      bottom: PLOT_HEIGHT as f32 - MARGIN_BOTTOM,
      x_max: history.len().saturating_sub(1).max(1) as f32,
      y_min: lo - pad,
      y_max: hi + pad,
    }
  }

  fn point(&self, epoch: usize, value: f32) -> (f32, f32) {
    let x = self.left + (self.right - self.left) * epoch as f32 / self.x_max;
    let t = (value - self.y_min) / (self.y_max - self.y_min);
    (x, self.bottom - (self.bottom - self.top) * t)
  }

  fn frame(&self) -> Rect {
    Rect::at(self.left as i32, self.top as i32).of_size(
      (self.right - self.left) as u32,
      (self.bottom - self.top) as u32,
    )
  }
}

fn draw_series(image: &mut RgbImage, axes: &Axes, values: &[f32], color: Rgb<u8>) {
  let points: Vec<(f32, f32)> = values
    .iter()
    .enumerate()
    .map(|(epoch, v)| axes.point(epoch, *v))
    .collect();
  for pair in points.windows(2) {
    draw_line_segment_mut(image, pair[0], pair[1], color);
  }
  for (x, y) in points {
    draw_filled_circle_mut(image, (x as i32, y as i32), 3, color);
  }
}

fn draw_labels(
  image: &mut RgbImage,
  axes: &Axes,
  history: &MetricHistory,
  run_name: &str,
  font: &FontArc,
) {
  let title = format!("Evaluation data from {run_name}");
  let scale = PxScale::from(18.0);
  let (w, _) = text_size(scale, font, &title);
  let x = ((PLOT_WIDTH as i32 - w as i32) / 2).max(0);
  draw_text_mut(image, BLACK, x, 10, scale, font, &title);

  let small = PxScale::from(12.0);
  for i in 0..=TICKS {
    let value = axes.y_min + (axes.y_max - axes.y_min) * i as f32 / TICKS as f32;
    let (_, y) = axes.point(0, value);
    draw_text_mut(image, BLACK, 6, y as i32 - 6, small, font, &format!("{value:.3}"));
  }
  for epoch in 0..history.len() {
    let (x, _) = axes.point(epoch, axes.y_min);
    let label = epoch.to_string();
    let (w, _) = text_size(small, font, &label);
    draw_text_mut(
      image,
      BLACK,
      x as i32 - w as i32 / 2,
      axes.bottom as i32 + 6,
      small,
      font,
      &label,
    );
  }

  // 图例放在右下角
  let entries = [(PRECISION_LEGEND, PRECISION_COLOR), (RECALL_LEGEND, RECALL_COLOR)];
  let text_w = entries
    .iter()
    .map(|(text, _)| text_size(small, font, text).0)
    .max()
    .unwrap_or(0);
  let box_w = text_w + 44;
  let box_h = 44u32;
  let bx = axes.right as i32 - box_w as i32 - 8;
  let by = axes.bottom as i32 - box_h as i32 - 8;
  let legend = Rect::at(bx, by).of_size(box_w, box_h);
  draw_filled_rect_mut(image, legend, WHITE);
  draw_hollow_rect_mut(image, legend, GRID);
  for (row, (text, color)) in entries.iter().enumerate() {
    let y = by + 14 + row as i32 * 18;
    draw_line_segment_mut(image, (bx as f32 + 8.0, y as f32), (bx as f32 + 30.0, y as f32), *color);
    draw_filled_circle_mut(image, (bx + 19, y), 3, *color);
    draw_text_mut(image, BLACK, bx + 36, y - 7, small, font, text);
  }
}

/// 绘制每轮的 AP 与 AR 曲线，没有字体时只绘制图形部分
pub fn render_metrics(history: &MetricHistory, run_name: &str, font: Option<&FontArc>) -> RgbImage {
  let mut image = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, WHITE);
  let axes = Axes::fit(history);

  for i in 0..=TICKS {
    let value = axes.y_min + (axes.y_max - axes.y_min) * i as f32 / TICKS as f32;
    let (_, y) = axes.point(0, value);
    draw_line_segment_mut(&mut image, (axes.left, y), (axes.right, y), GRID);
  }
  draw_hollow_rect_mut(&mut image, axes.frame(), BLACK);

  draw_series(&mut image, &axes, history.precision(), PRECISION_COLOR);
  draw_series(&mut image, &axes, history.recall(), RECALL_COLOR);

  if let Some(font) = font {
    draw_labels(&mut image, &axes, history, run_name, font);
  }
  image
}

pub fn save_metrics_plot(
  history: &MetricHistory,
  run_name: &str,
  font: Option<&FontArc>,
  path: &Path,
) -> Result<(), PlotError> {
  render_metrics(history, run_name, font).save(path)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::evaluate::CocoStats;

  fn history(values: &[(f64, f64)]) -> MetricHistory {
    let mut history = MetricHistory::default();
    for (ap, ar) in values {
      let mut stats = [0.0; 12];
      stats[0] = *ap;
      stats[8] = *ar;
      history.push(&CocoStats(stats));
    }
    history
  }

  #[test]
  fn plot_has_fixed_size_and_series_colors() {
    let image = render_metrics(&history(&[(0.1, 0.2), (0.3, 0.5), (0.4, 0.6)]), "1-x", None);
    assert_eq!(image.dimensions(), (PLOT_WIDTH, PLOT_HEIGHT));
    assert!(image.pixels().any(|p| *p == PRECISION_COLOR));
    assert!(image.pixels().any(|p| *p == RECALL_COLOR));
  }

  #[test]
  fn flat_or_empty_history_still_renders() {
    let image = render_metrics(&history(&[(-1.0, -1.0)]), "1-x", None);
    assert_eq!(image.dimensions(), (PLOT_WIDTH, PLOT_HEIGHT));
    let image = render_metrics(&MetricHistory::default(), "1-x", None);
    assert_eq!(image.dimensions(), (PLOT_WIDTH, PLOT_HEIGHT));
  }

  #[test]
  fn plot_is_written_as_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("1-x.jpg");
    save_metrics_plot(&history(&[(0.1, 0.2)]), "1-x", None, &path).unwrap();
    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (PLOT_WIDTH, PLOT_HEIGHT));
  }

  #[test]
  fn unreadable_font_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.ttf");
    std::fs::write(&bogus, b"not a font").unwrap();
    assert!(read_font(&bogus).is_none());
  }
}
