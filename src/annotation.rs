// 该文件是 Shanan （山南西风） 项目的一部分。
// src/annotation.rs - Pascal VOC 标注解析
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

use std::path::Path;

use quick_xml::{events::Event, reader::Reader};
use thiserror::Error;
use tracing::warn;

use crate::labels::LabelSet;

#[derive(Error, Debug)]
pub enum AnnotationError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("XML 错误: {0}")]
  XmlError(#[from] quick_xml::Error),
  #[error("缺少字段: {0}")]
  MissingField(&'static str),
  #[error("无效数值 `{value}` ({field})")]
  InvalidNumber { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedObject {
  pub name: String,
  /// 像素坐标 [x_min, y_min, x_max, y_max]
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub filename: Option<String>,
  pub width: u32,
  pub height: u32,
  pub objects: Vec<AnnotatedObject>,
}

/// 训练目标：类别下标（背景为 0）与归一化边框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
  pub label: usize,
  pub bbox: [f32; 4],
}

#[derive(Default)]
struct ObjectBuilder {
  name: Option<String>,
  bbox: [Option<f32>; 4],
}

impl ObjectBuilder {
  fn finish(self) -> Result<AnnotatedObject, AnnotationError> {
    let name = self.name.ok_or(AnnotationError::MissingField("object/name"))?;
    let [x_min, y_min, x_max, y_max] = self.bbox;
    Ok(AnnotatedObject {
      name,
      bbox: [
        x_min.ok_or(AnnotationError::MissingField("bndbox/xmin"))?,
        y_min.ok_or(AnnotationError::MissingField("bndbox/ymin"))?,
        x_max.ok_or(AnnotationError::MissingField("bndbox/xmax"))?,
        y_max.ok_or(AnnotationError::MissingField("bndbox/ymax"))?,
      ],
    })
  }
}

fn parse_number(field: &'static str, value: &str) -> Result<f32, AnnotationError> {
  value
    .trim()
    .parse::<f32>()
    .map_err(|_| AnnotationError::InvalidNumber {
      field,
      value: value.to_string(),
    })
}

impl Annotation {
  pub fn parse(xml: &str) -> Result<Self, AnnotationError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut filename = None;
    let mut width = None;
    let mut height = None;
    let mut objects = Vec::new();
    let mut current: Option<ObjectBuilder> = None;

    loop {
      match reader.read_event()? {
        Event::Start(e) => {
          let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
          if name == "object" {
            current = Some(ObjectBuilder::default());
          }
          path.push(name);
        }
        Event::End(e) => {
          if e.name().as_ref() == b"object"
            && let Some(object) = current.take()
          {
            objects.push(object.finish()?);
          }
          path.pop();
        }
        Event::Text(t) => {
          let text = t.unescape()?;
          let n = path.len();
          let parent = if n >= 2 { path[n - 2].as_str() } else { "" };
          let leaf = path.last().map(String::as_str).unwrap_or("");
          match (parent, leaf) {
            ("annotation", "filename") => filename = Some(text.trim().to_string()),
            ("size", "width") => width = Some(parse_number("size/width", &text)? as u32),
            ("size", "height") => height = Some(parse_number("size/height", &text)? as u32),
            ("object", "name") => {
              if let Some(object) = current.as_mut() {
                object.name = Some(text.trim().to_string());
              }
            }
            ("bndbox", coord) => {
              if let Some(object) = current.as_mut() {
                let slot = match coord {
                  "xmin" => Some(0),
                  "ymin" => Some(1),
                  "xmax" => Some(2),
                  "ymax" => Some(3),
                  _ => None,
                };
                if let Some(slot) = slot {
                  object.bbox[slot] = Some(parse_number("bndbox", &text)?);
                }
              }
            }
            _ => {}
          }
        }
        Event::Eof => break,
        _ => {}
      }
    }

    Ok(Annotation {
      filename,
      width: width.ok_or(AnnotationError::MissingField("size/width"))?,
      height: height.ok_or(AnnotationError::MissingField("size/height"))?,
      objects,
    })
  }

  pub fn load(path: &Path) -> Result<Self, AnnotationError> {
    let xml = std::fs::read_to_string(path)?;
    Self::parse(&xml)
  }

  /// 转为归一化训练目标，未知类别与退化边框会被丢弃
  pub fn targets(&self, labels: &LabelSet) -> Vec<Target> {
    let (w, h) = (self.width.max(1) as f32, self.height.max(1) as f32);
    self
      .objects
      .iter()
      .filter_map(|object| {
        let Some(label) = labels.index_of(&object.name) else {
          warn!("标注中出现未知类别: {}", object.name);
          return None;
        };
        let [x0, y0, x1, y1] = object.bbox;
        let bbox = [
          (x0.min(x1) / w).clamp(0.0, 1.0),
          (y0.min(y1) / h).clamp(0.0, 1.0),
          (x0.max(x1) / w).clamp(0.0, 1.0),
          (y0.max(y1) / h).clamp(0.0, 1.0),
        ];
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
          return None;
        }
        Some(Target { label, bbox })
      })
      .collect()
  }
}
