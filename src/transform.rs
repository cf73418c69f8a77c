// 该文件是 Shanan （山南西风） 项目的一部分。
// src/transform.rs - 样本变换
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

use image::{RgbImage, imageops::FilterType};
use rand::{Rng, rngs::StdRng};

use crate::{annotation::Target, settings::HORIZONTAL_FLIP_PROB};

const RGB_CHANNELS: usize = 3;

/// CHW 排列、取值 [0, 1] 的图像张量数据
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
  pub data: Vec<f32>,
  pub width: usize,
  pub height: usize,
}

impl ImageTensor {
  pub fn shape(&self) -> [usize; 3] {
    [RGB_CHANNELS, self.height, self.width]
  }
}

#[derive(Debug, Clone)]
pub struct Sample {
  pub image: ImageTensor,
  pub targets: Vec<Target>,
  /// 缩放前的原图宽高
  pub source_size: (u32, u32),
}

pub trait Transform {
  fn apply(&self, sample: Sample, rng: &mut StdRng) -> Sample;
}

/// 缩放到网络输入尺寸并转为 CHW 浮点张量
///
/// 边框已经是归一化坐标，缩放不影响目标。
#[derive(Debug, Clone, Copy)]
pub struct ToTensor {
  pub size: u32,
}

impl ToTensor {
  pub fn convert(&self, image: &RgbImage, targets: Vec<Target>) -> Sample {
    let source_size = image.dimensions();
    let resized;
    let image = if image.dimensions() == (self.size, self.size) {
      image
    } else {
      resized = image::imageops::resize(image, self.size, self.size, FilterType::Triangle);
      &resized
    };

    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; RGB_CHANNELS * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = y as usize * width + x as usize;
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Sample {
      image: ImageTensor {
        data,
        width,
        height,
      },
      targets,
      source_size,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomHorizontalFlip {
  pub prob: f64,
}

impl RandomHorizontalFlip {
  pub fn flip(mut sample: Sample) -> Sample {
    let ImageTensor {
      data,
      width,
      height,
    } = &mut sample.image;
    let (width, height) = (*width, *height);
    for row in data.chunks_mut(width).take(RGB_CHANNELS * height) {
      row.reverse();
    }
    for target in sample.targets.iter_mut() {
      let [x0, y0, x1, y1] = target.bbox;
      target.bbox = [1.0 - x1, y0, 1.0 - x0, y1];
    }
    sample
  }
}

impl Transform for RandomHorizontalFlip {
  fn apply(&self, sample: Sample, rng: &mut StdRng) -> Sample {
    if rng.random_bool(self.prob.clamp(0.0, 1.0)) {
      Self::flip(sample)
    } else {
      sample
    }
  }
}

/// 先转张量，再依次执行其余变换
pub struct Compose {
  to_tensor: ToTensor,
  transforms: Vec<Box<dyn Transform + Send + Sync>>,
}

impl Compose {
  pub fn new(to_tensor: ToTensor) -> Self {
    Self {
      to_tensor,
      transforms: Vec::new(),
    }
  }

  pub fn then<T: Transform + Send + Sync + 'static>(mut self, transform: T) -> Self {
    self.transforms.push(Box::new(transform));
    self
  }

  /// 含张量转换在内的变换步数
  pub fn stages(&self) -> usize {
    self.transforms.len() + 1
  }

  pub fn apply(&self, image: &RgbImage, targets: Vec<Target>, rng: &mut StdRng) -> Sample {
    let sample = self.to_tensor.convert(image, targets);
    self
      .transforms
      .iter()
      .fold(sample, |sample, transform| transform.apply(sample, rng))
  }
}

/// 训练时附加随机水平翻转，评估时只做张量转换
pub fn get_transform(train: bool, input_size: u32) -> Compose {
  let compose = Compose::new(ToTensor { size: input_size });
  if train {
    compose.then(RandomHorizontalFlip {
      prob: HORIZONTAL_FLIP_PROB,
    })
  } else {
    compose
  }
}
