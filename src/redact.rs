// 该文件是 Masaike （马赛克） 项目的一部分。
// src/redact.rs - 块均值像素化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

use crate::letterbox::ImageBox;

/// 把框内区域切成 blocks x blocks 个单元，每个单元填充为其平均颜色
#[derive(Debug, Clone, Copy)]
pub struct Pixelizer {
  blocks: u32,
}

impl Pixelizer {
  /// `blocks` 小于 1 时按 1 处理
  pub fn new(blocks: u32) -> Self {
    Self {
      blocks: blocks.max(1),
    }
  }

  pub fn blocks(&self) -> u32 {
    self.blocks
  }

  /// 长度为 `len` 的区间的切分点，均匀分布并向下取整，最后一段吸收余数
  pub fn cut_points(&self, len: u32) -> Vec<u32> {
    let blocks = self.blocks as u64;
    (0..=blocks)
      .map(|i| (i * len as u64 / blocks) as u32)
      .collect()
  }

  /// 框内所有单元 (x, y, 宽, 高)，空单元被跳过
  pub fn cells(&self, face: &ImageBox) -> Vec<(u32, u32, u32, u32)> {
    let xs = self.cut_points(face.width());
    let ys = self.cut_points(face.height());

    let mut cells = Vec::with_capacity(self.blocks as usize * self.blocks as usize);
    for y in ys.windows(2) {
      for x in xs.windows(2) {
        let (w, h) = (x[1] - x[0], y[1] - y[0]);
        if w > 0 && h > 0 {
          cells.push((face.x1 + x[0], face.y1 + y[0], w, h));
        }
      }
    }
    cells
  }

  /// 原地像素化一个框，零宽或零高的框被忽略
  pub fn pixelize(&self, image: &mut RgbImage, face: &ImageBox) {
    let face = clip_to_image(face, image.width(), image.height());
    if face.is_empty() {
      return;
    }

    for (x, y, w, h) in self.cells(&face) {
      let color = mean_color(image, x, y, w, h);
      draw_filled_rect_mut(image, Rect::at(x as i32, y as i32).of_size(w, h), color);
    }
  }
}

impl Default for Pixelizer {
  fn default() -> Self {
    Self::new(6)
  }
}

fn clip_to_image(face: &ImageBox, width: u32, height: u32) -> ImageBox {
  let x1 = face.x1.min(width);
  let y1 = face.y1.min(height);
  ImageBox {
    x1,
    y1,
    x2: face.x2.clamp(x1, width),
    y2: face.y2.clamp(y1, height),
  }
}

/// 单元内各通道的平均值，向下取整
fn mean_color(image: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> Rgb<u8> {
  let mut sum = [0u64; 3];
  for py in y..y + h {
    for px in x..x + w {
      let Rgb(pixel) = image.get_pixel(px, py);
      for (acc, &value) in sum.iter_mut().zip(pixel) {
        *acc += value as u64;
      }
    }
  }

  let count = w as u64 * h as u64;
  Rgb(sum.map(|s| (s / count) as u8))
}
