// 该文件是 Masaike （马赛克） 项目的一部分。
// src/letterbox.rs - letterbox 变换参数与逆变换
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

/// 原图中被缩放到画布边长的轴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
  Height,
  Width,
}

/// 原图到 S x S 画布的映射：最长边缩放到 S，另一轴等比缩放后两侧对称补零
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  /// 短轴单侧的补边像素数
  pub pad: u32,
  pub long_axis: Axis,
}

/// 原图像素坐标下的整数框，左闭右开
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl ImageBox {
  /// 倒置的框宽度为 0
  pub fn width(&self) -> u32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> u32 {
    self.y2.saturating_sub(self.y1)
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }
}

impl Letterbox {
  /// 计算预处理使用的正向变换参数
  ///
  /// 高宽相等时视为高度为长轴。补边按截断取整。
  pub fn new(height: u32, width: u32, input_size: u32) -> Self {
    let long_axis = if height >= width {
      Axis::Height
    } else {
      Axis::Width
    };
    let (long, short) = (height.max(width), height.min(width));
    if long == 0 {
      return Self {
        scale: 1.0,
        pad: 0,
        long_axis,
      };
    }

    let scale = input_size as f64 / long as f64;
    let pad = ((input_size as f64 - short as f64 * scale) / 2.0).max(0.0) as u32;

    Self {
      scale: scale as f32,
      pad,
      long_axis,
    }
  }

  /// 缩放系数为有限正数
  pub fn is_valid(&self) -> bool {
    self.scale.is_finite() && self.scale > 0.0
  }

  /// 原图上的点映射到画布
  pub fn forward_point(&self, x: f32, y: f32) -> (f32, f32) {
    let (x, y) = (x * self.scale, y * self.scale);
    let pad = self.pad as f32;
    match self.long_axis {
      Axis::Height => (x + pad, y),
      Axis::Width => (x, y + pad),
    }
  }

  /// 画布上的角点框还原到原图并截断到图像范围
  ///
  /// 倒置的框收缩为零宽或零高，不报错。
  pub fn restore(&self, bbox: &[f32; 4], image_width: u32, image_height: u32) -> ImageBox {
    let [mut x1, mut y1, mut x2, mut y2] = *bbox;
    let pad = self.pad as f32;
    match self.long_axis {
      Axis::Height => {
        x1 -= pad;
        x2 -= pad;
      }
      Axis::Width => {
        y1 -= pad;
        y2 -= pad;
      }
    }

    let to_pixel = |v: f32, limit: u32| ((v / self.scale) as i64).clamp(0, limit as i64) as u32;

    let x1 = to_pixel(x1, image_width);
    let y1 = to_pixel(y1, image_height);
    let x2 = to_pixel(x2, image_width).max(x1);
    let y2 = to_pixel(y2, image_height).max(y1);

    ImageBox { x1, y1, x2, y2 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn landscape_image_pads_height() {
    let letterbox = Letterbox::new(600, 1000, 512);
    assert_eq!(letterbox.long_axis, Axis::Width);
    assert_relative_eq!(letterbox.scale, 0.512, epsilon = 1e-6);
    // (512 - 307.2) / 2 = 102.4
    assert_eq!(letterbox.pad, 102);
  }

  #[test]
  fn portrait_and_square_images_pad_width() {
    let letterbox = Letterbox::new(800, 400, 512);
    assert_eq!(letterbox.long_axis, Axis::Height);
    assert_eq!(letterbox.pad, 128);

    let square = Letterbox::new(300, 300, 512);
    assert_eq!(square.long_axis, Axis::Height);
    assert_eq!(square.pad, 0);
  }

  #[test]
  fn restores_known_canvas_box() {
    let letterbox = Letterbox::new(600, 1000, 512);
    let restored = letterbox.restore(&[100.0, 150.0, 200.0, 250.0], 1000, 600);
    assert_eq!(
      restored,
      ImageBox {
        x1: 195,
        y1: 93,
        x2: 390,
        y2: 289
      }
    );
  }

  #[test]
  fn restore_inverts_forward_within_one_pixel() {
    let cases = [(600, 1000), (1000, 600), (480, 640), (333, 777), (512, 512)];
    for (height, width) in cases {
      let letterbox = Letterbox::new(height, width, 512);
      for (x, y) in [(0u32, 0u32), (width / 3, height / 2), (width - 1, height - 1)] {
        let (cx, cy) = letterbox.forward_point(x as f32, y as f32);
        let restored = letterbox.restore(&[cx, cy, cx, cy], width, height);
        assert!(restored.x1.abs_diff(x) <= 1, "{}x{} x={}", width, height, x);
        assert!(restored.y1.abs_diff(y) <= 1, "{}x{} y={}", width, height, y);
      }
    }
  }

  #[test]
  fn clamps_to_image_bounds() {
    let letterbox = Letterbox::new(600, 1000, 512);
    let restored = letterbox.restore(&[-50.0, 0.0, 700.0, 600.0], 1000, 600);
    assert_eq!(restored.x1, 0);
    assert_eq!(restored.y1, 0);
    assert_eq!(restored.x2, 1000);
    assert_eq!(restored.y2, 600);
  }

  #[test]
  fn inverted_box_collapses_to_empty() {
    let letterbox = Letterbox::new(512, 512, 512);
    let restored = letterbox.restore(&[200.0, 200.0, 100.0, 300.0], 512, 512);
    assert_eq!(restored.x1, 200);
    assert_eq!(restored.x2, 200);
    assert!(restored.is_empty());
  }

  #[test]
  fn inverted_image_box_has_zero_extent() {
    let inverted = ImageBox {
      x1: 10,
      y1: 8,
      x2: 5,
      y2: 5,
    };
    assert_eq!(inverted.width(), 0);
    assert_eq!(inverted.height(), 0);
    assert!(inverted.is_empty());
  }

  #[test]
  fn computed_letterbox_is_valid_and_bad_scales_are_not() {
    assert!(Letterbox::new(600, 1000, 512).is_valid());
    assert!(Letterbox::new(0, 0, 512).is_valid());
    for scale in [0.0, -0.5, f32::NAN, f32::INFINITY] {
      let letterbox = Letterbox {
        scale,
        pad: 0,
        long_axis: Axis::Height,
      };
      assert!(!letterbox.is_valid(), "{}", scale);
    }
  }
}
