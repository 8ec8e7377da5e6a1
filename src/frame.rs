// 该文件是 Masaike （马赛克） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

use crate::letterbox::Letterbox;

/// 输入帧：原始分辨率的 RGB 图像 (高 x 宽 x 3, 交错存储)
#[derive(Debug, Clone)]
pub struct Frame {
  /// 帧在输入流中的序号
  pub index: usize,
  pub image: RgbImage,
  /// 预处理使用的 letterbox 参数，`None` 时按画布尺寸计算
  pub letterbox: Option<Letterbox>,
}

impl Frame {
  pub fn new(index: usize, image: RgbImage) -> Self {
    Self {
      index,
      image,
      letterbox: None,
    }
  }

  /// 显式指定外部预处理实际使用的 letterbox 参数
  pub fn with_letterbox(mut self, letterbox: Letterbox) -> Self {
    self.letterbox = Some(letterbox);
    self
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  /// 该帧映射到 `input_size` 画布时的 letterbox 参数
  pub fn letterbox_for(&self, input_size: u32) -> Letterbox {
    self
      .letterbox
      .unwrap_or_else(|| Letterbox::new(self.height(), self.width(), input_size))
  }
}
