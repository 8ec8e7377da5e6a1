// 该文件是 Masaike （马赛克） 项目的一部分。
// src/model.rs - 检测器接口与检测结果
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

use serde::{Deserialize, Serialize};

/// 人脸检测网络。网络本身是黑盒，只约定输出形状。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 单张图像的原始检测器输出，与先验框按位置一一对应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetections {
  /// 每个先验框的回归量 (dx, dy, dw, dh)
  pub regressions: Vec<[f32; 4]>,
  /// 每个先验框的 (背景, 前景) 分数
  pub scores: Vec<[f32; 2]>,
}

impl RawDetections {
  /// 从扁平张量构造，`regressions` 长度须为 4 的倍数，`scores` 长度须为 2 的倍数
  pub fn from_flat(regressions: &[f32], scores: &[f32]) -> Result<Self, DecodeError> {
    if regressions.len() % 4 != 0 {
      return Err(DecodeError::RaggedTensor {
        len: regressions.len(),
        stride: 4,
      });
    }
    if scores.len() % 2 != 0 {
      return Err(DecodeError::RaggedTensor {
        len: scores.len(),
        stride: 2,
      });
    }

    Ok(Self {
      regressions: regressions
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect(),
      scores: scores.chunks_exact(2).map(|c| [c[0], c[1]]).collect(),
    })
  }

  pub fn len(&self) -> usize {
    self.regressions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.regressions.is_empty()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectItem {
  pub score: f32,
  pub bbox: [f32; 4], // 画布像素坐标 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

mod decode;
pub mod nms;
mod replay;

pub use self::decode::{BoxDecoder, DecodeError};
pub use self::replay::{ReplayDetector, ReplayDetectorBuilder, ReplayError};
