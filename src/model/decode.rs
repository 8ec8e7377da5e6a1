// 该文件是 Masaike （马赛克） 项目的一部分。
// src/model/decode.rs - 先验框回归解码
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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  anchor::AnchorGrid,
  config::{PixelizerConfig, ScoreKind},
  model::{DetectItem, RawDetections},
};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("检测器输出与先验框数量不一致: 先验框 {anchors}, 回归 {regressions}, 分数 {scores}")]
  AnchorCountMismatch {
    anchors: usize,
    regressions: usize,
    scores: usize,
  },
  #[error("张量长度 {len} 不是 {stride} 的整数倍")]
  RaggedTensor { len: usize, stride: usize },
}

/// 把检测器的原始回归量还原为画布像素坐标下的角点框
#[derive(Debug, Clone, Copy)]
pub struct BoxDecoder {
  variances: [f32; 2],
  score_kind: ScoreKind,
}

impl BoxDecoder {
  pub fn new(variances: [f32; 2], score_kind: ScoreKind) -> Self {
    Self {
      variances,
      score_kind,
    }
  }

  pub fn from_config(config: &PixelizerConfig) -> Self {
    Self::new(config.variances, config.score_kind)
  }

  /// 解码一张图像的全部先验框，输出顺序与先验框顺序一致
  pub fn decode(
    &self,
    grid: &AnchorGrid,
    raw: &RawDetections,
  ) -> Result<Vec<DetectItem>, DecodeError> {
    if raw.regressions.len() != grid.len() || raw.scores.len() != grid.len() {
      error!(
        "检测器输出数量不匹配: 先验框 {}, 回归 {}, 分数 {}",
        grid.len(),
        raw.regressions.len(),
        raw.scores.len()
      );
      return Err(DecodeError::AnchorCountMismatch {
        anchors: grid.len(),
        regressions: raw.regressions.len(),
        scores: raw.scores.len(),
      });
    }

    let (canvas_w, canvas_h) = (grid.width() as f32, grid.height() as f32);
    let [v_center, v_size] = self.variances;

    let items: Vec<DetectItem> = grid
      .anchors()
      .iter()
      .zip(&raw.regressions)
      .zip(&raw.scores)
      .map(|((anchor, &[dx, dy, dw, dh]), score)| {
        let cx = anchor.center_x + dx * v_center * anchor.width;
        let cy = anchor.center_y + dy * v_center * anchor.height;
        let w = anchor.width * (dw * v_size).exp();
        let h = anchor.height * (dh * v_size).exp();

        let x1 = cx - w / 2.0;
        let y1 = cy - h / 2.0;
        let x2 = x1 + w;
        let y2 = y1 + h;

        DetectItem {
          score: self.foreground(score),
          bbox: [x1 * canvas_w, y1 * canvas_h, x2 * canvas_w, y2 * canvas_h],
        }
      })
      .collect();

    debug!("解码 {} 个候选框", items.len());
    Ok(items)
  }

  fn foreground(&self, &[background, foreground]: &[f32; 2]) -> f32 {
    match self.score_kind {
      ScoreKind::Probabilities => foreground,
      // 两路 softmax 的前景通道等价于 sigmoid(fg - bg)
      ScoreKind::Logits => sigmoid(foreground - background),
    }
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
