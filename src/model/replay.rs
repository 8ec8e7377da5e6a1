// 该文件是 Masaike （马赛克） 项目的一部分。
// src/model/replay.rs - 回放检测器输出
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  anchor::AnchorLayout,
  frame::Frame,
  model::{Model, RawDetections},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("读取检测结果文件错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("解析检测结果文件错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("第 {frame} 帧的输出数量与先验框布局不一致: 期望 {expected}, 回归 {regressions}, 分数 {scores}")]
  LayoutMismatch {
    frame: usize,
    expected: usize,
    regressions: usize,
    scores: usize,
  },
  #[error("第 {0} 帧没有对应的检测结果")]
  MissingFrame(usize),
}

#[derive(Deserialize)]
struct ReplayFile {
  frames: Vec<RawDetections>,
}

/// 从 JSON 文件回放预先计算好的检测器输出
///
/// 输入流的第 i 帧对应文件中的第 i 项。
pub struct ReplayDetector {
  frames: Vec<RawDetections>,
}

pub struct ReplayDetectorBuilder {
  path: String,
  layout: AnchorLayout,
  input_size: u32,
}

impl FromUrlWithScheme for ReplayDetectorBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetectorBuilder {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(ReplayDetectorBuilder {
      path: url.path().to_string(),
      layout: AnchorLayout::default(),
      input_size: 512,
    })
  }
}

impl ReplayDetectorBuilder {
  /// 检测器与先验框生成器共用的布局和画布尺寸
  pub fn layout(mut self, layout: AnchorLayout, input_size: u32) -> Self {
    self.layout = layout;
    self.input_size = input_size;
    self
  }

  pub fn build(self) -> Result<ReplayDetector, ReplayError> {
    info!("加载检测结果文件: {}", self.path);
    let text = std::fs::read_to_string(&self.path)?;
    let file: ReplayFile = serde_json::from_str(&text)?;
    ReplayDetector::new(file.frames, &self.layout, self.input_size)
  }
}

impl ReplayDetector {
  /// 校验每一帧的输出数量都与布局推导出的先验框数量一致
  pub fn new(
    frames: Vec<RawDetections>,
    layout: &AnchorLayout,
    input_size: u32,
  ) -> Result<Self, ReplayError> {
    let expected = layout.num_anchors(input_size, input_size);
    for (frame, raw) in frames.iter().enumerate() {
      if raw.regressions.len() != expected || raw.scores.len() != expected {
        error!(
          "第 {} 帧输出数量不匹配: 期望 {}, 回归 {}, 分数 {}",
          frame,
          expected,
          raw.regressions.len(),
          raw.scores.len()
        );
        return Err(ReplayError::LayoutMismatch {
          frame,
          expected,
          regressions: raw.regressions.len(),
          scores: raw.scores.len(),
        });
      }
    }

    debug!("回放检测器共 {} 帧, 每帧 {} 个先验框", frames.len(), expected);
    Ok(Self { frames })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl Model for ReplayDetector {
  type Input = Frame;
  type Output = RawDetections;
  type Error = ReplayError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self
      .frames
      .get(input.index)
      .cloned()
      .ok_or(ReplayError::MissingFrame(input.index))
  }
}
