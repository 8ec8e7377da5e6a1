// 该文件是 Masaike （马赛克） 项目的一部分。
// src/config.rs - 像素化流水线配置
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::anchor::AnchorLayout;

const DEFAULT_INPUT_SIZE: u32 = 512;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
const DEFAULT_BLOCKS: u32 = 6;
const DEFAULT_VARIANCES: [f32; 2] = [0.1, 0.2];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("置信度阈值必须位于 (0, 1) 区间, 实际为 {0}")]
  InvalidScoreThreshold(f32),
  #[error("IoU 阈值必须位于 (0, 1) 区间, 实际为 {0}")]
  InvalidIouThreshold(f32),
  #[error("像素块数量必须至少为 1, 实际为 {0}")]
  InvalidBlocks(u32),
  #[error("网络输入尺寸必须大于 0")]
  InvalidInputSize,
  #[error("解码方差必须为有限正数, 实际为 {0:?}")]
  InvalidVariances([f32; 2]),
  #[error("先验框布局无效: {0}")]
  InvalidAnchorLayout(String),
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 检测器输出的分数形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
  /// 已经过 softmax 的 (背景, 前景) 概率
  #[default]
  Probabilities,
  /// 未归一化的 (背景, 前景) logits，解码时做两路 softmax
  Logits,
}

/// 批处理并行策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelPolicy {
  /// 专用线程池的线程数，`None` 时使用 rayon 全局线程池
  #[serde(default)]
  pub max_threads: Option<usize>,
  /// 批大小不超过该值时顺序处理
  #[serde(default = "ParallelPolicy::default_batch_threshold")]
  pub batch_threshold: usize,
}

impl ParallelPolicy {
  fn default_batch_threshold() -> usize {
    1
  }
}

impl Default for ParallelPolicy {
  fn default() -> Self {
    Self {
      max_threads: None,
      batch_threshold: Self::default_batch_threshold(),
    }
  }
}

/// 人脸像素化流水线配置
///
/// 所有字段都有默认值，可从 JSON 文件部分覆盖。
/// 取值范围在 [`PixelizerConfig::validate`] 中统一检查，逐帧处理时不再校验。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelizerConfig {
  /// 网络输入画布边长 S
  pub input_size: u32,
  /// 先验框布局，检测器适配器与先验框生成器共用
  pub anchors: AnchorLayout,
  /// 置信度阈值，严格大于该值的框才会保留
  pub score_threshold: f32,
  /// NMS 的 IoU 阈值
  pub iou_threshold: f32,
  /// 每个轴上的像素块数量
  pub blocks: u32,
  /// 解码方差 (中心, 尺寸)
  pub variances: [f32; 2],
  pub score_kind: ScoreKind,
  pub parallel: ParallelPolicy,
}

impl Default for PixelizerConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      anchors: AnchorLayout::default(),
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      blocks: DEFAULT_BLOCKS,
      variances: DEFAULT_VARIANCES,
      score_kind: ScoreKind::default(),
      parallel: ParallelPolicy::default(),
    }
  }
}

impl PixelizerConfig {
  /// 从 JSON 文件读取配置，缺省字段取默认值
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    debug!("读取配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn anchors(mut self, anchors: AnchorLayout) -> Self {
    self.anchors = anchors;
    self
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn blocks(mut self, blocks: u32) -> Self {
    self.blocks = blocks;
    self
  }

  pub fn variances(mut self, center: f32, size: f32) -> Self {
    self.variances = [center, size];
    self
  }

  pub fn score_kind(mut self, kind: ScoreKind) -> Self {
    self.score_kind = kind;
    self
  }

  pub fn parallel(mut self, policy: ParallelPolicy) -> Self {
    self.parallel = policy;
    self
  }

  /// 检查所有取值范围
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_size == 0 {
      return Err(ConfigError::InvalidInputSize);
    }
    if !open_unit_interval(self.score_threshold) {
      return Err(ConfigError::InvalidScoreThreshold(self.score_threshold));
    }
    if !open_unit_interval(self.iou_threshold) {
      return Err(ConfigError::InvalidIouThreshold(self.iou_threshold));
    }
    if self.blocks < 1 {
      return Err(ConfigError::InvalidBlocks(self.blocks));
    }
    if self.variances.iter().any(|v| !v.is_finite() || *v <= 0.0) {
      return Err(ConfigError::InvalidVariances(self.variances));
    }
    self.anchors.validate()?;
    Ok(())
  }
}

fn open_unit_interval(value: f32) -> bool {
  value > 0.0 && value < 1.0
}
