// 该文件是 Masaike （马赛克） 项目的一部分。
// src/anchor.rs - 多尺度先验框生成
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

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, OnceLock},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;

const DEFAULT_STEPS: [u32; 3] = [8, 16, 32];
const DEFAULT_MIN_SIZES: [[u32; 2]; 3] = [[16, 32], [64, 128], [256, 512]];

/// 先验框，中心形式，坐标相对于画布归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorBox {
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
}

/// 先验框布局描述
///
/// 先验框生成器和检测器适配器共用同一个描述，
/// 检测器输出的第 i 项与生成顺序中的第 i 个先验框一一对应：
/// 先按尺度（配置顺序），再按特征图行优先位置，最后按该尺度下的尺寸顺序。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorLayout {
  /// 每个尺度的步长（像素）
  pub steps: Vec<u32>,
  /// 每个尺度的先验框边长（像素）
  pub min_sizes: Vec<Vec<u32>>,
  /// 是否把所有字段截断到 [0, 1]
  #[serde(default)]
  pub clip: bool,
}

impl Default for AnchorLayout {
  fn default() -> Self {
    Self {
      steps: DEFAULT_STEPS.to_vec(),
      min_sizes: DEFAULT_MIN_SIZES.iter().map(|s| s.to_vec()).collect(),
      clip: false,
    }
  }
}

impl AnchorLayout {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.steps.is_empty() {
      return Err(ConfigError::InvalidAnchorLayout("没有任何尺度".to_string()));
    }
    if self.steps.len() != self.min_sizes.len() {
      return Err(ConfigError::InvalidAnchorLayout(format!(
        "步长数量 {} 与尺寸组数量 {} 不一致",
        self.steps.len(),
        self.min_sizes.len()
      )));
    }
    if self.steps.contains(&0) {
      return Err(ConfigError::InvalidAnchorLayout("步长不能为 0".to_string()));
    }
    for (k, sizes) in self.min_sizes.iter().enumerate() {
      if sizes.is_empty() || sizes.contains(&0) {
        return Err(ConfigError::InvalidAnchorLayout(format!(
          "第 {} 个尺度的先验框尺寸为空或包含 0",
          k
        )));
      }
    }
    Ok(())
  }

  /// 各尺度特征图大小 (行, 列)
  pub fn feature_maps(&self, height: u32, width: u32) -> Vec<(u32, u32)> {
    self
      .steps
      .iter()
      .map(|&step| (height.div_ceil(step), width.div_ceil(step)))
      .collect()
  }

  /// 不生成网格，直接计算给定分辨率下的先验框总数
  pub fn num_anchors(&self, height: u32, width: u32) -> usize {
    self
      .feature_maps(height, width)
      .iter()
      .zip(&self.min_sizes)
      .map(|(&(rows, cols), sizes)| rows as usize * cols as usize * sizes.len())
      .sum()
  }
}

/// 某一分辨率下的完整先验框网格
#[derive(Debug)]
pub struct AnchorGrid {
  height: u32,
  width: u32,
  anchors: Box<[AnchorBox]>,
}

type GridKey = (u32, u32, AnchorLayout);

fn grid_cache() -> &'static Mutex<HashMap<GridKey, Arc<AnchorGrid>>> {
  static CACHE: OnceLock<Mutex<HashMap<GridKey, Arc<AnchorGrid>>>> = OnceLock::new();
  CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

impl AnchorGrid {
  /// 生成先验框网格，纯函数
  pub fn generate(height: u32, width: u32, layout: &AnchorLayout) -> Self {
    let (h, w) = (height as f64, width as f64);
    let mut anchors = Vec::with_capacity(layout.num_anchors(height, width));

    for ((&(rows, cols), &step), sizes) in layout
      .feature_maps(height, width)
      .iter()
      .zip(&layout.steps)
      .zip(&layout.min_sizes)
    {
      let step = step as f64;
      for row in 0..rows {
        for col in 0..cols {
          let center_x = (col as f64 + 0.5) * step / w;
          let center_y = (row as f64 + 0.5) * step / h;
          for &size in sizes {
            let mut anchor = AnchorBox {
              center_x: center_x as f32,
              center_y: center_y as f32,
              width: (size as f64 / w) as f32,
              height: (size as f64 / h) as f32,
            };
            if layout.clip {
              anchor.center_x = anchor.center_x.clamp(0.0, 1.0);
              anchor.center_y = anchor.center_y.clamp(0.0, 1.0);
              anchor.width = anchor.width.clamp(0.0, 1.0);
              anchor.height = anchor.height.clamp(0.0, 1.0);
            }
            anchors.push(anchor);
          }
        }
      }
    }

    debug!("生成先验框 {}x{}: 共 {} 个", width, height, anchors.len());

    Self {
      height,
      width,
      anchors: anchors.into_boxed_slice(),
    }
  }

  /// 进程内共享的网格，每个 (分辨率, 布局) 只生成一次
  pub fn shared(height: u32, width: u32, layout: &AnchorLayout) -> Arc<Self> {
    let mut cache = grid_cache()
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    cache
      .entry((height, width, layout.clone()))
      .or_insert_with(|| Arc::new(Self::generate(height, width, layout)))
      .clone()
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn anchors(&self) -> &[AnchorBox] {
    &self.anchors
  }
}
