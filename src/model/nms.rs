// 该文件是 Masaike （马赛克） 项目的一部分。
// src/model/nms.rs - 置信度过滤与非极大值抑制
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

use tracing::debug;

use crate::model::{DetectItem, DetectResult};

/// 保留分数严格大于阈值的框，保持原有顺序
pub fn filter_by_score(items: Vec<DetectItem>, score_threshold: f32) -> Vec<DetectItem> {
  items
    .into_iter()
    .filter(|item| item.score > score_threshold)
    .collect()
}

/// 计算两个角点框的 IoU，面积为零的框与任何框的 IoU 都为 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  if !(area_a > 0.0 && area_b > 0.0) {
    return 0.0;
  }

  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心非极大值抑制
///
/// 按分数稳定降序排列后逐个接受，与已接受框 IoU 超过阈值的框被标记丢弃。
/// 输出按分数降序。
pub fn non_max_suppression(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  // sort_by 是稳定排序，分数相同的框保持原有顺序
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut discarded = vec![false; items.len()];
  let mut kept = Vec::new();

  for i in 0..items.len() {
    if discarded[i] {
      continue;
    }
    let best = items[i];
    kept.push(best);

    for (j, other) in items.iter().enumerate().skip(i + 1) {
      if !discarded[j] && iou(&best.bbox, &other.bbox) > iou_threshold {
        discarded[j] = true;
      }
    }
  }

  kept
}

/// 过滤并抑制一张图像的候选框
pub fn suppress(items: Vec<DetectItem>, score_threshold: f32, iou_threshold: f32) -> DetectResult {
  let candidates = filter_by_score(items, score_threshold);
  let num_candidates = candidates.len();
  let kept = non_max_suppression(candidates, iou_threshold);

  debug!("置信度过滤后 {} 个, NMS 后 {} 个", num_candidates, kept.len());

  DetectResult {
    items: kept.into_boxed_slice(),
  }
}
