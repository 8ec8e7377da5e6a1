// 该文件是 Masaike （马赛克） 项目的一部分。
// src/pipeline.rs - 人脸像素化流水线
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

use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  anchor::AnchorGrid,
  config::{ConfigError, PixelizerConfig},
  frame::Frame,
  letterbox::{ImageBox, Letterbox},
  model::{BoxDecoder, DecodeError, DetectResult, RawDetections, nms},
  redact::Pixelizer,
};

#[derive(Error, Debug)]
pub enum PixelizeError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("检测器输出错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("批大小不一致: 帧 {frames}, 检测结果 {detections}")]
  BatchSizeMismatch { frames: usize, detections: usize },
  #[error("letterbox 缩放系数必须为有限正数, 实际为 {scale}")]
  InvalidLetterbox { scale: f32 },
  #[error("线程池创建失败: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// 一帧的像素化结果
#[derive(Debug, Clone)]
pub struct Redaction {
  /// 帧在输入流中的序号
  pub index: usize,
  /// 像素化后的图像副本，原图不被修改
  pub image: RgbImage,
  /// 实际处理的人脸框（原图坐标）
  pub faces: Box<[ImageBox]>,
}

impl Redaction {
  pub fn is_empty(&self) -> bool {
    self.faces.is_empty()
  }
}

/// 解码 → 过滤与抑制 → 去 letterbox → 像素化
///
/// 先验框网格按画布尺寸共享，批内每帧相互独立，可并行处理。
pub struct FacePixelizer {
  config: PixelizerConfig,
  grid: Arc<AnchorGrid>,
  decoder: BoxDecoder,
  pixelizer: Pixelizer,
  pool: Option<rayon::ThreadPool>,
}

impl FacePixelizer {
  pub fn new(config: PixelizerConfig) -> Result<Self, PixelizeError> {
    config.validate()?;

    let grid = AnchorGrid::shared(config.input_size, config.input_size, &config.anchors);
    let pool = match config.parallel.max_threads {
      Some(threads) => Some(
        rayon::ThreadPoolBuilder::new()
          .num_threads(threads)
          .build()?,
      ),
      None => None,
    };

    info!(
      "像素化流水线就绪: 画布 {}, 先验框 {} 个, 置信度阈值 {}, IoU 阈值 {}, 像素块 {}",
      config.input_size,
      grid.len(),
      config.score_threshold,
      config.iou_threshold,
      config.blocks
    );

    Ok(Self {
      decoder: BoxDecoder::from_config(&config),
      pixelizer: Pixelizer::new(config.blocks),
      grid,
      pool,
      config,
    })
  }

  pub fn config(&self) -> &PixelizerConfig {
    &self.config
  }

  pub fn anchor_grid(&self) -> &Arc<AnchorGrid> {
    &self.grid
  }

  /// 画布坐标下的最终人脸框，按分数降序
  pub fn detect(&self, raw: &RawDetections) -> Result<DetectResult, PixelizeError> {
    let items = self.decoder.decode(&self.grid, raw)?;
    Ok(nms::suppress(
      items,
      self.config.score_threshold,
      self.config.iou_threshold,
    ))
  }

  /// 原图坐标下的人脸框
  pub fn locate(
    &self,
    raw: &RawDetections,
    letterbox: &Letterbox,
    image_width: u32,
    image_height: u32,
  ) -> Result<Vec<ImageBox>, PixelizeError> {
    if !letterbox.is_valid() {
      error!("letterbox 参数无效: {:?}", letterbox);
      return Err(PixelizeError::InvalidLetterbox {
        scale: letterbox.scale,
      });
    }

    let result = self.detect(raw)?;
    Ok(
      result
        .items
        .iter()
        .map(|item| letterbox.restore(&item.bbox, image_width, image_height))
        .collect(),
    )
  }

  /// 在调用方独占的图像上原地像素化
  pub fn apply(&self, image: &mut RgbImage, faces: &[ImageBox]) {
    for face in faces {
      self.pixelizer.pixelize(image, face);
    }
  }

  /// 处理单帧，返回新的图像缓冲
  pub fn process_frame(
    &self,
    frame: &Frame,
    raw: &RawDetections,
  ) -> Result<Redaction, PixelizeError> {
    let letterbox = frame.letterbox_for(self.config.input_size);
    let faces = self.locate(raw, &letterbox, frame.width(), frame.height())?;

    let mut image = frame.image.clone();
    self.apply(&mut image, &faces);

    debug!("第 {} 帧: 像素化 {} 个人脸", frame.index, faces.len());

    Ok(Redaction {
      index: frame.index,
      image,
      faces: faces.into_boxed_slice(),
    })
  }

  /// 处理一批帧，输出顺序与输入一致；任一帧出错则整批失败
  pub fn process_batch(
    &self,
    frames: &[Frame],
    detections: &[RawDetections],
  ) -> Result<Vec<Redaction>, PixelizeError> {
    if frames.len() != detections.len() {
      return Err(PixelizeError::BatchSizeMismatch {
        frames: frames.len(),
        detections: detections.len(),
      });
    }

    if frames.len() <= self.config.parallel.batch_threshold {
      return frames
        .iter()
        .zip(detections)
        .map(|(frame, raw)| self.process_frame(frame, raw))
        .collect();
    }

    let run = || {
      frames
        .par_iter()
        .zip(detections)
        .map(|(frame, raw)| self.process_frame(frame, raw))
        .collect::<Result<Vec<_>, _>>()
    };

    match &self.pool {
      Some(pool) => pool.install(run),
      None => run(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    anchor::AnchorLayout,
    config::ParallelPolicy,
    letterbox::Axis,
  };
  use image::Rgb;

  // 64x64 画布, 步长 32, 每个单元一个 32 像素先验框 → 4 个先验框
  fn small_config() -> PixelizerConfig {
    PixelizerConfig::default()
      .input_size(64)
      .anchors(AnchorLayout {
        steps: vec![32],
        min_sizes: vec![vec![32]],
        clip: false,
      })
      .blocks(2)
  }

  fn raw_with_foreground(foreground: [f32; 4]) -> RawDetections {
    RawDetections {
      regressions: vec![[0.0; 4]; 4],
      scores: foreground.iter().map(|&fg| [1.0 - fg, fg]).collect(),
    }
  }

  fn checkerboard(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
      if (x + y) % 2 == 0 {
        Rgb([255, 255, 255])
      } else {
        Rgb([0, 0, 0])
      }
    })
  }

  #[test]
  fn rejects_invalid_config_at_construction() {
    let config = PixelizerConfig::default().blocks(0);
    assert!(matches!(
      FacePixelizer::new(config),
      Err(PixelizeError::Config(ConfigError::InvalidBlocks(0)))
    ));
  }

  #[test]
  fn no_faces_leaves_image_identical() {
    let pixelizer = FacePixelizer::new(small_config()).unwrap();
    let frame = Frame::new(0, checkerboard(64));
    let redaction = pixelizer
      .process_frame(&frame, &raw_with_foreground([0.1, 0.2, 0.3, 0.4]))
      .unwrap();
    assert!(redaction.is_empty());
    assert_eq!(redaction.image, frame.image);
  }

  #[test]
  fn detected_anchor_is_pixelized_on_a_copy() {
    let pixelizer = FacePixelizer::new(small_config()).unwrap();
    let frame = Frame::new(3, checkerboard(64));
    let redaction = pixelizer
      .process_frame(&frame, &raw_with_foreground([0.9, 0.0, 0.0, 0.0]))
      .unwrap();

    // 第一个先验框中心 (16, 16)，边长 32
    assert_eq!(redaction.index, 3);
    assert_eq!(
      &redaction.faces[..],
      &[ImageBox {
        x1: 0,
        y1: 0,
        x2: 32,
        y2: 32
      }]
    );
    // 棋盘格 16x16 单元的均值为 127
    assert_eq!(*redaction.image.get_pixel(5, 6), Rgb([127, 127, 127]));
    assert_eq!(redaction.image.get_pixel(40, 40), frame.image.get_pixel(40, 40));
    assert_eq!(*frame.image.get_pixel(5, 6), Rgb([0, 0, 0]));
  }

  #[test]
  fn anchor_count_mismatch_fails_fast() {
    let pixelizer = FacePixelizer::new(small_config()).unwrap();
    let frame = Frame::new(0, checkerboard(64));
    let raw = RawDetections {
      regressions: vec![[0.0; 4]; 3],
      scores: vec![[0.0, 1.0]; 3],
    };
    assert!(matches!(
      pixelizer.process_frame(&frame, &raw),
      Err(PixelizeError::Decode(DecodeError::AnchorCountMismatch { .. }))
    ));
  }

  #[test]
  fn batch_preserves_order_and_rejects_mismatched_lengths() {
    let config = small_config().parallel(ParallelPolicy {
      max_threads: Some(2),
      batch_threshold: 0,
    });
    let pixelizer = FacePixelizer::new(config).unwrap();

    let frames: Vec<Frame> = (0..5)
      .map(|i| Frame::new(i, checkerboard(64 + i as u32 * 16)))
      .collect();
    let detections: Vec<RawDetections> = (0..5)
      .map(|i| {
        if i % 2 == 0 {
          raw_with_foreground([0.9, 0.0, 0.0, 0.0])
        } else {
          raw_with_foreground([0.0; 4])
        }
      })
      .collect();

    let redactions = pixelizer.process_batch(&frames, &detections).unwrap();
    assert_eq!(redactions.len(), 5);
    for (i, redaction) in redactions.iter().enumerate() {
      assert_eq!(redaction.index, i);
      assert_eq!(redaction.image.dimensions(), frames[i].image.dimensions());
      assert_eq!(redaction.faces.len(), if i % 2 == 0 { 1 } else { 0 });
    }

    assert!(matches!(
      pixelizer.process_batch(&frames, &detections[..4]),
      Err(PixelizeError::BatchSizeMismatch {
        frames: 5,
        detections: 4
      })
    ));
  }

  #[test]
  fn explicit_letterbox_overrides_the_computed_one() {
    let pixelizer = FacePixelizer::new(small_config()).unwrap();
    let raw = raw_with_foreground([0.9, 0.0, 0.0, 0.0]);

    // 128x128 图像映射到 64 画布时缩放 0.5，先验框 (0, 0, 32, 32) 还原为 (0, 0, 64, 64)
    let computed = Frame::new(0, checkerboard(128));
    let redaction = pixelizer.process_frame(&computed, &raw).unwrap();
    assert_eq!(
      &redaction.faces[..],
      &[ImageBox {
        x1: 0,
        y1: 0,
        x2: 64,
        y2: 64
      }]
    );

    // 外部预处理实际用了 x 方向 16 像素补边、缩放 0.25
    let explicit = Frame::new(0, checkerboard(128)).with_letterbox(Letterbox {
      scale: 0.25,
      pad: 16,
      long_axis: Axis::Height,
    });
    let redaction = pixelizer.process_frame(&explicit, &raw).unwrap();
    assert_eq!(
      &redaction.faces[..],
      &[ImageBox {
        x1: 0,
        y1: 0,
        x2: 64,
        y2: 128
      }]
    );
  }

  #[test]
  fn invalid_explicit_letterbox_is_rejected() {
    let pixelizer = FacePixelizer::new(small_config()).unwrap();
    let raw = raw_with_foreground([0.9, 0.0, 0.0, 0.0]);
    for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
      let frame = Frame::new(0, checkerboard(64)).with_letterbox(Letterbox {
        scale,
        pad: 0,
        long_axis: Axis::Width,
      });
      assert!(matches!(
        pixelizer.process_frame(&frame, &raw),
        Err(PixelizeError::InvalidLetterbox { .. })
      ));
    }
  }
}
