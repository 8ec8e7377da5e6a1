// 该文件是 Masaike （马赛克） 项目的一部分。
// src/main.rs - 人脸像素化命令行程序
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use masaike::{
  FacePixelizer, FromUrl, PixelizerConfig, ScoreKind,
  input::InputWrapper,
  model::ReplayDetectorBuilder,
  output::OutputWrapper,
  task::{BatchTask, ContinuousTask, OneShotTask, Task},
};

/// Masaike 人脸像素化
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器输出来源，例如 replay:///path/detections.json
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 输入来源，例如 image:///a.jpg 或 folder:///frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///out-{index}.png 或 folder:///records?record
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// JSON 配置文件，命令行参数会覆盖其中的同名字段
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 网络输入画布边长
  #[arg(long, value_name = "SIZE")]
  pub input_size: Option<u32>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub score_threshold: Option<f32>,
  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou_threshold: Option<f32>,
  /// 每个轴上的像素块数量
  #[arg(long, value_name = "BLOCKS")]
  pub blocks: Option<u32>,
  /// 检测器输出的是未归一化的 logits
  #[arg(long)]
  pub logits: bool,

  /// 只处理第一帧
  #[arg(long, conflicts_with = "batch")]
  pub one_shot: bool,
  /// 按批并行处理，每批帧数
  #[arg(long, value_name = "BATCH")]
  pub batch: Option<usize>,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub max_frames: Option<usize>,
}

impl Args {
  fn pixelizer_config(&self) -> Result<PixelizerConfig> {
    let mut config = match &self.config {
      Some(path) => {
        info!("配置文件: {}", path.display());
        PixelizerConfig::from_json_file(path)?
      }
      None => PixelizerConfig::default(),
    };

    if let Some(input_size) = self.input_size {
      config = config.input_size(input_size);
    }
    if let Some(threshold) = self.score_threshold {
      config = config.score_threshold(threshold);
    }
    if let Some(threshold) = self.iou_threshold {
      config = config.iou_threshold(threshold);
    }
    if let Some(blocks) = self.blocks {
      config = config.blocks(blocks);
    }
    if self.logits {
      config = config.score_kind(ScoreKind::Logits);
    }

    Ok(config)
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args = Args::parse();

  info!("检测器: {}", args.detector);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = args.pixelizer_config()?;
  let pixelizer = FacePixelizer::new(config)?;
  let detector = ReplayDetectorBuilder::from_url(&args.detector)?
    .layout(
      pixelizer.config().anchors.clone(),
      pixelizer.config().input_size,
    )
    .build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  if args.one_shot {
    OneShotTask.run_task(input, detector, &pixelizer, output)?;
  } else if let Some(batch) = args.batch {
    BatchTask::default()
      .with_batch_size(batch)
      .with_frame_number(args.max_frames)
      .run_task(input, detector, &pixelizer, output)?;
  } else {
    ContinuousTask::default()
      .with_frame_number(args.max_frames)
      .run_task(input, detector, &pixelizer, output)?;
  }

  Ok(())
}
