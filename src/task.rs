// 该文件是 Masaike （马赛克） 项目的一部分。
// src/task.rs - 任务调度
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

use std::{sync::mpsc::Receiver, thread, time::Duration};
use tracing::{info, warn};

use crate::{
  frame::Frame,
  model::{Model, RawDetections},
  output::Render,
  pipeline::{FacePixelizer, Redaction},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    model: M,
    pixelizer: &FacePixelizer,
    output: O,
  ) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: Model<Input = Frame, Output = RawDetections, Error = ME>,
  O: Render<Redaction, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    model: M,
    pixelizer: &FacePixelizer,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let raw = model.infer(&frame)?;
    let redaction = pixelizer.process_frame(&frame, &raw)?;
    let elapsed = now.elapsed();
    info!(
      "像素化完成，{} 个人脸，耗时: {:.2?}",
      redaction.faces.len(),
      elapsed
    );
    output.render_result(&redaction)?;

    Ok(())
  }
}

/// 注册 Ctrl-C 处理器，收到信号后 30 秒仍未退出则强制结束
///
/// 进程内已有处理器时不再重复注册，返回的通道不会收到信号。
fn interrupt_channel() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = std::sync::mpsc::channel();

  let registered = ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  });

  match registered {
    Ok(()) => Ok(rx),
    Err(ctrlc::Error::MultipleHandlers) => {
      warn!("Ctrl-C 处理器已存在，本任务不响应中断信号");
      Ok(rx)
    }
    Err(e) => Err(anyhow::anyhow!("无法设置 Ctrl-C 处理器: {}", e)),
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: Model<Input = Frame, Output = RawDetections, Error = ME>,
  O: Render<Redaction, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    model: M,
    pixelizer: &FacePixelizer,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let rx = interrupt_channel()?;

    let mut processed = 0usize;
    let mut now = std::time::Instant::now();
    for frame in input {
      processed += 1;
      info!("处理第 {} 帧图像", frame.index);
      let raw = model.infer(&frame)?;
      let redaction = pixelizer.process_frame(&frame, &raw)?;
      let elapsed_a = now.elapsed();
      output.render_result(&redaction)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!(
        "{} 个人脸，耗时: {:.2?} / {:.2?}",
        redaction.faces.len(),
        elapsed_a,
        elapsed_b
      );
      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", processed);
    Ok(())
  }
}

/// 攒满一批后并行像素化
#[derive(Debug)]
pub struct BatchTask {
  batch_size: usize,
  frame_number: Option<usize>,
}

impl Default for BatchTask {
  fn default() -> Self {
    Self {
      batch_size: 8,
      frame_number: None,
    }
  }
}

impl BatchTask {
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  fn flush<M, O>(
    frames: &mut Vec<Frame>,
    model: &M,
    pixelizer: &FacePixelizer,
    output: &O,
  ) -> anyhow::Result<()>
  where
    M: Model<Input = Frame, Output = RawDetections>,
    M::Error: std::error::Error + Sync + Send + 'static,
    O: Render<Redaction>,
    O::Error: std::error::Error + Sync + Send + 'static,
  {
    if frames.is_empty() {
      return Ok(());
    }

    let now = std::time::Instant::now();
    let detections = frames
      .iter()
      .map(|frame| model.infer(frame))
      .collect::<Result<Vec<_>, _>>()?;
    let redactions = pixelizer.process_batch(frames, &detections)?;
    info!("一批 {} 帧处理完成，耗时: {:.2?}", frames.len(), now.elapsed());

    for redaction in &redactions {
      output.render_result(redaction)?;
    }
    frames.clear();
    Ok(())
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: Model<Input = Frame, Output = RawDetections, Error = ME>,
  O: Render<Redaction, Error = RE>,
> Task<I, M, O> for BatchTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    model: M,
    pixelizer: &FacePixelizer,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始批处理任务，批大小 {}", self.batch_size);
    let rx = interrupt_channel()?;

    let limit = self.frame_number.unwrap_or(usize::MAX);
    let mut frames = Vec::with_capacity(self.batch_size);
    for frame in input.take(limit) {
      frames.push(frame);
      if frames.len() >= self.batch_size {
        Self::flush(&mut frames, &model, pixelizer, &output)?;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }
    Self::flush(&mut frames, &model, pixelizer, &output)?;

    info!("任务完成，退出");
    Ok(())
  }
}
