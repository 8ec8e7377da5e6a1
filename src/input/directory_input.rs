// 该文件是 Masaike （马赛克） 项目的一部分。
// src/input/directory_input.rs - 目录图片序列输入
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

use std::{collections::VecDeque, path::PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::IMAGE_EXTENSIONS};

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名排序逐张读取目录中的图片
///
/// 帧序号是文件在排序列表中的位置。解码失败的文件被跳过，但仍占用一个序号，
/// 后续帧不会错位到相邻的检测结果上。
pub struct DirectoryInput {
  files: VecDeque<PathBuf>,
  next_index: usize,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(url.path())? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();

    info!("目录 {} 中共 {} 张图片", url.path(), files.len());
    Ok(DirectoryInput {
      files: files.into(),
      next_index: 0,
    })
  }
}

fn is_image_file(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    .unwrap_or(false)
}

impl Iterator for DirectoryInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.files.pop_front() {
      let index = self.next_index;
      self.next_index += 1;

      let reader = match ImageReader::open(&path) {
        Ok(reader) => reader,
        Err(e) => {
          error!("无法打开第 {} 帧图片 {}: {}", index, path.display(), e);
          continue;
        }
      };
      let image = match reader.decode() {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
          error!("无法解码第 {} 帧图片 {}: {}", index, path.display(), e);
          continue;
        }
      };

      debug!("读取第 {} 帧: {}", index, path.display());
      return Some(Frame::new(index, image));
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognises_image_extensions() {
    assert!(is_image_file(std::path::Path::new("a/b.JPG")));
    assert!(is_image_file(std::path::Path::new("frame-0001.png")));
    assert!(!is_image_file(std::path::Path::new("frame-0001.txt")));
    assert!(!is_image_file(std::path::Path::new("noext")));
  }

  #[test]
  fn reads_sorted_images_and_skips_other_files() {
    let dir = tempfile::tempdir().unwrap();
    image::RgbImage::new(4, 3).save(dir.path().join("b.png")).unwrap();
    image::RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let frames: Vec<Frame> = DirectoryInput::from_url(&url).unwrap().collect();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[0].image.dimensions(), (2, 2));
    assert_eq!(frames[1].index, 1);
    assert_eq!(frames[1].image.dimensions(), (4, 3));
  }

  #[test]
  fn broken_file_keeps_its_frame_index() {
    let dir = tempfile::tempdir().unwrap();
    image::RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("b.png"), b"not an image").unwrap();
    image::RgbImage::new(5, 5).save(dir.path().join("c.png")).unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let frames: Vec<(usize, (u32, u32))> = DirectoryInput::from_url(&url)
      .unwrap()
      .map(|frame| (frame.index, frame.image.dimensions()))
      .collect();

    // c.png 是排序后的第 3 个文件，对应第 2 项检测结果
    assert_eq!(frames, vec![(0, (2, 2)), (2, (5, 5))]);
  }
}
