// 该文件是 Masaike （马赛克） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, letterbox::ImageBox, output::Render, pipeline::Redaction,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把人脸框写入与图片同名的 txt 文件，每行 `x1, y1, x2, y2`
pub struct Record;

impl Record {
  pub fn format(faces: &[ImageBox]) -> String {
    faces
      .iter()
      .map(|face| format!("{}, {}, {}, {}", face.x1, face.y1, face.x2, face.y2))
      .collect::<Vec<_>>()
      .join("\n")
  }

  pub fn record(&self, faces: &[ImageBox], path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), Self::format(faces))
  }
}

/// 按日期分目录保存像素化后的帧
///
/// 查询参数 `record` 额外保存人脸框记录，`faces_only` 只保存检测到人脸的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Option<Record>,
  frame_counter: AtomicU16,
  faces_only: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record").then_some(Record);
    let faces_only = uri.query_pairs().any(|(k, _)| k == "faces_only");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      frame_counter: AtomicU16::new(0),
      faces_only,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Redaction> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, result: &Redaction) -> Result<(), Self::Error> {
    if self.faces_only && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    result.image.save(&path)?;
    if let Some(record) = &self.record {
      record.record(&result.faces, &path)?;
    }
    debug!("记录第 {} 帧到 {}", result.index, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_lines_list_each_face() {
    let faces = [
      ImageBox {
        x1: 1,
        y1: 2,
        x2: 30,
        y2: 40,
      },
      ImageBox {
        x1: 5,
        y1: 6,
        x2: 7,
        y2: 8,
      },
    ];
    assert_eq!(Record::format(&faces), "1, 2, 30, 40\n5, 6, 7, 8");
    assert_eq!(Record::format(&[]), "");
  }

  #[test]
  fn query_flags_are_parsed() {
    let url = url::Url::parse("folder:///tmp/rec?record&faces_only").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.record.is_some());
    assert!(output.faces_only);
    assert_eq!(output.directory, PathBuf::from("/tmp/rec"));

    let url = url::Url::parse("folder:///tmp/rec").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.record.is_none());
    assert!(!output.faces_only);
  }

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        files.extend(files_under(&path));
      } else {
        files.push(path);
      }
    }
    files.sort();
    files
  }

  fn redaction(index: usize, faces: Vec<ImageBox>) -> Redaction {
    Redaction {
      index,
      image: image::RgbImage::new(8, 6),
      faces: faces.into_boxed_slice(),
    }
  }

  #[test]
  fn writes_dated_frames_and_box_records() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!(
      "folder://{}?record&faces_only",
      dir.path().display()
    ))
    .unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output.render_result(&redaction(0, Vec::new())).unwrap();
    assert!(files_under(dir.path()).is_empty());

    let face = ImageBox {
      x1: 1,
      y1: 2,
      x2: 5,
      y2: 6,
    };
    output.render_result(&redaction(1, vec![face])).unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    let image_path = files
      .iter()
      .find(|path| path.extension().is_some_and(|ext| ext == "png"))
      .unwrap();
    // <根目录>/年/月/日/时-分-秒-序号.png
    let relative = image_path.strip_prefix(dir.path()).unwrap();
    assert_eq!(relative.components().count(), 4);
    assert!(relative.to_string_lossy().ends_with("-0001.png"));
    assert_eq!(image::open(image_path).unwrap().to_rgb8().dimensions(), (8, 6));
    assert_eq!(
      std::fs::read_to_string(image_path.with_extension("txt")).unwrap(),
      "1, 2, 5, 6"
    );
  }

  #[test]
  fn saves_every_frame_without_faces_only() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output.render_result(&redaction(0, Vec::new())).unwrap();
    output.render_result(&redaction(1, Vec::new())).unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    assert!(
      files
        .iter()
        .all(|path| path.extension().is_some_and(|ext| ext == "png"))
    );
  }
}
