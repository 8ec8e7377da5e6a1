// 该文件是 Masaike （马赛克） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, pipeline::Redaction};

/// 路径中的帧序号占位符
const INDEX_PLACEHOLDER: &str = "{index}";

/// 把像素化后的图像保存到文件
///
/// 路径中含 `{index}` 时按帧序号替换，否则每帧覆盖同一文件。
pub struct SaveImageFileOutput {
  path: String,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    // url 会把 `{` `}` 百分号编码
    let path = uri.path().replace("%7B", "{").replace("%7D", "}");
    Ok(SaveImageFileOutput { path })
  }
}

impl SaveImageFileOutput {
  fn frame_path(&self, index: usize) -> PathBuf {
    PathBuf::from(self.path.replace(INDEX_PLACEHOLDER, &index.to_string()))
  }
}

impl Render<Redaction> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, result: &Redaction) -> Result<(), Self::Error> {
    let path = self.frame_path(result.index);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    result.image.save(&path)?;

    info!(
      "保存图像到文件: {} ({} 个人脸)",
      path.display(),
      result.faces.len()
    );

    Ok(())
  }
}
