// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_file_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法读取图像文件: {0}")]
  IoError(#[from] std::io::Error),
}

/// `image:///path/to/file.jpg` 形式的单张图像输入，产出文件的原始字节
pub struct ImageFileInput {
  path: String,
  bytes: Option<Vec<u8>>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url_file_path(url);
    let bytes = std::fs::read(&path).map_err(|e| {
      error!("读取图像文件失败: {} ({})", path, e);
      e
    })?;
    debug!("读取图像文件: {} ({} 字节)", path, bytes.len());

    Ok(ImageFileInput {
      path,
      bytes: Some(bytes),
    })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &str {
    &self.path
  }
}

/// 只产出一次文件内容
impl Iterator for ImageFileInput {
  type Item = Vec<u8>;

  fn next(&mut self) -> Option<Self::Item> {
    self.bytes.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_file_bytes_once() {
    let path = std::env::temp_dir().join("fenjian_read_image_file.bin");
    std::fs::write(&path, [1u8, 2, 3]).unwrap();
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();

    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.path(), path.display().to_string());
    assert_eq!(input.next(), Some(vec![1, 2, 3]));
    assert_eq!(input.next(), None);
    std::fs::remove_file(path).ok();
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("video:///tmp/a.mp4").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch(_))
    ));
  }
}
