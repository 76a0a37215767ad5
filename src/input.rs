// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input.rs - 图像输入与解码
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

use image::DynamicImage;
use thiserror::Error;
use tracing::debug;

use crate::frame::RgbFrame;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法解码图像: {0}")]
  Decode(#[from] image::ImageError),
  #[error("图像为空")]
  Empty,
}

/// 将上传的字节解码为 RGB 帧；带 alpha 通道的图像只保留前三个通道
pub fn decode_image(bytes: &[u8]) -> Result<RgbFrame, InputError> {
  if bytes.is_empty() {
    return Err(InputError::Empty);
  }
  let image = image::load_from_memory(bytes)?;
  Ok(into_rgb_frame(image))
}

pub(crate) fn into_rgb_frame(image: DynamicImage) -> RgbFrame {
  debug!(
    "解码图像: {}x{} {:?}",
    image.width(),
    image.height(),
    image.color()
  );

  let rgb = match image {
    DynamicImage::ImageRgb8(rgb) => rgb,
    other => {
      if other.color().has_alpha() {
        debug!("丢弃 alpha 通道");
      }
      other.into_rgb8()
    }
  };
  RgbFrame::from(rgb)
}
