// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/postprocess.rs - 检测后处理
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

use std::cmp::Ordering;

use image::{Rgb, RgbImage, imageops, imageops::FilterType};

use crate::frame::RgbFrame;
use crate::model::DetectItem;

/// 计算两个 xyxy 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut kept: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

/// 模型输入尺寸与原图尺寸之间的缩放关系
/// 灰色填充值，与训练时的预处理一致
pub const LETTERBOX_FILL: u8 = 114;

/// 等比缩放并居中填充到网络输入尺寸，记录还原检测框所需的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub resized_w: u32,
  pub resized_h: u32,
  pub input_w: u32,
  pub input_h: u32,
  pub width: f32,
  pub height: f32,
}

impl Letterbox {
  pub fn new(original_width: usize, original_height: usize, input_w: u32, input_h: u32) -> Self {
    let scale = (input_w as f32 / original_width.max(1) as f32)
      .min(input_h as f32 / original_height.max(1) as f32);
    let resized_w = ((original_width as f32 * scale).round() as u32).clamp(1, input_w);
    let resized_h = ((original_height as f32 * scale).round() as u32).clamp(1, input_h);

    Self {
      scale,
      pad_x: (input_w - resized_w) / 2,
      pad_y: (input_h - resized_h) / 2,
      resized_w,
      resized_h,
      input_w,
      input_h,
      width: original_width as f32,
      height: original_height as f32,
    }
  }

  pub fn apply(&self, frame: &RgbFrame) -> RgbImage {
    let image = frame.to_rgb_image();
    let resized = if image.dimensions() == (self.resized_w, self.resized_h) {
      image
    } else {
      imageops::resize(&image, self.resized_w, self.resized_h, FilterType::Triangle)
    };
    if resized.dimensions() == (self.input_w, self.input_h) {
      return resized;
    }

    let mut canvas = RgbImage::from_pixel(self.input_w, self.input_h, Rgb([LETTERBOX_FILL; 3]));
    imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
    canvas
  }

  /// 将模型输入坐标系下的边界框去掉填充后还原到原图，并限制在图像范围内
  pub fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (pad_x, pad_y) = (self.pad_x as f32, self.pad_y as f32);
    let x1 = ((bbox[0] - pad_x) / self.scale).clamp(0.0, self.width);
    let y1 = ((bbox[1] - pad_y) / self.scale).clamp(0.0, self.height);
    let x2 = ((bbox[2] - pad_x) / self.scale).clamp(0.0, self.width);
    let y2 = ((bbox[3] - pad_y) / self.scale).clamp(0.0, self.height);
    [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
    assert!((half - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    assert_eq!(iou(&[1.0, 1.0, 1.0, 1.0], &[1.0, 1.0, 1.0, 1.0]), 0.0);
  }

  #[test]
  fn nms_keeps_best_of_overlapping_cluster() {
    let kept = nms(
      vec![
        item(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.9, [1.0, 1.0, 11.0, 11.0]),
        item(0, 0.8, [50.0, 50.0, 60.0, 60.0]),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.8);
  }

  #[test]
  fn nms_never_suppresses_across_classes() {
    let kept = nms(
      vec![
        item(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        item(1, 0.8, [0.0, 0.0, 10.0, 10.0]),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn wide_frame_is_padded_vertically() {
    let letterbox = Letterbox::new(1280, 320, 640, 640);
    assert_eq!(letterbox.scale, 0.5);
    assert_eq!((letterbox.resized_w, letterbox.resized_h), (640, 160));
    assert_eq!((letterbox.pad_x, letterbox.pad_y), (0, 240));

    let frame = RgbFrame::from(RgbImage::from_pixel(1280, 320, Rgb([200, 10, 10])));
    let canvas = letterbox.apply(&frame);
    assert_eq!(canvas.dimensions(), (640, 640));
    assert_eq!(canvas.get_pixel(320, 100), &Rgb([LETTERBOX_FILL; 3]));
    assert_eq!(canvas.get_pixel(320, 239), &Rgb([LETTERBOX_FILL; 3]));
    assert_eq!(canvas.get_pixel(320, 240), &Rgb([200, 10, 10]));
    assert_eq!(canvas.get_pixel(320, 399), &Rgb([200, 10, 10]));
    assert_eq!(canvas.get_pixel(320, 400), &Rgb([LETTERBOX_FILL; 3]));
  }

  #[test]
  fn restore_removes_padding_and_clamps() {
    let letterbox = Letterbox::new(1280, 320, 640, 640);
    let bbox = letterbox.restore([10.0, 250.0, 700.0, 400.0]);
    assert_eq!(bbox, [20.0, 20.0, 1280.0, 320.0]);
    // 完全落在填充区域的框退化到图像边缘
    assert_eq!(letterbox.restore([0.0, 0.0, 10.0, 100.0]), [0.0, 0.0, 20.0, 0.0]);
  }

  #[test]
  fn tall_frame_is_padded_horizontally() {
    let letterbox = Letterbox::new(320, 640, 640, 640);
    assert_eq!(letterbox.scale, 1.0);
    assert_eq!((letterbox.resized_w, letterbox.resized_h), (320, 640));
    assert_eq!((letterbox.pad_x, letterbox.pad_y), (160, 0));
    let bbox = letterbox.restore([170.0, 10.0, 480.0, 640.0]);
    assert_eq!(bbox, [10.0, 10.0, 320.0, 640.0]);
  }

  #[test]
  fn restore_orders_corners() {
    let letterbox = Letterbox::new(640, 640, 640, 640);
    assert_eq!(letterbox.restore([30.0, 40.0, 10.0, 20.0]), [10.0, 20.0, 30.0, 40.0]);
  }

  #[test]
  fn square_frame_is_only_scaled() {
    let frame = RgbFrame::with_shape(30, 30);
    let letterbox = Letterbox::new(30, 30, 64, 64);
    assert_eq!((letterbox.pad_x, letterbox.pad_y), (0, 0));
    assert_eq!(letterbox.apply(&frame).dimensions(), (64, 64));
  }
}
