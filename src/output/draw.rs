// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output/draw.rs - 检测框绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::category::GeneralCategory;
use crate::service::{Detection, DetectionResult};

const BOX_THICKNESS: i32 = 2;

/// 按垃圾大类着色的检测框绘制器
#[derive(Debug, Clone)]
pub struct Draw {
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
    }
  }
}

pub fn category_color(category: &str) -> [u8; 3] {
  match category.parse::<GeneralCategory>() {
    Ok(GeneralCategory::Recycle) => [0, 120, 255],
    Ok(GeneralCategory::Trash) => [128, 128, 128],
    Ok(GeneralCategory::Hazardous) => [230, 30, 30],
    Ok(GeneralCategory::Organic) => [40, 180, 60],
    Err(_) => [255, 200, 0],
  }
}

impl Draw {
  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let [x1, y1, x2, y2] = detection.bbox_xyxy;
    let x_min = (x1.floor() as i32).clamp(0, w - 1);
    let y_min = (y1.floor() as i32).clamp(0, h - 1);
    let x_max = (x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (y2.ceil() as i32).clamp(0, h - 1);

    let color = Rgb(category_color(&detection.general_category));
    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  pub fn draw_result(&self, image: &mut RgbImage, result: &DetectionResult) {
    for detection in &result.detections {
      self.draw_detection(image, detection);
    }
  }
}
