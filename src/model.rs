// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::RgbFrame};

pub mod labels;
pub mod postprocess;

#[cfg(feature = "model_onnx")]
mod yolov8;
#[cfg(feature = "model_onnx")]
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error};

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

/// 置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
/// NMS IoU 阈值
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  pub confidence: f32,
  pub iou: f32,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE_THRESHOLD,
      iou: DEFAULT_IOU_THRESHOLD,
    }
  }
}

/// 推理设备信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accelerator {
  pub available: bool,
  pub name: String,
}

impl Accelerator {
  pub fn cpu() -> Self {
    Self {
      available: false,
      name: "N/A".to_string(),
    }
  }

  pub fn named(name: impl Into<String>) -> Self {
    Self {
      available: true,
      name: name.into(),
    }
  }
}

pub trait Model {
  type Error;

  fn infer(&self, input: &RgbFrame, thresholds: &Thresholds) -> Result<DetectResult, Self::Error>;

  fn class_name(&self, class_id: u32) -> Option<&str>;

  fn accelerator(&self) -> Accelerator {
    Accelerator::cpu()
  }

  fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，输入图像的像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_onnx")]
  #[error("YOLOv8 模型错误: {0}")]
  Yolov8Error(#[from] Yolov8Error),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
  #[error("不支持的模型方案: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择推理后端
pub enum ModelWrapper {
  #[cfg(feature = "model_onnx")]
  Yolov8(Yolov8),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_onnx")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == Yolov8Builder::SCHEME {
        let model = Yolov8Builder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Yolov8(model));
      }
    }
    #[cfg(feature = "model_yolo26")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == Yolo26Builder::SCHEME {
        let model = Yolo26Builder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Yolo26(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Error = ModelError;

  fn infer(&self, input: &RgbFrame, thresholds: &Thresholds) -> Result<DetectResult, Self::Error> {
    match self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::Yolov8(model) => model.infer(input, thresholds).map_err(ModelError::from),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.infer(input, thresholds).map_err(ModelError::from),
      #[allow(unreachable_patterns)]
      _ => unreachable!("没有启用任何模型后端"),
    }
  }

  fn class_name(&self, class_id: u32) -> Option<&str> {
    match self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::Yolov8(model) => model.class_name(class_id),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.class_name(class_id),
      #[allow(unreachable_patterns)]
      _ => None,
    }
  }

  fn accelerator(&self) -> Accelerator {
    match self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::Yolov8(model) => model.accelerator(),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.accelerator(),
      #[allow(unreachable_patterns)]
      _ => Accelerator::cpu(),
    }
  }

  fn name(&self) -> &str {
    match self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::Yolov8(model) => model.name(),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model.name(),
      #[allow(unreachable_patterns)]
      _ => "none",
    }
  }
}
