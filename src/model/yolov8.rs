// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use std::collections::HashMap;
use std::path::Path;

use image::RgbImage;
use ndarray::{Array4, ArrayView2, Axis, CowArray, Ix3};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::{Session, builder::GraphOptimizationLevel};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{
    Accelerator, DetectItem, DetectResult, Model, Thresholds,
    labels::{load_labels, parse_ultralytics_names},
    postprocess::{Letterbox, nms},
  },
  url_file_path,
};

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_BOX_ROWS: usize = 4;
const YOLOV8_STRIDE: u32 = 32;

#[derive(Debug)]
pub struct Yolov8 {
  session: Session,
  names: Vec<String>,
  input_size: u32,
  accelerator: Accelerator,
}

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("输出形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

pub struct Yolov8Builder {
  model_path: String,
  labels_path: Option<String>,
  input_size: u32,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query: HashMap<_, _> = url.query_pairs().collect();
    let input_size = match query.get("size") {
      Some(size) => size
        .parse::<u32>()
        .ok()
        .filter(|&s| s > 0 && s % YOLOV8_STRIDE == 0)
        .ok_or_else(|| {
          Yolov8Error::ModelPathError(format!(
            "无效的输入尺寸: {}，必须是 {} 的正整数倍",
            size, YOLOV8_STRIDE
          ))
        })?,
      None => YOLOV8_INPUT_SIZE,
    };

    Ok(Yolov8Builder {
      model_path: url_file_path(url),
      labels_path: query.get("labels").map(|p| p.to_string()),
      input_size,
    })
  }
}

impl Yolov8Builder {
  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    info!("加载模型文件: {}", self.model_path);
    if !Path::new(&self.model_path).is_file() {
      return Err(Yolov8Error::ModelLoadError(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("模型文件不存在: {}", self.model_path),
      )));
    }

    let cuda = CUDAExecutionProvider::default();
    let accelerator = match cuda.is_available() {
      Ok(true) => Accelerator::named("CUDA"),
      Ok(false) => {
        warn!("GPU 不可用，使用 CPU 推理（速度较慢）");
        Accelerator::cpu()
      }
      Err(e) => {
        warn!("查询 CUDA 可用性失败: {}，使用 CPU 推理", e);
        Accelerator::cpu()
      }
    };

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_execution_providers([cuda.build()])?
      .commit_from_file(&self.model_path)?;

    let names = match &self.labels_path {
      Some(path) => load_labels(path).map_err(Yolov8Error::ModelLoadError)?,
      None => metadata_names(&session),
    };
    if names.is_empty() {
      warn!("未找到类别名称，检测结果将使用类别编号");
    }

    debug!("模型输入数量: {}", session.inputs.len());
    debug!("模型输出数量: {}", session.outputs.len());
    if session.outputs.is_empty() {
      return Err(Yolov8Error::ModelInvalid("模型没有输出".to_string()));
    }

    info!("模型加载完成: {} 个类别", names.len());
    Ok(Yolov8 {
      session,
      names,
      input_size: self.input_size,
      accelerator,
    })
  }
}

fn metadata_names(session: &Session) -> Vec<String> {
  match session.metadata().and_then(|m| m.custom("names")) {
    Ok(Some(raw)) => parse_ultralytics_names(&raw).unwrap_or_else(|| {
      warn!("无法解析模型元数据中的类别名称: {}", raw);
      Vec::new()
    }),
    Ok(None) => Vec::new(),
    Err(e) => {
      warn!("读取模型元数据失败: {}", e);
      Vec::new()
    }
  }
}

fn to_nchw_tensor(image: &RgbImage) -> Array4<f32> {
  let (width, height) = image.dimensions();
  let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
  for (x, y, pixel) in image.enumerate_pixels() {
    for c in 0..3 {
      tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }
  tensor
}

/// 解码 `[4 + 类别数, 候选框数]` 形状的输出，前四行为 cx, cy, w, h
pub(crate) fn decode_predictions(preds: ArrayView2<f32>, confidence: f32) -> Vec<DetectItem> {
  let mut items = Vec::new();
  if preds.nrows() <= YOLOV8_BOX_ROWS {
    return items;
  }

  for column in preds.axis_iter(Axis(1)) {
    let (class_id, score) = column
      .iter()
      .skip(YOLOV8_BOX_ROWS)
      .enumerate()
      .fold((0usize, f32::MIN), |(best_id, best), (id, &score)| {
        if score > best { (id, score) } else { (best_id, best) }
      });

    if score <= confidence {
      continue;
    }

    let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }
  items
}

impl Model for Yolov8 {
  type Error = Yolov8Error;

  fn infer(&self, input: &RgbFrame, thresholds: &Thresholds) -> Result<DetectResult, Self::Error> {
    debug!("预处理输入图像 {}x{}", input.width(), input.height());
    let letterbox = Letterbox::new(input.width(), input.height(), self.input_size, self.input_size);
    let padded = letterbox.apply(input);
    let tensor = CowArray::from(to_nchw_tensor(&padded));

    debug!("执行模型推理");
    let outputs = self.session.run(ort::inputs![tensor.view()]?)?;
    let output = outputs[0].try_extract_tensor::<f32>()?;
    let output = output.into_dimensionality::<Ix3>()?;
    debug!("模型输出形状: {:?}", output.shape());

    let preds = output.index_axis(Axis(0), 0);
    let candidates = decode_predictions(preds, thresholds.confidence);
    debug!("置信度过滤后候选框: {}", candidates.len());

    let items: Vec<_> = nms(candidates, thresholds.iou)
      .into_iter()
      .map(|item| DetectItem {
        bbox: letterbox.restore(item.bbox),
        ..item
      })
      .collect();

    debug!("检测到 {} 个物体", items.len());
    Ok(items.into())
  }

  fn class_name(&self, class_id: u32) -> Option<&str> {
    self
      .names
      .get(class_id as usize)
      .map(String::as_str)
      .filter(|name| !name.is_empty())
  }

  fn accelerator(&self) -> Accelerator {
    self.accelerator.clone()
  }

  fn name(&self) -> &str {
    "YOLOv8 (ONNX Runtime)"
  }
}
