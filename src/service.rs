// 该文件是 Fenjian （分拣） 项目的一部分。
// src/service.rs - 垃圾检测服务
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

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl,
  category::{CategoryError, CategoryMapping, GeneralCategory},
  input::{InputError, decode_image},
  model::{Accelerator, DetectItem, Model, ModelError, ModelWrapper, Thresholds},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StartupError {
  #[error("类别映射加载失败: {0}")]
  Mapping(#[from] CategoryError),
  #[error("模型加载失败: {0}")]
  Model(#[from] ModelError),
}

#[derive(Error, Debug)]
pub enum ServiceError {
  #[error("服务初始化失败: {0}")]
  Startup(#[from] StartupError),
  #[error("无效的输入图像: {0}")]
  InvalidInput(#[from] InputError),
  #[error("模型推理失败: {0}")]
  Inference(#[source] BoxError),
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub bbox_xyxy: [f32; 4],
  pub confidence: f32,
  pub specific_name: String,
  pub general_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
  pub detection_count: usize,
  pub detections: Vec<Detection>,
  pub inference_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
  pub total_classes: usize,
  pub specific_categories: Vec<String>,
  pub general_categories: BTreeMap<GeneralCategory, usize>,
  pub mapping: BTreeMap<String, GeneralCategory>,
}

/// 持有模型与类别映射，启动时构造一次，之后只读共享
pub struct DetectionService<M> {
  model: M,
  mapping: CategoryMapping,
  thresholds: Thresholds,
}

impl DetectionService<ModelWrapper> {
  /// 加载类别映射与模型；任一缺失都会返回 [`ServiceError::Startup`]
  pub fn initialize(model_url: &Url, mapping_path: impl AsRef<Path>) -> Result<Self, ServiceError> {
    let mapping = CategoryMapping::load(mapping_path).map_err(StartupError::from)?;

    info!("加载模型: {}", model_url);
    let model = ModelWrapper::from_url(model_url).map_err(|e| {
      error!("模型加载失败: {}", e);
      StartupError::from(e)
    })?;
    info!("模型加载完成: {}", model.name());

    Ok(Self::new(model, mapping))
  }
}

impl<M: Model> DetectionService<M> {
  pub fn new(model: M, mapping: CategoryMapping) -> Self {
    let accelerator = model.accelerator();
    if accelerator.available {
      info!("使用加速设备: {}", accelerator.name);
    }
    Self {
      model,
      mapping,
      thresholds: Thresholds::default(),
    }
  }

  pub fn model_name(&self) -> &str {
    self.model.name()
  }

  pub fn accelerator(&self) -> Accelerator {
    self.model.accelerator()
  }

  /// 服务只能在两者都加载成功后构造，因此这两项总为真
  pub fn model_loaded(&self) -> bool {
    true
  }

  pub fn category_mapping_loaded(&self) -> bool {
    true
  }

  pub fn detect(&self, image_bytes: &[u8]) -> Result<DetectionResult, ServiceError>
  where
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let frame = decode_image(image_bytes)?;
    info!("处理图像: {}x{}", frame.width(), frame.height());

    let now = Instant::now();
    let result = self.model.infer(&frame, &self.thresholds).map_err(|e| {
      error!("推理出错: {}", e);
      ServiceError::Inference(Box::new(e))
    })?;
    let elapsed = now.elapsed();

    let detections: Vec<_> = result.items.iter().map(|item| self.annotate(item)).collect();
    let inference_time_ms = round_ms(elapsed.as_secs_f64() * 1000.0);

    info!(
      "检测完成: {} 个物体 | 推理耗时: {:.2}ms",
      detections.len(),
      inference_time_ms
    );

    Ok(DetectionResult {
      detection_count: detections.len(),
      detections,
      inference_time_ms,
    })
  }

  pub fn list_categories(&self) -> CategorySummary {
    CategorySummary {
      total_classes: self.mapping.len(),
      specific_categories: self.mapping.labels().map(str::to_string).collect(),
      general_categories: self.mapping.counts(),
      mapping: self
        .mapping
        .iter()
        .map(|(label, category)| (label.to_string(), category))
        .collect(),
    }
  }

  fn annotate(&self, item: &DetectItem) -> Detection {
    let specific_name = self
      .model
      .class_name(item.class_id)
      .map(str::to_string)
      .unwrap_or_else(|| format!("class_{}", item.class_id));
    let general_category = self.mapping.lookup(&specific_name).to_string();

    let [x1, y1, x2, y2] = item.bbox;
    let confidence = if item.score.is_nan() {
      0.0
    } else {
      item.score.clamp(0.0, 1.0)
    };

    Detection {
      bbox_xyxy: [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)],
      confidence,
      specific_name,
      general_category,
    }
  }
}

fn round_ms(ms: f64) -> f64 {
  ((ms * 100.0).round() / 100.0).max(0.0)
}
