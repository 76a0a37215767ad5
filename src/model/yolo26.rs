// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNN 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;
use std::sync::Mutex;

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  input::AsNhwcFrame,
  model::{
    Accelerator, DetectItem, DetectResult, Model, Thresholds,
    labels::load_labels,
    postprocess::{Letterbox, nms},
  },
  url_file_path,
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_INPUT_W: u32 = 640;
const YOLO26_INPUT_H: u32 = 640;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

pub struct Yolo26 {
  context: Mutex<Context>,
  names: Vec<String>,
}

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理上下文不可用")]
  ContextPoisoned,
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: String,
  labels_path: Option<String>,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query: HashMap<_, _> = url.query_pairs().collect();
    Ok(Yolo26Builder {
      model_path: url_file_path(url),
      labels_path: query.get("labels").map(|p| p.to_string()),
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(Yolo26Error::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    let names = match &self.labels_path {
      Some(path) => load_labels(path)?,
      None => Vec::new(),
    };

    info!("模型加载完成: {} 个类别名称", names.len());
    Ok(Yolo26 {
      context: Mutex::new(context),
      names,
    })
  }
}

/// 根据张量大小区分回归和分类输出，回归输出固定为 4 个通道
fn split_reg_cls<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  spatial: usize,
  head_idx: usize,
) -> Option<(&'a [f32], &'a [f32], usize)> {
  let reg_expected = 4 * spatial;
  let (reg, cls) = if tensor1.len() == reg_expected {
    (tensor1, tensor2)
  } else if tensor2.len() == reg_expected {
    debug!("检测头 {}: 输出顺序交换", head_idx);
    (tensor2, tensor1)
  } else {
    error!(
      "检测头 {}: 输出大小不匹配 - 张量1: {}, 张量2: {}, 期望回归: {}",
      head_idx,
      tensor1.len(),
      tensor2.len(),
      reg_expected
    );
    return None;
  };

  if cls.is_empty() || cls.len() % spatial != 0 {
    error!("检测头 {}: 分类输出大小 {} 无效", head_idx, cls.len());
    return None;
  }
  Some((reg, cls, cls.len() / spatial))
}

/// 解码单个检测头，坐标为模型输入尺寸下的像素坐标
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  class_num: usize,
  (map_h, map_w): (usize, usize),
  stride: f32,
  confidence: f32,
  items: &mut Vec<DetectItem>,
) {
  let spatial = map_h * map_w;
  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;

      let (score, class_id) = {
        let mut max_logit = f32::MIN;
        let mut cls_idx = 0usize;
        for c in 0..class_num {
          let logit = cls[c * spatial + idx];
          if logit > max_logit {
            max_logit = logit;
            cls_idx = c;
          }
        }
        (sigmoid(max_logit), cls_idx as u32)
      };

      if score <= confidence {
        continue;
      }

      let grid_x = (w as f32) + 0.5;
      let grid_y = (h as f32) + 0.5;

      let input_w = YOLO26_INPUT_W as f32;
      let input_h = YOLO26_INPUT_H as f32;
      items.push(DetectItem {
        class_id,
        score,
        bbox: [
          ((grid_x - reg[idx]) * stride).clamp(0.0, input_w),
          ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h),
          ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w),
          ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h),
        ],
      });
    }
  }
}

impl Model for Yolo26 {
  type Error = Yolo26Error;

  fn infer(&self, input: &RgbFrame, thresholds: &Thresholds) -> Result<DetectResult, Self::Error> {
    let letterbox = Letterbox::new(input.width(), input.height(), YOLO26_INPUT_W, YOLO26_INPUT_H);
    let padded = RgbFrame::from(letterbox.apply(input));
    let context = self
      .context
      .lock()
      .map_err(|_| Yolo26Error::ContextPoisoned)?;

    debug!("设置模型输入");
    context.set_input(
      0,
      padded.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    context.run()?;

    let output = context.get_outputs()?;
    let mut candidates = Vec::new();

    for (head_idx, (&head_size, stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let tensor1 = output.get_f32(head_idx * 2)?;
      let tensor2 = output.get_f32(head_idx * 2 + 1)?;

      let spatial = head_size.0 * head_size.1;
      let Some((reg, cls, class_num)) = split_reg_cls(tensor1, tensor2, spatial, head_idx) else {
        continue;
      };

      decode_head(
        reg,
        cls,
        class_num,
        head_size,
        stride,
        thresholds.confidence,
        &mut candidates,
      );
    }
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
    Accelerator::named("RKNPU")
  }

  fn name(&self) -> &str {
    "YOLO26 (RKNN)"
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
