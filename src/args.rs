// 该文件是 Fenjian （分拣） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::server::{DEFAULT_MAX_UPLOAD_BYTES, ServerConfig};

pub const DEFAULT_MODEL_URL: &str = "onnx:models/garbage_yolov8s/weights/best.onnx";
pub const DEFAULT_MAPPING_PATH: &str = "configs/category_mapping.json";

/// Fenjian 垃圾检测服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// 支持格式:
  /// - ONNX: onnx:<path>.onnx[?labels=<file>&size=<pixels>]
  /// - RKNN: yolo26:<path>.rknn[?labels=<file>]
  #[arg(long, value_name = "MODEL", default_value = DEFAULT_MODEL_URL)]
  pub model: Url,

  /// 类别映射文件路径（JSON，顶层为 mapping 对象）
  #[arg(long, value_name = "FILE", default_value = DEFAULT_MAPPING_PATH)]
  pub mapping: PathBuf,

  /// 监听地址
  #[arg(long, default_value = "0.0.0.0")]
  pub host: String,

  /// 监听端口
  #[arg(long, default_value = "8000")]
  pub port: u16,

  /// HTTP 工作线程数（默认与 CPU 核数一致）
  #[arg(long, value_name = "COUNT")]
  pub workers: Option<usize>,

  /// 单次上传允许的最大字节数
  #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
  pub max_upload_bytes: usize,
}

impl Args {
  pub fn server_config(&self) -> ServerConfig {
    ServerConfig {
      host: self.host.clone(),
      port: self.port,
      workers: self.workers,
      max_upload_bytes: self.max_upload_bytes,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let args = Args::parse_from(["fenjian"]);
    assert_eq!(args.model.scheme(), "onnx");
    assert_eq!(args.model.path(), "models/garbage_yolov8s/weights/best.onnx");
    assert_eq!(args.mapping, PathBuf::from(DEFAULT_MAPPING_PATH));
    assert_eq!(args.port, 8000);
    assert_eq!(args.workers, None);
    assert_eq!(args.server_config().max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
  }

  #[test]
  fn overrides() {
    let args = Args::parse_from([
      "fenjian",
      "--model",
      "yolo26:///opt/models/garbage.rknn",
      "--port",
      "9000",
      "--workers",
      "2",
    ]);
    assert_eq!(args.model.scheme(), "yolo26");
    assert_eq!(args.port, 9000);
    assert_eq!(args.server_config().workers, Some(2));
  }
}
