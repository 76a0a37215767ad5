// 该文件是 Fenjian （分拣） 项目的一部分。
// src/server.rs - HTTP 服务
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

use actix_multipart::{Multipart, MultipartError};
use actix_web::{
  HttpResponse, HttpServer, ResponseError, http::StatusCode, middleware, web,
};
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  model::Model,
  service::{DetectionResult, DetectionService, ServiceError},
};

pub const SERVICE_NAME: &str = "Garbage Classification API";
pub const IMAGE_FIELD: &str = "image";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// 单次上传允许的最大字节数
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Invalid file type: {0}. Please upload an image file.")]
  InvalidContentType(String),
  #[error("Missing multipart field 'image'")]
  MissingImage,
  #[error("Upload exceeds {0} bytes")]
  PayloadTooLarge(usize),
  #[error("Malformed multipart payload: {0}")]
  Multipart(String),
  #[error("Error processing image: {0}")]
  Service(#[from] ServiceError),
  #[error("Worker pool error: {0}")]
  Blocking(#[from] actix_web::error::BlockingError),
}

impl From<MultipartError> for ApiError {
  fn from(err: MultipartError) -> Self {
    ApiError::Multipart(err.to_string())
  }
}

impl ResponseError for ApiError {
  fn status_code(&self) -> StatusCode {
    match self {
      ApiError::InvalidContentType(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
      ApiError::MissingImage => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Service(ServiceError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
      ApiError::Service(_) | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
  }
}

#[derive(Serialize)]
struct DetectionResponse {
  status: &'static str,
  #[serde(flatten)]
  result: DetectionResult,
}

async fn index<M: Model + 'static>(service: web::Data<DetectionService<M>>) -> HttpResponse {
  HttpResponse::Ok().json(json!({
    "service": SERVICE_NAME,
    "status": "running",
    "version": env!("CARGO_PKG_VERSION"),
    "model": service.model_name(),
    "endpoints": {
      "detection": "/v1/detect_trash",
      "categories": "/v1/categories",
      "health": "/health",
    },
  }))
}

async fn health<M: Model + 'static>(service: web::Data<DetectionService<M>>) -> HttpResponse {
  let accelerator = service.accelerator();
  HttpResponse::Ok().json(json!({
    "status": "healthy",
    "model_loaded": service.model_loaded(),
    "category_mapping_loaded": service.category_mapping_loaded(),
    "gpu_available": accelerator.available,
    "gpu_name": accelerator.name,
  }))
}

async fn categories<M: Model + 'static>(service: web::Data<DetectionService<M>>) -> HttpResponse {
  HttpResponse::Ok().json(service.list_categories())
}

/// 从 multipart 请求中取出 `image` 字段的全部字节
async fn read_image_field(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
  while let Some(mut field) = payload.try_next().await? {
    if field.name() != Some(IMAGE_FIELD) {
      // 其余字段直接丢弃
      while field.try_next().await?.is_some() {}
      continue;
    }

    let content_type = field
      .content_type()
      .map(|mime| mime.essence_str().to_string())
      .unwrap_or_default();
    if !content_type.starts_with("image/") {
      warn!("拒绝非图像上传: '{}'", content_type);
      return Err(ApiError::InvalidContentType(content_type));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
      if bytes.len() + chunk.len() > limit {
        warn!("上传超过大小限制: {} 字节", limit);
        return Err(ApiError::PayloadTooLarge(limit));
      }
      bytes.extend_from_slice(&chunk);
    }
    return Ok(bytes);
  }
  Err(ApiError::MissingImage)
}

async fn detect_trash<M>(
  service: web::Data<DetectionService<M>>,
  limit: Option<web::Data<UploadLimit>>,
  payload: Multipart,
) -> Result<HttpResponse, ApiError>
where
  M: Model + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let limit = limit.map_or(DEFAULT_MAX_UPLOAD_BYTES, |l| l.get_ref().0);
  let bytes = read_image_field(payload, limit).await?;
  info!("收到图像: {} 字节", bytes.len());

  // 推理会阻塞当前线程，交给阻塞线程池执行
  let result = web::block(move || service.detect(&bytes))
    .await?
    .map_err(|e| {
      error!("检测失败: {}", e);
      ApiError::from(e)
    })?;

  Ok(HttpResponse::Ok().json(DetectionResponse {
    status: "success",
    result,
  }))
}

/// 注册全部路由，测试与主程序共用
pub fn configure<M>(cfg: &mut web::ServiceConfig)
where
  M: Model + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  cfg
    .route("/", web::get().to(index::<M>))
    .route("/health", web::get().to(health::<M>))
    .route("/v1/categories", web::get().to(categories::<M>))
    .route("/v1/detect_trash", web::post().to(detect_trash::<M>));
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
  pub workers: Option<usize>,
  pub max_upload_bytes: usize,
}

pub async fn run_server<M>(service: DetectionService<M>, config: ServerConfig) -> std::io::Result<()>
where
  M: Model + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let addr = (config.host.as_str(), config.port);
  info!("{} 监听于 http://{}:{}", SERVICE_NAME, config.host, config.port);
  info!("检测接口: http://{}:{}/v1/detect_trash", config.host, config.port);

  let service = web::Data::new(service);
  let limit = web::Data::new(UploadLimit(config.max_upload_bytes));

  let mut server = HttpServer::new(move || {
    actix_web::App::new()
      .wrap(middleware::Logger::default())
      .app_data(service.clone())
      .app_data(limit.clone())
      .configure(configure::<M>)
  });
  if let Some(workers) = config.workers {
    server = server.workers(workers);
  }

  server.bind(addr)?.run().await
}
