// 该文件是 Fenjian （分拣） 项目的一部分。
// tests/api_test.rs - HTTP 接口测试
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

use std::io::Cursor;

use actix_web::{App, http::StatusCode, http::header, test, web};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;

use fenjian::{
  category::CategoryMapping,
  frame::RgbFrame,
  input::AsNhwcFrame,
  model::{DetectItem, DetectResult, Model, Thresholds},
  server::{UploadLimit, configure},
  service::DetectionService,
};

/// 把图像中所有亮像素当作一个 `plastic_bottle`
struct BrightObjectModel;

impl Model for BrightObjectModel {
  type Error = std::io::Error;

  fn infer(&self, input: &RgbFrame, _: &Thresholds) -> Result<DetectResult, Self::Error> {
    let data = input.as_nhwc();
    let mut bounds: Option<[f32; 4]> = None;
    for y in 0..input.height() {
      for x in 0..input.width() {
        let idx = (y * input.width() + x) * 3;
        if data[idx..idx + 3].iter().all(|&v| v > 200) {
          let (x, y) = (x as f32, y as f32);
          bounds = Some(match bounds {
            None => [x, y, x + 1.0, y + 1.0],
            Some([x1, y1, x2, y2]) => [x1.min(x), y1.min(y), x2.max(x + 1.0), y2.max(y + 1.0)],
          });
        }
      }
    }

    let items: Vec<_> = bounds
      .map(|bbox| DetectItem {
        class_id: 0,
        score: 0.87,
        bbox,
      })
      .into_iter()
      .collect();
    Ok(items.into())
  }

  fn class_name(&self, class_id: u32) -> Option<&str> {
    (class_id == 0).then_some("plastic_bottle")
  }

  fn name(&self) -> &str {
    "bright-object"
  }
}

struct FailingModel;

impl Model for FailingModel {
  type Error = std::io::Error;

  fn infer(&self, _: &RgbFrame, _: &Thresholds) -> Result<DetectResult, Self::Error> {
    Err(std::io::Error::other("device lost"))
  }

  fn class_name(&self, _: u32) -> Option<&str> {
    None
  }

  fn name(&self) -> &str {
    "failing"
  }
}

const BOUNDARY: &str = "fenjian-test-boundary";

fn mapping() -> CategoryMapping {
  CategoryMapping::load(concat!(env!("CARGO_MANIFEST_DIR"), "/configs/category_mapping.json"))
    .unwrap()
}

fn png(image: RgbImage) -> Vec<u8> {
  let mut buf = Cursor::new(Vec::new());
  DynamicImage::ImageRgb8(image)
    .write_to(&mut buf, ImageFormat::Png)
    .unwrap();
  buf.into_inner()
}

fn bottle_image() -> Vec<u8> {
  let mut image = RgbImage::new(64, 48);
  for y in 10..30 {
    for x in 20..28 {
      image.put_pixel(x, y, Rgb([250, 250, 250]));
    }
  }
  png(image)
}

fn multipart_body(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(data);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
  body
}

fn upload(field: &str, content_type: &str, data: &[u8]) -> test::TestRequest {
  test::TestRequest::post()
    .uri("/v1/detect_trash")
    .insert_header((
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    ))
    .set_payload(multipart_body(field, content_type, data))
}

macro_rules! app {
  ($model:ty, $service:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($service))
        .configure(configure::<$model>),
    )
    .await
  };
}

#[actix_web::test]
async fn health_reports_loaded_artifacts() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "healthy");
  assert_eq!(body["model_loaded"], true);
  assert_eq!(body["category_mapping_loaded"], true);
  assert_eq!(body["gpu_available"], false);
  assert_eq!(body["gpu_name"], "N/A");
}

#[actix_web::test]
async fn root_lists_endpoints() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "running");
  assert_eq!(body["model"], "bright-object");
  assert_eq!(body["endpoints"]["detection"], "/v1/detect_trash");
}

#[actix_web::test]
async fn detects_fixture_bottle_as_recycle() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, upload("image", "image/png", &bottle_image()).to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "success");
  assert_eq!(body["detection_count"], 1);
  assert!(body["inference_time_ms"].as_f64().unwrap() >= 0.0);

  let detection = &body["detections"][0];
  assert_eq!(detection["specific_name"], "plastic_bottle");
  assert_eq!(detection["general_category"], "Recycle");

  let confidence = detection["confidence"].as_f64().unwrap();
  assert!((0.0..=1.0).contains(&confidence));

  let bbox: Vec<f64> = detection["bbox_xyxy"]
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_f64().unwrap())
    .collect();
  assert_eq!(bbox, vec![20.0, 10.0, 28.0, 30.0]);
}

#[actix_web::test]
async fn empty_scene_has_no_detections() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, upload("image", "image/png", &png(RgbImage::new(32, 32))).to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["detection_count"], 0);
  assert_eq!(body["detections"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn rejects_non_image_content_type() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, upload("image", "text/plain", b"hello").to_request()).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let body: Value = test::read_body_json(resp).await;
  assert!(body["detail"].as_str().unwrap().contains("text/plain"));
}

#[actix_web::test]
async fn rejects_undecodable_image() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, upload("image", "image/jpeg", b"not really a jpeg").to_request()).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let body: Value = test::read_body_json(resp).await;
  assert!(body["detail"].is_string());
}

#[actix_web::test]
async fn missing_image_field_is_unprocessable() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, upload("photo", "image/png", &bottle_image()).to_request()).await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn inference_failure_is_server_error() {
  let app = app!(FailingModel, DetectionService::new(FailingModel, mapping()));

  let resp = test::call_service(&app, upload("image", "image/png", &bottle_image()).to_request()).await;
  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

  let body: Value = test::read_body_json(resp).await;
  assert!(body["detail"].as_str().unwrap().contains("device lost"));
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(DetectionService::new(BrightObjectModel, mapping())))
      .app_data(web::Data::new(UploadLimit(16)))
      .configure(configure::<BrightObjectModel>),
  )
  .await;

  let resp = test::call_service(&app, upload("image", "image/png", &bottle_image()).to_request()).await;
  assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[actix_web::test]
async fn categories_summarize_mapping() {
  let app = app!(BrightObjectModel, DetectionService::new(BrightObjectModel, mapping()));

  let resp = test::call_service(&app, test::TestRequest::get().uri("/v1/categories").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body: Value = test::read_body_json(resp).await;
  let total = body["total_classes"].as_u64().unwrap();
  assert_eq!(total, 35);
  assert_eq!(body["specific_categories"].as_array().unwrap().len() as u64, total);

  let general = body["general_categories"].as_object().unwrap();
  let mut keys: Vec<_> = general.keys().map(String::as_str).collect();
  keys.sort();
  assert_eq!(keys, vec!["Hazardous", "Organic", "Recycle", "Trash"]);
  assert_eq!(general.values().map(|v| v.as_u64().unwrap()).sum::<u64>(), total);
  assert_eq!(body["mapping"]["plastic_bottle"], "Recycle");
}
