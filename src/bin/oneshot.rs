// 该文件是 Fenjian （分拣） 项目的一部分。
// src/bin/oneshot.rs - 单张图像检测
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

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use url::Url;

use fenjian::{
  FromUrl,
  args::{DEFAULT_MAPPING_PATH, DEFAULT_MODEL_URL},
  input::ImageFileInput,
  service::DetectionService,
};

/// 对单张图像执行检测并以 JSON 输出结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL", default_value = DEFAULT_MODEL_URL)]
  pub model: Url,
  /// 类别映射文件路径
  #[arg(long, value_name = "FILE", default_value = DEFAULT_MAPPING_PATH)]
  pub mapping: PathBuf,
  /// 输入图像，例如 image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 绘制检测框后的输出图像，例如 image:///tmp/result.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
}

fn main() -> Result<()> {
  fenjian::init_tracing();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);

  let service = DetectionService::initialize(&args.model, &args.mapping)?;
  let mut input = ImageFileInput::from_url(&args.input)?;
  info!("读取图像文件: {}", input.path());
  let bytes = input
    .next()
    .ok_or_else(|| anyhow!("没有输入图像: {}", args.input))?;

  let result = service.detect(&bytes)?;
  println!("{}", serde_json::to_string_pretty(&result)?);

  if let Some(output) = &args.output {
    render(output, &bytes, &result)?;
  }

  Ok(())
}

#[cfg(feature = "save_image_file")]
fn render(output: &Url, bytes: &[u8], result: &fenjian::service::DetectionResult) -> Result<()> {
  use fenjian::output::{Render, SaveImageFileOutput};

  let frame = fenjian::input::decode_image(bytes)?;
  let output = SaveImageFileOutput::from_url(output)?;
  output.render_result(&frame, result)?;
  info!("检测结果已绘制到: {}", output.path());
  Ok(())
}

#[cfg(not(feature = "save_image_file"))]
fn render(output: &Url, _: &[u8], _: &fenjian::service::DetectionResult) -> Result<()> {
  Err(anyhow!("未启用 save_image_file 特性，无法输出到 {}", output))
}
