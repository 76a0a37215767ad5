// 该文件是 Fenjian （分拣） 项目的一部分。
// src/main.rs - 服务主程序
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use fenjian::{args::Args, server::run_server, service::DetectionService};

#[actix_web::main]
async fn main() -> Result<()> {
  fenjian::init_tracing();

  let args = Args::parse();

  info!("{}", "=".repeat(60));
  info!("启动垃圾分类检测服务");
  info!("模型地址: {}", args.model);
  info!("类别映射: {}", args.mapping.display());
  info!("{}", "=".repeat(60));

  let service = DetectionService::initialize(&args.model, &args.mapping).map_err(|e| {
    error!("服务初始化失败: {}", e);
    error!("请确认模型已训练完成且类别映射文件存在");
    e
  })?;
  info!("服务初始化完成");

  run_server(service, args.server_config())
    .await
    .context("HTTP 服务异常退出")
}
