// 该文件是 Fenjian （分拣） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod args;
pub mod category;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod server;
pub mod service;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 指向的文件路径，`scheme://dir/file` 中的 `dir` 会被当作相对路径的一部分
pub fn url_file_path(url: &url::Url) -> String {
  match url.host_str() {
    Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
    _ => url.path().to_string(),
  }
}

/// 初始化日志输出，`RUST_LOG` 未设置时默认 `info` 级别
pub fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}
