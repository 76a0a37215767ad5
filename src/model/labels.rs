// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/labels.rs - 类别名称表
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

/// 元数据中的类别编号上限，超出视为损坏
const MAX_CLASS_ID: usize = 4096;

/// 读取类别名称文件，每行一个名称，行号即类别编号；
/// 中间的空行保留为空名称，末尾的空行忽略
pub fn load_labels(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
  let content = std::fs::read_to_string(path)?;
  Ok(parse_label_lines(&content))
}

fn parse_label_lines(content: &str) -> Vec<String> {
  let mut labels: Vec<String> = content.lines().map(|line| line.trim().to_string()).collect();
  while labels.last().is_some_and(|name| name.is_empty()) {
    labels.pop();
  }
  labels
}

pub fn parse_ultralytics_names(raw: &str) -> Option<Vec<String>> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;

  let mut names = BTreeMap::new();
  let mut rest = body.trim();
  while !rest.is_empty() {
    let (id, tail) = rest.split_once(':')?;
    let id: usize = id.trim().parse().ok()?;
    if id >= MAX_CLASS_ID {
      return None;
    }

    let tail = tail.trim_start();
    let quote = tail.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let tail = &tail[1..];
    let end = tail.find(quote)?;
    names.insert(id, tail[..end].to_string());

    rest = tail[end + 1..].trim_start();
    rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
  }

  let len = names.keys().next_back().map_or(0, |max| max + 1);
  let mut labels = vec![String::new(); len];
  for (id, name) in names {
    labels[id] = name;
  }
  Some(labels)
}
