// 该文件是 Fenjian （分拣） 项目的一部分。
// src/category.rs - 垃圾类别映射
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
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

/// 未在映射表中出现的标签统一返回该值
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// 垃圾大类（L2 标签）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GeneralCategory {
  Recycle,
  Trash,
  Hazardous,
  Organic,
}

impl GeneralCategory {
  pub const ALL: [GeneralCategory; 4] = [
    GeneralCategory::Recycle,
    GeneralCategory::Trash,
    GeneralCategory::Hazardous,
    GeneralCategory::Organic,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      GeneralCategory::Recycle => "Recycle",
      GeneralCategory::Trash => "Trash",
      GeneralCategory::Hazardous => "Hazardous",
      GeneralCategory::Organic => "Organic",
    }
  }
}

impl fmt::Display for GeneralCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("未知的垃圾大类: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for GeneralCategory {
  type Err = ParseCategoryError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    GeneralCategory::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| ParseCategoryError(s.to_string()))
  }
}

#[derive(Error, Debug)]
pub enum CategoryError {
  #[error("无法读取类别映射文件 {path}: {source}")]
  Io {
    path: String,
    source: std::io::Error,
  },
  #[error("类别映射文件格式错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("标签 '{label}' 映射到了未知的大类 '{category}'")]
  UnknownCategory { label: String, category: String },
}

#[derive(Deserialize)]
struct MappingFile {
  mapping: BTreeMap<String, String>,
}

/// 具体标签到垃圾大类的只读映射，进程启动时加载一次
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMapping {
  entries: BTreeMap<String, GeneralCategory>,
}

impl CategoryMapping {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, CategoryError> {
    let path = path.as_ref();
    info!("加载类别映射: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|source| {
      error!("类别映射文件不可读: {}", path.display());
      CategoryError::Io {
        path: path.display().to_string(),
        source,
      }
    })?;

    let mapping = Self::from_json_str(&content)?;
    info!("类别映射加载完成: {} 个类别", mapping.len());
    Ok(mapping)
  }

  /// 解析形如 `{"mapping": {"plastic_bottle": "Recycle"}}` 的文档
  pub fn from_json_str(content: &str) -> Result<Self, CategoryError> {
    let file: MappingFile = serde_json::from_str(content)?;

    let entries = file
      .mapping
      .into_iter()
      .map(|(label, category)| match category.parse::<GeneralCategory>() {
        Ok(general) => Ok((label, general)),
        Err(_) => Err(CategoryError::UnknownCategory { label, category }),
      })
      .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(Self { entries })
  }

  pub fn resolve(&self, label: &str) -> Option<GeneralCategory> {
    self.entries.get(label).copied()
  }

  pub fn lookup(&self, label: &str) -> &'static str {
    self
      .resolve(label)
      .map(|c| c.as_str())
      .unwrap_or(UNKNOWN_CATEGORY)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn labels(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, GeneralCategory)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), *v))
  }

  /// 每个大类的标签数量，四个大类都会出现（可能为 0）
  pub fn counts(&self) -> BTreeMap<GeneralCategory, usize> {
    let mut counts: BTreeMap<_, _> = GeneralCategory::ALL.into_iter().map(|c| (c, 0)).collect();
    for category in self.entries.values() {
      *counts.entry(*category).or_default() += 1;
    }
    counts
  }
}
