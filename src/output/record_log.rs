// 该文件是 Xuejian （血检） 项目的一部分。
// src/output/record_log.rs - 分类历史记录输出
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

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use image::RgbImage;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Classification, WithLabel},
  output::Render,
};

#[derive(Error, Debug)]
pub enum RecordLogError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 追加式分类历史：每次分类在日志文件尾部追加一行 JSON
pub struct RecordLogOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for RecordLogOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordLogOutput {
  type Error = RecordLogError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordLogError::SchemeMismatch);
    }

    Ok(RecordLogOutput {
      path: PathBuf::from(url.path()),
    })
  }
}

impl RecordLogOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    RecordLogOutput { path: path.into() }
  }

  pub fn append(&self, result: &Classification) -> Result<(), RecordLogError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let record = serde_json::json!({
      "time": Utc::now().to_rfc3339(),
      "label": result.label.to_label_str(),
      "confidence": result.confidence,
    });

    let mut file = std::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    writeln!(file, "{}", record)?;

    debug!("分类记录已追加: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbImage, Classification> for RecordLogOutput {
  type Error = RecordLogError;

  fn render_result(&self, _frame: &RgbImage, result: &Classification) -> Result<(), Self::Error> {
    self.append(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BloodLabel;

  #[test]
  fn append_writes_one_json_line_per_result() {
    let dir = std::env::temp_dir().join("xuejian-record-test");
    let _ = std::fs::remove_dir_all(&dir);
    let output = RecordLogOutput::new(dir.join("history.jsonl"));

    output
      .append(&Classification {
        label: BloodLabel::Cancer,
        confidence: 97.25,
      })
      .unwrap();
    output
      .append(&Classification {
        label: BloodLabel::Healthy,
        confidence: 85.0,
      })
      .unwrap();

    let content = std::fs::read_to_string(dir.join("history.jsonl")).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["label"], "Cancer");
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["label"], "Healthy");
  }
}
