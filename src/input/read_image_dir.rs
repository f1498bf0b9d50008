// 该文件是 Xuejian （血检） 项目的一部分。
// src/input/read_image_dir.rs - 图像目录批量输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

// 与启用的 image 解码特性保持一致
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageDirInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("不是目录: {0}")]
  NotADirectory(String),
}

/// 目录批量输入：按文件名顺序迭代目录下的所有可解码图像
pub struct ImageDirInput {
  paths: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for ImageDirInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirInput {
  type Error = ImageDirInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirInputError::SchemeMismatch);
    }

    let directory = PathBuf::from(url.path());
    if !directory.is_dir() {
      return Err(ImageDirInputError::NotADirectory(
        directory.display().to_string(),
      ));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let matched = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
          let lower = ext.to_lowercase();
          IMAGE_EXTENSIONS.iter().any(|known| *known == lower)
        })
        .unwrap_or(false);
      if matched {
        paths.push(path);
      }
    }
    paths.sort();
    debug!("目录 {} 中共有 {} 幅图像", directory.display(), paths.len());

    Ok(ImageDirInput {
      paths: paths.into_iter(),
    })
  }
}

impl Iterator for ImageDirInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    // 解码失败的文件记录后跳过，不中断批处理
    for path in self.paths.by_ref() {
      match ImageReader::open(&path).map_err(image::ImageError::from)
        .and_then(|reader| reader.decode())
      {
        Ok(image) => return Some(image.into()),
        Err(e) => {
          warn!("跳过无法解码的文件 {}: {}", path.display(), e);
        }
      }
    }
    None
  }
}
