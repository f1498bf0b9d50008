// 该文件是 Xuejian （血检） 项目的一部分。
// src/frame.rs - 归一化 NHWC 帧定义
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

use image::RgbImage;
use image::imageops::{self, FilterType};
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("无效图像: {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
}

pub trait AsNhwcTensor<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[f32];
}

/// 模型输入帧：固定尺寸 W×H、NHWC 排列、[0, 1] 归一化的 RGB 浮点数据
#[derive(Debug, Clone)]
pub struct RgbNormFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> RgbNormFrame<W, H> {
  /// 由任意尺寸的 RGB 图像构建模型输入帧：
  /// 双线性缩放到 W×H，逐通道除以 255 映射到 [0, 1]
  pub fn from_image(image: &RgbImage) -> Result<Self, FrameError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidImage { width, height });
    }

    let resized = imageops::resize(image, W, H, FilterType::Triangle);

    let mut data = vec![0.0f32; RGB_CHANNELS * (W as usize) * (H as usize)];
    for (index, pixel) in resized.pixels().enumerate() {
      let base = index * RGB_CHANNELS;
      data[base] = pixel[0] as f32 / 255.0;
      data[base + 1] = pixel[1] as f32 / 255.0;
      data[base + 2] = pixel[2] as f32 / 255.0;
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl<const W: u32, const H: u32> AsNhwcTensor<W, H> for RgbNormFrame<W, H> {
  fn as_nhwc(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
      Rgb([
        (x % 256) as u8,
        (y % 256) as u8,
        ((x + y) % 256) as u8,
      ])
    })
  }

  #[test]
  fn frame_has_fixed_shape() {
    let image = gradient_image(640, 480);
    let frame = RgbNormFrame::<224, 224>::from_image(&image).unwrap();
    assert_eq!(frame.width(), 224);
    assert_eq!(frame.height(), 224);
    assert_eq!(frame.channels(), 3);
    assert_eq!(frame.len(), 224 * 224 * 3);
  }

  #[test]
  fn frame_values_are_normalized() {
    let image = gradient_image(301, 97);
    let frame = RgbNormFrame::<224, 224>::from_image(&image).unwrap();
    assert!(
      frame.as_nhwc().iter().all(|v| (0.0..=1.0).contains(v)),
      "帧数据必须落在 [0, 1] 区间"
    );
  }

  #[test]
  fn normalization_is_deterministic() {
    let image = gradient_image(123, 456);
    let a = RgbNormFrame::<224, 224>::from_image(&image).unwrap();
    let b = RgbNormFrame::<224, 224>::from_image(&image).unwrap();
    assert_eq!(a.as_nhwc(), b.as_nhwc());
  }

  #[test]
  fn uniform_image_maps_exactly() {
    let image = RgbImage::from_pixel(50, 30, Rgb([255, 0, 51]));
    let frame = RgbNormFrame::<224, 224>::from_image(&image).unwrap();
    let nhwc = frame.as_nhwc();
    assert!((nhwc[0] - 1.0).abs() < 1e-6);
    assert!(nhwc[1].abs() < 1e-6);
    assert!((nhwc[2] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn zero_area_image_is_rejected() {
    let image = RgbImage::new(0, 0);
    let result = RgbNormFrame::<224, 224>::from_image(&image);
    assert!(matches!(
      result,
      Err(FrameError::InvalidImage {
        width: 0,
        height: 0
      })
    ));
  }
}
