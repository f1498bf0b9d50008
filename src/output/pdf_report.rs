// 该文件是 Xuejian （血检） 项目的一部分。
// src/output/pdf_report.rs - PDF 检测报告输出
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

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::RgbImage;
use image::imageops::{self, FilterType};
use printpdf::{
  BuiltinFont, Color, ColorBits, ColorSpace, CustomPdfConformance, Image, ImageTransform,
  ImageXObject, Line, Mm, PdfConformance, PdfDocument, Point, Px, Rgb,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Classification, WithLabel},
  output::Render,
};

// 固定版面，坐标单位为 pt，纵坐标自页面顶部起算（A4 = 595×842 pt）
const PAGE_W_PT: f32 = 595.0;
const PAGE_H_PT: f32 = 842.0;
const TITLE_TEXT: &str = "Blood Cancer Detection Report";
const TITLE_SIZE: f32 = 25.0;
const TITLE_X_PT: f32 = 80.0;
const TITLE_Y_PT: f32 = 60.0;
const TITLE_COLOR: [f32; 3] = [50.0 / 255.0, 50.0 / 255.0, 150.0 / 255.0];
const BODY_SIZE: f32 = 16.0;
const DATE_X_PT: f32 = 50.0;
const DATE_Y_PT: f32 = 100.0;
const RESULT_LABEL_X_PT: f32 = 50.0;
const RESULT_LABEL_Y_PT: f32 = 140.0;
const RESULT_TYPE_X_PT: f32 = 70.0;
const RESULT_TYPE_Y_PT: f32 = 170.0;
const RESULT_CONF_X_PT: f32 = 70.0;
const RESULT_CONF_Y_PT: f32 = 190.0;
const SEPARATOR_X0_PT: f32 = 50.0;
const SEPARATOR_X1_PT: f32 = 545.0;
const SEPARATOR_Y_PT: f32 = 200.0;
const REPORT_IMAGE_SIZE: u32 = 400;
const IMAGE_X_PT: f32 = 100.0;
const IMAGE_Y_PT: f32 = 220.0;
const FOOTER_COPYRIGHT: &str = "© 2026 Xuejian Blood Screening. All rights reserved";
const FOOTER_COPYRIGHT_X_PT: f32 = 100.0;
const FOOTER_COPYRIGHT_Y_PT: f32 = 780.0;
const FOOTER_ATTRIBUTION: &str = "Powered by on-device inference";
const FOOTER_ATTRIBUTION_X_PT: f32 = 200.0;
const FOOTER_ATTRIBUTION_Y_PT: f32 = 800.0;
const DATE_FORMAT: &str = "%d %b %Y, %I:%M %p";
const FIXED_REPORT_NAME: &str = "shared_report.pdf";

fn pt_to_mm(v: f32) -> Mm {
  Mm(v * 25.4 / 72.0)
}

fn from_top(y_pt: f32) -> Mm {
  pt_to_mm(PAGE_H_PT - y_pt)
}

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("PDF 生成错误: {0}")]
  PdfError(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 报告文件命名策略：保存用时间戳唯一名，分享用固定名反复覆盖
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportNaming {
  Unique,
  Fixed,
}

impl ReportNaming {
  fn file_name(&self, generated_at: &DateTime<Local>) -> String {
    match self {
      ReportNaming::Unique => format!("report_{}.pdf", generated_at.timestamp_millis()),
      ReportNaming::Fixed => FIXED_REPORT_NAME.to_string(),
    }
  }
}

pub struct PdfReportOutput {
  directory: PathBuf,
  naming: ReportNaming,
}

impl FromUrlWithScheme for PdfReportOutput {
  const SCHEME: &'static str = "report";
}

impl FromUrl for PdfReportOutput {
  type Error = ReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReportError::SchemeMismatch);
    }

    let naming = {
      let mut naming = ReportNaming::Unique;
      for (k, v) in url.query_pairs() {
        if k == "name" {
          if v == "fixed" {
            naming = ReportNaming::Fixed;
          }
          break;
        }
      }
      naming
    };

    Ok(PdfReportOutput {
      directory: PathBuf::from(url.path()),
      naming,
    })
  }
}

impl PdfReportOutput {
  pub fn new(directory: impl Into<PathBuf>, naming: ReportNaming) -> Self {
    PdfReportOutput {
      directory: directory.into(),
      naming,
    }
  }

  pub fn naming(&self) -> ReportNaming {
    self.naming
  }

  /// 渲染固定版面的单页报告。相同的结果、图像与时间戳渲染出
  /// 逐字节一致的文档：元数据日期取自 generated_at，且关闭
  /// XMP/ICC 附件。
  fn render_bytes(
    &self,
    result: &Classification,
    image: Option<&RgbImage>,
    generated_at: &DateTime<Local>,
  ) -> Result<Vec<u8>, ReportError> {
    debug!("渲染检测报告页面");
    let (doc, page, layer) = PdfDocument::new(
      TITLE_TEXT,
      pt_to_mm(PAGE_W_PT),
      pt_to_mm(PAGE_H_PT),
      "report",
    );
    let metadata_date = OffsetDateTime::from_unix_timestamp(generated_at.timestamp())
      .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let doc = doc
      .with_conformance(PdfConformance::Custom(CustomPdfConformance {
        requires_icc_profile: false,
        requires_xmp_metadata: false,
        ..Default::default()
      }))
      .with_creation_date(metadata_date)
      .with_mod_date(metadata_date);

    let layer = doc.get_page(page).get_layer(layer);
    let title_font = doc
      .add_builtin_font(BuiltinFont::HelveticaBold)
      .map_err(|e| ReportError::PdfError(e.to_string()))?;
    let body_font = doc
      .add_builtin_font(BuiltinFont::Helvetica)
      .map_err(|e| ReportError::PdfError(e.to_string()))?;

    // 标题
    layer.set_fill_color(Color::Rgb(Rgb::new(
      TITLE_COLOR[0],
      TITLE_COLOR[1],
      TITLE_COLOR[2],
      None,
    )));
    layer.use_text(
      TITLE_TEXT,
      TITLE_SIZE,
      pt_to_mm(TITLE_X_PT),
      from_top(TITLE_Y_PT),
      &title_font,
    );

    // 生成时间与分类结果
    layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    layer.use_text(
      format!("Generated on: {}", generated_at.format(DATE_FORMAT)),
      BODY_SIZE,
      pt_to_mm(DATE_X_PT),
      from_top(DATE_Y_PT),
      &body_font,
    );
    layer.use_text(
      "Classification Result:",
      BODY_SIZE,
      pt_to_mm(RESULT_LABEL_X_PT),
      from_top(RESULT_LABEL_Y_PT),
      &body_font,
    );
    layer.use_text(
      format!("Type: {}", result.label.to_label_str()),
      BODY_SIZE,
      pt_to_mm(RESULT_TYPE_X_PT),
      from_top(RESULT_TYPE_Y_PT),
      &body_font,
    );
    layer.use_text(
      format!("Confidence: {:.2}%", result.confidence),
      BODY_SIZE,
      pt_to_mm(RESULT_CONF_X_PT),
      from_top(RESULT_CONF_Y_PT),
      &body_font,
    );

    // 分隔线
    layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    layer.set_outline_thickness(1.0);
    layer.add_line(Line {
      points: vec![
        (
          Point::new(pt_to_mm(SEPARATOR_X0_PT), from_top(SEPARATOR_Y_PT)),
          false,
        ),
        (
          Point::new(pt_to_mm(SEPARATOR_X1_PT), from_top(SEPARATOR_Y_PT)),
          false,
        ),
      ],
      is_closed: false,
    });

    // 原始图像，缩放至固定尺寸后嵌入
    if let Some(image) = image {
      let scaled = imageops::resize(
        image,
        REPORT_IMAGE_SIZE,
        REPORT_IMAGE_SIZE,
        FilterType::Triangle,
      );
      let xobject = ImageXObject {
        width: Px(REPORT_IMAGE_SIZE as usize),
        height: Px(REPORT_IMAGE_SIZE as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: scaled.into_raw(),
        image_filter: None,
        smask: None,
        clipping_bbox: None,
      };
      // dpi 取 72，使一个像素恰为一个 pt
      Image::from(xobject).add_to_layer(
        layer.clone(),
        ImageTransform {
          translate_x: Some(pt_to_mm(IMAGE_X_PT)),
          translate_y: Some(from_top(IMAGE_Y_PT + REPORT_IMAGE_SIZE as f32)),
          dpi: Some(72.0),
          ..Default::default()
        },
      );
    }

    // 页脚
    layer.use_text(
      FOOTER_COPYRIGHT,
      BODY_SIZE,
      pt_to_mm(FOOTER_COPYRIGHT_X_PT),
      from_top(FOOTER_COPYRIGHT_Y_PT),
      &body_font,
    );
    layer.use_text(
      FOOTER_ATTRIBUTION,
      BODY_SIZE,
      pt_to_mm(FOOTER_ATTRIBUTION_X_PT),
      from_top(FOOTER_ATTRIBUTION_Y_PT),
      &body_font,
    );

    doc
      .save_to_bytes()
      .map_err(|e| ReportError::PdfError(e.to_string()))
  }

  /// 渲染并持久化报告，返回最终路径。
  /// 先写入 .part 临时文件再原子改名，最终路径上不会出现残缺文件。
  pub fn render_to(
    &self,
    result: &Classification,
    image: Option<&RgbImage>,
    generated_at: &DateTime<Local>,
  ) -> Result<PathBuf, ReportError> {
    let bytes = self.render_bytes(result, image, generated_at)?;

    if !self.directory.as_os_str().is_empty() {
      std::fs::create_dir_all(&self.directory)?;
    }

    let path = self.directory.join(self.naming.file_name(generated_at));
    let staging = staging_path(&path);
    if let Err(e) = std::fs::write(&staging, &bytes).and_then(|_| std::fs::rename(&staging, &path))
    {
      let _ = std::fs::remove_file(&staging);
      return Err(ReportError::IoError(e));
    }

    warn!("报告已保存: {}", path.display());

    Ok(path)
  }
}

fn staging_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".part");
  path.with_file_name(name)
}

impl Render<RgbImage, Classification> for PdfReportOutput {
  type Error = ReportError;

  fn render_result(&self, frame: &RgbImage, result: &Classification) -> Result<(), Self::Error> {
    self.render_to(result, Some(frame), &Local::now())?;
    Ok(())
  }
}
