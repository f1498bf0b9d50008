// 该文件是 Xuejian （血检） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "report_pdf", feature = "record_log"))]
use crate::FromUrlWithScheme;
use crate::model::Classification;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[cfg(feature = "report_pdf")]
mod pdf_report;
#[cfg(feature = "report_pdf")]
pub use self::pdf_report::{PdfReportOutput, ReportError, ReportNaming};

#[cfg(feature = "record_log")]
mod record_log;
#[cfg(feature = "record_log")]
pub use self::record_log::{RecordLogError, RecordLogOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "report_pdf")]
  #[error("报告输出错误: {0}")]
  ReportError(#[from] ReportError),
  #[cfg(feature = "record_log")]
  #[error("记录输出错误: {0}")]
  RecordLogError(#[from] RecordLogError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "report_pdf")]
  PdfReport(PdfReportOutput),
  #[cfg(feature = "record_log")]
  RecordLog(RecordLogOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "report_pdf")]
      PdfReportOutput::SCHEME => {
        let output = PdfReportOutput::from_url(url)?;
        Ok(OutputWrapper::PdfReport(output))
      }
      #[cfg(feature = "record_log")]
      RecordLogOutput::SCHEME => {
        let output = RecordLogOutput::from_url(url)?;
        Ok(OutputWrapper::RecordLog(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<RgbImage, Classification> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbImage, result: &Classification) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "report_pdf")]
      OutputWrapper::PdfReport(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "record_log")]
      OutputWrapper::RecordLog(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
