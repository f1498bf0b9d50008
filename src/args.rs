// 该文件是 Xuejian （血检） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Xuejian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径 (onnx:///path/to/blood_model.onnx)
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 单幅图像: image:///path/to/picture.jpg
  /// - 图像目录: folder:///path/to/pictures
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// PDF 报告输出目录 (report:///path/to/reports, 追加 ?name=fixed
  /// 使用固定文件名以便分享)
  #[arg(long, value_name = "REPORT")]
  pub report: Option<Url>,

  /// 分类历史记录文件 (record:///path/to/history.jsonl)
  #[arg(long, value_name = "RECORD")]
  pub record: Option<Url>,
}
