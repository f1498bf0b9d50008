// 该文件是 Xuejian （血检） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use xuejian::{
  FromUrl,
  input::InputWrapper,
  model::{BloodNetBuilder, ModelFrame},
  output::{PdfReportOutput, RecordLogOutput, Render},
  task::{Pipeline, PipelineEvent},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);

  let input = InputWrapper::from_url(&args.input)?;
  let record = match &args.record {
    Some(url) => Some(RecordLogOutput::from_url(url)?),
    None => None,
  };

  // 模型在后台线程上加载，交互侧只等待就绪事件
  let model_url = args.model.clone();
  let mut pipeline =
    Pipeline::new(move || BloodNetBuilder::from_url(&model_url)?.build::<ModelFrame>());

  info!("等待模型加载...");
  match pipeline.wait() {
    Some(PipelineEvent::Ready) => info!("模型就绪"),
    Some(PipelineEvent::LoadFailed(message)) => {
      error!("模型加载失败: {}", message);
      anyhow::bail!("模型加载失败: {}", message);
    }
    _ => anyhow::bail!("后台线程异常退出"),
  }

  let mut total = 0usize;
  for image in input {
    pipeline.submit(image)?;
    match pipeline.wait() {
      Some(PipelineEvent::Completed(result)) => {
        total += 1;
        info!("分类结果: {}", result);
        if let (Some(record), Some(image)) = (&record, pipeline.image()) {
          record.render_result(image, &result)?;
        }
      }
      Some(PipelineEvent::Failed(message)) => error!("分类失败: {}", message),
      _ => anyhow::bail!("后台线程异常退出"),
    }
  }
  info!("共完成 {} 次分类", total);

  // 导出最近一次结果的报告；路径同时用于持久化确认与分享移交。
  // 导出失败只提示，不改变流水线状态
  if let Some(report_url) = &args.report {
    let output = PdfReportOutput::from_url(report_url)?;
    match pipeline.export(&output) {
      Ok(path) => info!("报告已导出: {}", path.display()),
      Err(e) => error!("报告导出失败: {}", e),
    }
  }

  Ok(())
}
