// 该文件是 Xuejian （血检） 项目的一部分。
// tests/pipeline_test.rs - 流水线集成测试
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

use std::time::Duration;

use image::{Rgb, RgbImage};

use xuejian::{
  model::{BloodLabel, ClassScores, Model, ModelFrame},
  task::{Pipeline, PipelineError, PipelineEvent, PipelineState},
};

struct StubModel {
  scores: Vec<f32>,
  delay: Duration,
}

impl Model for StubModel {
  type Input = ModelFrame;
  type Output = ClassScores;
  type Error = String;

  fn infer(&self, _input: &ModelFrame) -> Result<ClassScores, String> {
    if !self.delay.is_zero() {
      std::thread::sleep(self.delay);
    }
    Ok(ClassScores::from(self.scores.clone()))
  }
}

fn sample_image() -> RgbImage {
  RgbImage::from_fn(320, 240, |x, y| {
    Rgb([(x % 256) as u8, (y % 256) as u8, 40])
  })
}

#[cfg(feature = "report_pdf")]
#[test]
fn pipeline_classifies_and_exports_report() {
  let mut pipeline = Pipeline::new(|| {
    Ok(StubModel {
      scores: vec![0.03, 0.95, 0.02],
      delay: Duration::from_millis(10),
    })
  });
  assert_eq!(pipeline.wait(), Some(PipelineEvent::Ready));

  pipeline.submit(sample_image()).unwrap();
  match pipeline.wait() {
    Some(PipelineEvent::Completed(result)) => {
      assert_eq!(result.label, BloodLabel::Healthy);
      assert_eq!(result.to_string(), "Type: Healthy, Confidence: 95.00%");
    }
    other => panic!("意外事件: {:?}", other),
  }
  assert_eq!(pipeline.state(), PipelineState::ResultAvailable);

  let dir = std::env::temp_dir().join("xuejian-integration-test/report");
  let _ = std::fs::remove_dir_all(&dir);
  let output = xuejian::output::PdfReportOutput::new(&dir, xuejian::output::ReportNaming::Fixed);
  let path = pipeline.export(&output).unwrap();
  assert!(path.exists());
  let bytes = std::fs::read(&path).unwrap();
  assert!(bytes.starts_with(b"%PDF"));
}

#[test]
fn pipeline_keeps_order_under_sequential_submissions() {
  let mut pipeline = Pipeline::new(|| {
    Ok(StubModel {
      scores: vec![0.6, 0.3, 0.1],
      delay: Duration::from_millis(20),
    })
  });
  assert_eq!(pipeline.wait(), Some(PipelineEvent::Ready));

  for _ in 0..3 {
    pipeline.submit(sample_image()).unwrap();
    match pipeline.wait() {
      Some(PipelineEvent::Completed(result)) => assert_eq!(result.label, BloodLabel::Cancer),
      other => panic!("意外事件: {:?}", other),
    }
  }
}

#[test]
fn not_ready_pipeline_rejects_classification() {
  let mut pipeline = Pipeline::new(|| Err::<StubModel, _>("模型文件缺失".to_string()));
  match pipeline.wait() {
    Some(PipelineEvent::LoadFailed(message)) => assert!(message.contains("模型文件缺失")),
    other => panic!("意外事件: {:?}", other),
  }
  assert_eq!(pipeline.state(), PipelineState::NotReady);
  assert!(matches!(
    pipeline.submit(sample_image()),
    Err(PipelineError::NotReady)
  ));
}
