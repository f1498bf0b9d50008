// 该文件是 Xuejian （血检） 项目的一部分。
// src/task.rs - 分类任务与流水线编排
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

use std::sync::mpsc;
use std::thread;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  model::{Classification, ClassScores, Model, ModelFrame, interpret},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = ModelFrame, Output = ClassScores, Error = ME>,
  O: Render<RgbImage, Classification, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let frame = ModelFrame::from_image(&image)?;
    let now = std::time::Instant::now();
    let scores = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    let result = interpret(&scores)?;
    info!("分类结果: {}", result);
    output.render_result(&image, &result)?;
    info!("渲染完成");

    Ok(())
  }
}

/// 流水线状态机。Classifying 不可重入：分类期间到达的新图像会被拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  NotReady,
  Ready,
  Classifying,
  ResultAvailable,
}

/// 后台线程向交互侧上报的事件
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
  Ready,
  LoadFailed(String),
  Completed(Classification),
  Failed(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("模型尚未就绪")]
  NotReady,
  #[error("正在分类，请稍候")]
  Busy,
  #[error("尚无分类结果可导出")]
  NothingToExport,
  #[error("后台线程已退出")]
  WorkerGone,
  #[cfg(feature = "report_pdf")]
  #[error("报告导出错误: {0}")]
  Report(#[from] crate::output::ReportError),
}

enum WorkerEvent {
  ModelReady,
  ModelFailed(String),
  Classified(Classification),
  ClassifyFailed(String),
}

/// 分类流水线：模型加载与每次分类都在唯一的后台线程上执行，
/// 交互侧通过事件通道获知完成情况，从不阻塞在推理上。
/// 当前图像与当前结果由流水线独占持有，只在状态迁移点整体替换。
pub struct Pipeline {
  state: PipelineState,
  image: Option<RgbImage>,
  result: Option<Classification>,
  job_tx: Option<mpsc::Sender<RgbImage>>,
  event_rx: mpsc::Receiver<WorkerEvent>,
  worker: Option<thread::JoinHandle<()>>,
}

impl Pipeline {
  pub fn new<M, F>(load: F) -> Self
  where
    M: Model<Input = ModelFrame, Output = ClassScores> + Send + 'static,
    M::Error: std::fmt::Display,
    F: FnOnce() -> Result<M, M::Error> + Send + 'static,
  {
    let (job_tx, job_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let worker = thread::spawn(move || worker_loop(load, job_rx, event_tx));

    Pipeline {
      state: PipelineState::NotReady,
      image: None,
      result: None,
      job_tx: Some(job_tx),
      event_rx,
      worker: Some(worker),
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  /// 最近一次成功分类的结果
  pub fn result(&self) -> Option<&Classification> {
    self.result.as_ref()
  }

  /// 最近一次提交的原始图像
  pub fn image(&self) -> Option<&RgbImage> {
    self.image.as_ref()
  }

  /// 提交一幅图像进行分类。提交的图像取代上一幅成为当前图像
  pub fn submit(&mut self, image: RgbImage) -> Result<(), PipelineError> {
    match self.state {
      PipelineState::NotReady => Err(PipelineError::NotReady),
      PipelineState::Classifying => Err(PipelineError::Busy),
      PipelineState::Ready | PipelineState::ResultAvailable => {
        let job_tx = self.job_tx.as_ref().ok_or(PipelineError::WorkerGone)?;
        job_tx
          .send(image.clone())
          .map_err(|_| PipelineError::WorkerGone)?;
        self.image = Some(image);
        self.state = PipelineState::Classifying;
        Ok(())
      }
    }
  }

  /// 阻塞等待下一个事件，并推进状态机
  pub fn wait(&mut self) -> Option<PipelineEvent> {
    match self.event_rx.recv() {
      Ok(event) => Some(self.apply(event)),
      Err(_) => None,
    }
  }

  /// 非阻塞拉取事件
  pub fn poll(&mut self) -> Option<PipelineEvent> {
    match self.event_rx.try_recv() {
      Ok(event) => Some(self.apply(event)),
      Err(_) => None,
    }
  }

  /// 导出当前结果为 PDF 报告，返回报告路径。
  /// 仅 ResultAvailable 状态可导出；导出在调用线程上同步完成
  #[cfg(feature = "report_pdf")]
  pub fn export(
    &self,
    output: &crate::output::PdfReportOutput,
  ) -> Result<std::path::PathBuf, PipelineError> {
    match self.state {
      PipelineState::NotReady => Err(PipelineError::NotReady),
      PipelineState::ResultAvailable => {
        let result = self.result.as_ref().ok_or(PipelineError::NothingToExport)?;
        let path = output.render_to(result, self.image.as_ref(), &chrono::Local::now())?;
        Ok(path)
      }
      _ => Err(PipelineError::NothingToExport),
    }
  }

  fn apply(&mut self, event: WorkerEvent) -> PipelineEvent {
    match event {
      WorkerEvent::ModelReady => {
        self.state = PipelineState::Ready;
        PipelineEvent::Ready
      }
      WorkerEvent::ModelFailed(message) => {
        self.state = PipelineState::NotReady;
        PipelineEvent::LoadFailed(message)
      }
      WorkerEvent::Classified(result) => {
        self.result = Some(result.clone());
        self.state = PipelineState::ResultAvailable;
        PipelineEvent::Completed(result)
      }
      WorkerEvent::ClassifyFailed(message) => {
        // 单次失败不影响已有结果
        self.state = if self.result.is_some() {
          PipelineState::ResultAvailable
        } else {
          PipelineState::Ready
        };
        PipelineEvent::Failed(message)
      }
    }
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    self.job_tx.take();
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}

fn worker_loop<M, F>(load: F, jobs: mpsc::Receiver<RgbImage>, events: mpsc::Sender<WorkerEvent>)
where
  M: Model<Input = ModelFrame, Output = ClassScores>,
  M::Error: std::fmt::Display,
  F: FnOnce() -> Result<M, M::Error>,
{
  info!("后台线程启动，加载模型...");
  let model = match load() {
    Ok(model) => {
      let _ = events.send(WorkerEvent::ModelReady);
      model
    }
    Err(e) => {
      error!("模型加载失败: {}", e);
      let _ = events.send(WorkerEvent::ModelFailed(e.to_string()));
      return;
    }
  };

  // 唯一工作线程按到达顺序处理分类请求
  for image in jobs {
    let event = match classify(&model, &image) {
      Ok(result) => WorkerEvent::Classified(result),
      Err(message) => {
        error!("分类失败: {}", message);
        WorkerEvent::ClassifyFailed(message)
      }
    };
    if events.send(event).is_err() {
      break;
    }
  }

  info!("后台线程退出");
}

fn classify<M>(model: &M, image: &RgbImage) -> Result<Classification, String>
where
  M: Model<Input = ModelFrame, Output = ClassScores>,
  M::Error: std::fmt::Display,
{
  let frame = ModelFrame::from_image(image).map_err(|e| e.to_string())?;
  let now = std::time::Instant::now();
  let scores = model.infer(&frame).map_err(|e| e.to_string())?;
  debug!("推理完成，耗时: {:.2?}", now.elapsed());
  interpret(&scores).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BloodLabel;
  use image::Rgb;
  use std::time::Duration;

  struct FixedModel {
    scores: Vec<f32>,
    delay: Duration,
  }

  impl Model for FixedModel {
    type Input = ModelFrame;
    type Output = ClassScores;
    type Error = String;

    fn infer(&self, _input: &ModelFrame) -> Result<ClassScores, String> {
      if !self.delay.is_zero() {
        thread::sleep(self.delay);
      }
      Ok(ClassScores::from(self.scores.clone()))
    }
  }

  fn sample_image() -> RgbImage {
    RgbImage::from_pixel(32, 32, Rgb([120, 30, 60]))
  }

  #[test]
  fn load_failure_keeps_pipeline_not_ready() {
    let mut pipeline = Pipeline::new(|| Err::<FixedModel, _>("坏模型".to_string()));
    match pipeline.wait() {
      Some(PipelineEvent::LoadFailed(message)) => assert!(message.contains("坏模型")),
      other => panic!("意外事件: {:?}", other),
    }
    assert_eq!(pipeline.state(), PipelineState::NotReady);
    assert!(matches!(
      pipeline.submit(sample_image()),
      Err(PipelineError::NotReady)
    ));
  }

  #[cfg(feature = "report_pdf")]
  #[test]
  fn export_is_rejected_while_not_ready() {
    let mut pipeline = Pipeline::new(|| Err::<FixedModel, _>("坏模型".to_string()));
    pipeline.wait();
    let dir = std::env::temp_dir().join("xuejian-task-test/not-ready");
    let output =
      crate::output::PdfReportOutput::new(&dir, crate::output::ReportNaming::Unique);
    assert!(matches!(
      pipeline.export(&output),
      Err(PipelineError::NotReady)
    ));
    assert!(!dir.exists());
  }

  #[test]
  fn classification_reaches_result_available() {
    let mut pipeline = Pipeline::new(|| {
      Ok(FixedModel {
        scores: vec![0.1, 0.85, 0.05],
        delay: Duration::ZERO,
      })
    });
    assert_eq!(pipeline.wait(), Some(PipelineEvent::Ready));
    assert_eq!(pipeline.state(), PipelineState::Ready);

    pipeline.submit(sample_image()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Classifying);

    match pipeline.wait() {
      Some(PipelineEvent::Completed(result)) => {
        assert_eq!(result.label, BloodLabel::Healthy);
        assert_eq!(format!("{:.2}", result.confidence), "85.00");
      }
      other => panic!("意外事件: {:?}", other),
    }
    assert_eq!(pipeline.state(), PipelineState::ResultAvailable);
    assert!(pipeline.result().is_some());
    assert!(pipeline.image().is_some());
  }

  #[test]
  fn double_trigger_while_classifying_is_rejected() {
    let mut pipeline = Pipeline::new(|| {
      Ok(FixedModel {
        scores: vec![0.7, 0.2, 0.1],
        delay: Duration::from_millis(200),
      })
    });
    assert_eq!(pipeline.wait(), Some(PipelineEvent::Ready));

    pipeline.submit(sample_image()).unwrap();
    assert!(matches!(
      pipeline.submit(sample_image()),
      Err(PipelineError::Busy)
    ));

    match pipeline.wait() {
      Some(PipelineEvent::Completed(result)) => assert_eq!(result.label, BloodLabel::Cancer),
      other => panic!("意外事件: {:?}", other),
    }

    // 结果可用后允许再次分类
    pipeline.submit(sample_image()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Classifying);
    assert!(matches!(
      pipeline.wait(),
      Some(PipelineEvent::Completed(_))
    ));
  }

  #[cfg(feature = "report_pdf")]
  #[test]
  fn export_before_any_classification_writes_nothing() {
    let mut pipeline = Pipeline::new(|| {
      Ok(FixedModel {
        scores: vec![0.7, 0.2, 0.1],
        delay: Duration::ZERO,
      })
    });
    assert_eq!(pipeline.wait(), Some(PipelineEvent::Ready));

    let dir = std::env::temp_dir().join("xuejian-task-test/nothing-to-export");
    let _ = std::fs::remove_dir_all(&dir);
    let output =
      crate::output::PdfReportOutput::new(&dir, crate::output::ReportNaming::Unique);
    assert!(matches!(
      pipeline.export(&output),
      Err(PipelineError::NothingToExport)
    ));
    assert!(!dir.exists());
  }

  #[test]
  fn cardinality_mismatch_fails_only_that_attempt() {
    let mut pipeline = Pipeline::new(|| {
      Ok(FixedModel {
        scores: vec![0.5, 0.5],
        delay: Duration::ZERO,
      })
    });
    assert_eq!(pipeline.wait(), Some(PipelineEvent::Ready));

    pipeline.submit(sample_image()).unwrap();
    match pipeline.wait() {
      Some(PipelineEvent::Failed(message)) => assert!(message.contains("标签数量不匹配")),
      other => panic!("意外事件: {:?}", other),
    }

    // 失败后回到 Ready，可继续提交
    assert_eq!(pipeline.state(), PipelineState::Ready);
    assert!(pipeline.submit(sample_image()).is_ok());
  }
}
