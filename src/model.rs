// 该文件是 Xuejian （血检） 项目的一部分。
// src/model.rs - 模型与分类结果
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

use thiserror::Error;

use crate::frame::RgbNormFrame;

pub const MODEL_INPUT_W: u32 = 224;
pub const MODEL_INPUT_H: u32 = 224;

/// 模型期望的输入帧类型
pub type ModelFrame = RgbNormFrame<MODEL_INPUT_W, MODEL_INPUT_H>;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn from_label_id(id: u32) -> Self;
}

/// 血涂片分类标签，顺序与模型输出向量对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloodLabel {
  Cancer,
  Healthy,
  Unknown,
}

impl BloodLabel {
  pub const COUNT: usize = 3;
  pub const ALL: [BloodLabel; Self::COUNT] =
    [BloodLabel::Cancer, BloodLabel::Healthy, BloodLabel::Unknown];
}

impl WithLabel for BloodLabel {
  fn to_label_str(&self) -> String {
    match self {
      BloodLabel::Cancer => "Cancer".to_string(),
      BloodLabel::Healthy => "Healthy".to_string(),
      BloodLabel::Unknown => "Unknown Image".to_string(),
    }
  }

  fn from_label_id(id: u32) -> Self {
    match id {
      0 => BloodLabel::Cancer,
      1 => BloodLabel::Healthy,
      _ => BloodLabel::Unknown,
    }
  }
}

/// 模型输出：逐标签的分数向量
#[derive(Debug, Clone)]
pub struct ClassScores {
  pub scores: Box<[f32]>,
}

impl ClassScores {
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }
}

impl From<Vec<f32>> for ClassScores {
  fn from(scores: Vec<f32>) -> Self {
    Self {
      scores: scores.into_boxed_slice(),
    }
  }
}

/// 一次分类的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub label: BloodLabel,
  /// 置信度百分比，取值 [0, 100]
  pub confidence: f32,
}

impl std::fmt::Display for Classification {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "Type: {}, Confidence: {:.2}%",
      self.label.to_label_str(),
      self.confidence
    )
  }
}

#[derive(Error, Debug)]
pub enum InterpretError {
  #[error("标签数量不匹配: 模型输出 {actual} 项, 标签 {expected} 项")]
  LabelMismatch { expected: usize, actual: usize },
}

/// 解释分数向量：取最高分对应的标签，分数并列时保留最小下标
pub fn interpret(scores: &ClassScores) -> Result<Classification, InterpretError> {
  if scores.len() != BloodLabel::COUNT {
    return Err(InterpretError::LabelMismatch {
      expected: BloodLabel::COUNT,
      actual: scores.len(),
    });
  }

  let mut best_id = 0usize;
  let mut best_score = scores.scores[0];
  for (id, &score) in scores.scores.iter().enumerate().skip(1) {
    if score > best_score {
      best_score = score;
      best_id = id;
    }
  }

  Ok(Classification {
    label: BloodLabel::from_label_id(best_id as u32),
    confidence: best_score * 100.0,
  })
}

mod blood_net;
pub use self::blood_net::{BloodNet, BloodNetBuilder, BloodNetError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interpret_picks_highest_score() {
    let scores = ClassScores::from(vec![0.1, 0.85, 0.05]);
    let result = interpret(&scores).unwrap();
    assert_eq!(result.label, BloodLabel::Healthy);
    assert_eq!(format!("{:.2}", result.confidence), "85.00");
  }

  #[test]
  fn interpret_tie_keeps_lowest_index() {
    let scores = ClassScores::from(vec![0.5, 0.5, 0.0]);
    let result = interpret(&scores).unwrap();
    assert_eq!(result.label, BloodLabel::Cancer);
  }

  #[test]
  fn interpret_is_deterministic() {
    let scores = ClassScores::from(vec![0.2, 0.3, 0.5]);
    let a = interpret(&scores).unwrap();
    let b = interpret(&scores).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn interpret_rejects_cardinality_mismatch() {
    let scores = ClassScores::from(vec![0.4, 0.6]);
    assert!(matches!(
      interpret(&scores),
      Err(InterpretError::LabelMismatch {
        expected: 3,
        actual: 2
      })
    ));
  }

  #[test]
  fn label_strings_are_fixed() {
    assert_eq!(BloodLabel::Cancer.to_label_str(), "Cancer");
    assert_eq!(BloodLabel::Healthy.to_label_str(), "Healthy");
    assert_eq!(BloodLabel::Unknown.to_label_str(), "Unknown Image");
  }

  #[test]
  fn display_formats_two_decimals() {
    let result = Classification {
      label: BloodLabel::Healthy,
      confidence: 85.0,
    };
    assert_eq!(result.to_string(), "Type: Healthy, Confidence: 85.00%");
  }
}
