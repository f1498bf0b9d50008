// 该文件是 Xuejian （血检） 项目的一部分。
// src/model/blood_net.rs - 血涂片分类模型
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

use std::collections::HashMap;
use std::sync::OnceLock;

use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  frame::AsNhwcTensor,
  model::{BloodLabel, ClassScores, MODEL_INPUT_H, MODEL_INPUT_W, Model},
};

const BLOOD_NUM_INPUTS: usize = 1;
const BLOOD_NUM_OUTPUTS: usize = 1;
const BLOOD_INPUT_CHANNELS: usize = 3;

pub struct BloodNet<Frame> {
  session: Session,
  input_name: String,
  _phantom: std::marker::PhantomData<Frame>,
}

#[derive(Error, Debug)]
pub enum BloodNetError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("标签配置不匹配: 模型输出 {actual} 类, 标签 {expected} 类")]
  LabelMismatch { expected: usize, actual: usize },
  #[error("推理运行时初始化失败: {0}")]
  RuntimeInitError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 初始化进程级 ONNX Runtime 环境，仅执行一次
fn ensure_runtime() -> Result<(), BloodNetError> {
  static INIT: OnceLock<Result<(), String>> = OnceLock::new();
  INIT
    .get_or_init(|| {
      ort::init()
        .with_name("xuejian")
        .commit()
        .map(|_| ())
        .map_err(|e| e.to_string())
    })
    .clone()
    .map_err(BloodNetError::RuntimeInitError)
}

pub struct BloodNetBuilder {
  model_path: String,
  optimization: GraphOptimizationLevel,
}

const BLOOD_SCHEME: &str = "onnx";

impl FromUrl for BloodNetBuilder {
  type Error = BloodNetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != BLOOD_SCHEME {
      return Err(BloodNetError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        BLOOD_SCHEME
      )));
    }

    Ok(BloodNetBuilder {
      model_path: url.path().to_string(),
      optimization: GraphOptimizationLevel::Level3,
    })
  }
}

impl BloodNetBuilder {
  pub fn optimization(mut self, level: GraphOptimizationLevel) -> Self {
    self.optimization = level;
    self
  }

  pub fn build<Frame>(self) -> Result<BloodNet<Frame>, BloodNetError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    ensure_runtime()?;

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_optimization_level(self.optimization)?
      .commit_from_memory(&model_data)?;

    if session.inputs.len() != BLOOD_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        BLOOD_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(BloodNetError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        BLOOD_NUM_INPUTS,
        session.inputs.len()
      )));
    }

    if session.outputs.len() != BLOOD_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        BLOOD_NUM_OUTPUTS,
        session.outputs.len()
      );
      return Err(BloodNetError::ModelInvalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        BLOOD_NUM_OUTPUTS,
        session.outputs.len()
      )));
    }

    let input_name = session.inputs[0].name.clone();
    match &session.inputs[0].input_type {
      ValueType::Tensor { ty, dimensions, .. } => {
        if *ty != TensorElementType::Float32 {
          error!("预期模型输入类型为 f32, 实际为 {:?}", ty);
          return Err(BloodNetError::ModelInvalid(format!(
            "预期模型输入类型为 f32, 实际为 {:?}",
            ty
          )));
        }

        // 批维允许动态，空间维与通道维必须与标定一致
        let expected = [
          MODEL_INPUT_H as i64,
          MODEL_INPUT_W as i64,
          BLOOD_INPUT_CHANNELS as i64,
        ];
        if dimensions.len() != 4 || dimensions[1..] != expected {
          error!(
            "预期模型输入形状为 [N, {}, {}, {}], 实际为 {:?}",
            MODEL_INPUT_H, MODEL_INPUT_W, BLOOD_INPUT_CHANNELS, dimensions
          );
          return Err(BloodNetError::ModelInvalid(format!(
            "预期模型输入形状为 [N, {}, {}, {}], 实际为 {:?}",
            MODEL_INPUT_H, MODEL_INPUT_W, BLOOD_INPUT_CHANNELS, dimensions
          )));
        }

        debug!("模型输入 '{}': {:?} {:?}", input_name, ty, dimensions);
      }
      other => {
        error!("预期模型输入为张量, 实际为 {:?}", other);
        return Err(BloodNetError::ModelInvalid(format!(
          "预期模型输入为张量, 实际为 {:?}",
          other
        )));
      }
    }

    match &session.outputs[0].output_type {
      ValueType::Tensor { dimensions, .. } => {
        let classes = dimensions.last().copied().unwrap_or(-1);
        if classes >= 0 && classes != BloodLabel::COUNT as i64 {
          error!(
            "模型输出 {} 类, 标签表为 {} 类, 配置不一致",
            classes,
            BloodLabel::COUNT
          );
          return Err(BloodNetError::LabelMismatch {
            expected: BloodLabel::COUNT,
            actual: classes as usize,
          });
        }
        debug!("模型输出: {:?}", dimensions);
      }
      other => {
        error!("预期模型输出为张量, 实际为 {:?}", other);
        return Err(BloodNetError::ModelInvalid(format!(
          "预期模型输出为张量, 实际为 {:?}",
          other
        )));
      }
    }

    info!("模型加载完成");

    let _phantom = std::marker::PhantomData::<Frame>;
    Ok(BloodNet {
      session,
      input_name,
      _phantom,
    })
  }
}

impl<Frame> BloodNet<Frame> {
  fn postprocess(output: ndarray::ArrayViewD<'_, f32>) -> ClassScores {
    debug!("后处理模型输出");
    let scores: Vec<f32> = output.iter().copied().collect();
    debug!("分类分数: {:?}", scores);
    ClassScores::from(scores)
  }
}

impl<Frame: AsNhwcTensor<MODEL_INPUT_W, MODEL_INPUT_H>> Model for BloodNet<Frame> {
  type Input = Frame;
  type Output = ClassScores;
  type Error = BloodNetError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("构建模型输入张量");
    let array = Array4::from_shape_vec(
      (
        1,
        MODEL_INPUT_H as usize,
        MODEL_INPUT_W as usize,
        BLOOD_INPUT_CHANNELS,
      ),
      input.as_nhwc().to_vec(),
    )
    .map_err(|e| BloodNetError::ModelInvalid(format!("输入张量形状错误: {}", e)))?;
    let array = array.into_dyn();
    let tensor = array.as_standard_layout();

    let mut inputs = HashMap::new();
    inputs.insert(self.input_name.as_str(), Tensor::from_array(&tensor)?);

    debug!("执行模型推理");
    let outputs = self.session.run(inputs)?;

    debug!("读取模型输出");
    let output = outputs[0].try_extract_tensor::<f32>()?;

    Ok(Self::postprocess(output))
  }
}
