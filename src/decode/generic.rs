// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/generic.rs - 通用回归头输出解码
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

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  decode::{Candidate, Decode, InferenceBox},
  frame::Size,
};

/// 三组一一对应的数组：框、分数、类别
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericOutput {
  pub boxes: Vec<[f32; 4]>,
  pub scores: Vec<f32>,
  pub classes: Vec<f32>,
}

impl GenericOutput {
  pub fn shapes(&self) -> Vec<Vec<usize>> {
    vec![
      vec![self.boxes.len(), 4],
      vec![self.scores.len()],
      vec![self.classes.len()],
    ]
  }
}

/// 逐个输出候选，不做抑制
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDecoder;

impl Decode for GenericDecoder {
  type Output = GenericOutput;

  fn decode(&self, output: &Self::Output, _input_size: Size) -> Vec<Candidate> {
    let GenericOutput {
      boxes,
      scores,
      classes,
    } = output;

    if boxes.len() != scores.len() || scores.len() != classes.len() {
      warn!(
        "输出数组长度不一致: 框={} 分数={} 类别={}，按最短长度截断",
        boxes.len(),
        scores.len(),
        classes.len()
      );
    }

    let candidates: Vec<Candidate> = boxes
      .iter()
      .zip(scores)
      .zip(classes)
      .filter(|((_, score), _)| score.is_finite())
      .map(|((bbox, &confidence), &class)| Candidate {
        bbox: InferenceBox::Corners(*bbox),
        confidence,
        class_index: class as i64,
      })
      .collect();

    debug!("通用解码得到 {} 个候选", candidates.len());
    candidates
  }
}
