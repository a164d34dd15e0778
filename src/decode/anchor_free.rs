// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/anchor_free.rs - NanoDet 风格无锚框输出解码
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
  config::{DEFAULT_REG_MAX, DEFAULT_STRIDES, DecodeConfig},
  decode::{Candidate, Decode, InferenceBox, sigmoid},
  frame::Size,
};
/// NMS 前保留的最高分候选数
const NMS_PRE_TOPK: usize = 1000;
/// 抑制在阈值过滤之前进行
const NMS_MIN_CONFIDENCE: f32 = 0.0;

/// 单个输出张量，形状为 `[锚点数, 类别数 + 4 * (reg_max + 1)]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorFreeOutput {
  pub shape: [usize; 2],
  pub data: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct AnchorFreeDecoder {
  iou_threshold: f32,
  max_output: usize,
  reg_max: usize,
  strides: Vec<u32>,
  logit_scores: bool,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
  corners: [f32; 4], // [x_min, y_min, x_max, y_max]
  score: f32,
  class_index: usize,
}

impl AnchorFreeDecoder {
  pub fn new(iou_threshold: f32, max_output: usize) -> Self {
    Self {
      iou_threshold,
      max_output,
      reg_max: DEFAULT_REG_MAX,
      strides: DEFAULT_STRIDES.to_vec(),
      logit_scores: false,
    }
  }

  pub fn for_config(config: &DecodeConfig) -> Self {
    Self::new(config.iou_threshold, config.candidate_cap())
      .with_reg_max(config.reg_max)
      .with_strides(config.strides.clone())
      .with_logit_scores(config.logit_scores)
  }

  pub fn with_reg_max(mut self, reg_max: usize) -> Self {
    self.reg_max = reg_max;
    self
  }

  pub fn with_strides(mut self, strides: Vec<u32>) -> Self {
    self.strides = strides;
    self
  }

  /// 分类分数为未激活的 logit 时需要先做 sigmoid
  pub fn with_logit_scores(mut self, logit_scores: bool) -> Self {
    self.logit_scores = logit_scores;
    self
  }

  fn bins(&self) -> usize {
    self.reg_max + 1
  }

  /// 各检测层锚点总数，溢出时为 `None`
  fn anchor_count(&self, input_size: Size) -> Option<usize> {
    self
      .strides
      .iter()
      .filter(|&&s| s > 0)
      .try_fold(0usize, |total, &stride| {
        let feat_w = input_size.width.div_ceil(stride) as usize;
        let feat_h = input_size.height.div_ceil(stride) as usize;
        total.checked_add(feat_w.checked_mul(feat_h)?)
      })
  }

  /// 按检测层顺序生成锚点中心 (cx, cy, stride)
  fn anchor_points(&self, input_size: Size) -> Vec<(f32, f32, f32)> {
    let mut points = Vec::new();
    for &stride in self.strides.iter().filter(|&&s| s > 0) {
      let feat_w = input_size.width.div_ceil(stride);
      let feat_h = input_size.height.div_ceil(stride);
      for y in 0..feat_h {
        for x in 0..feat_w {
          points.push(((x * stride) as f32, (y * stride) as f32, stride as f32));
        }
      }
    }
    points
  }

  /// 分布回归：对每条边的 bins 做 softmax 后取期望
  fn distance(&self, bins: &[f32]) -> f32 {
    let max = bins.iter().copied().fold(f32::MIN, f32::max);
    let mut sum = 0.0;
    let mut weighted = 0.0;
    for (i, &v) in bins.iter().enumerate() {
      let e = (v - max).exp();
      sum += e;
      weighted += e * i as f32;
    }
    if sum > 0.0 { weighted / sum } else { 0.0 }
  }

  fn decode_rows(&self, output: &AnchorFreeOutput, input_size: Size) -> Option<Vec<Scored>> {
    let [num_anchors, row_len] = output.shape;
    let reg_len = self.reg_max.checked_add(1)?.checked_mul(4)?;

    if row_len <= reg_len {
      warn!(
        "输出行长度 {} 不足以容纳回归分布 {}，本帧无检测结果",
        row_len, reg_len
      );
      return None;
    }
    if num_anchors.checked_mul(row_len) != Some(output.data.len()) {
      warn!(
        "输出数据长度 {} 与形状 {:?} 不一致，本帧无检测结果",
        output.data.len(),
        output.shape
      );
      return None;
    }

    // 先按尺寸核对锚点数量，不匹配时不生成锚点网格
    let expected = self.anchor_count(input_size);
    if expected != Some(num_anchors) {
      warn!(
        "锚点数量不匹配: 输入 {}x{} 需要 {:?} 个, 输出包含 {} 个",
        input_size.width, input_size.height, expected, num_anchors
      );
      return None;
    }
    let anchors = self.anchor_points(input_size);

    let num_classes = row_len - reg_len;
    let (max_x, max_y) = (input_size.width as f32, input_size.height as f32);
    let mut items = Vec::new();

    for (row, &(cx, cy, stride)) in output.data.chunks_exact(row_len).zip(anchors.iter()) {
      let (scores, dist) = row.split_at(num_classes);

      let mut best = f32::MIN;
      let mut class_index = 0usize;
      for (c, &s) in scores.iter().enumerate() {
        if s > best {
          best = s;
          class_index = c;
        }
      }
      let score = if self.logit_scores { sigmoid(best) } else { best };
      if !score.is_finite() || score < NMS_MIN_CONFIDENCE {
        continue;
      }

      let mut sides = [0.0f32; 4];
      for (side, bins) in sides.iter_mut().zip(dist.chunks_exact(self.bins())) {
        *side = self.distance(bins) * stride;
      }
      let [left, top, right, bottom] = sides;

      items.push(Scored {
        corners: [
          (cx - left).clamp(0.0, max_x),
          (cy - top).clamp(0.0, max_y),
          (cx + right).clamp(0.0, max_x),
          (cy + bottom).clamp(0.0, max_y),
        ],
        score,
        class_index,
      });
    }

    Some(items)
  }
}

impl Decode for AnchorFreeDecoder {
  type Output = AnchorFreeOutput;

  fn decode(&self, output: &Self::Output, input_size: Size) -> Vec<Candidate> {
    if input_size.is_empty() {
      warn!("输入尺寸为空，跳过无锚框解码");
      return Vec::new();
    }

    let Some(mut items) = self.decode_rows(output, input_size) else {
      return Vec::new();
    };
    let decoded = items.len();

    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    items.truncate(NMS_PRE_TOPK);
    let kept = nms(&items, self.iou_threshold, self.max_output);

    debug!(
      "无锚框解码: {} 个锚点得分, NMS 后保留 {} 个",
      decoded,
      kept.len()
    );

    kept
      .into_iter()
      .map(|item| {
        let [x0, y0, x1, y1] = item.corners;
        let (w, h) = (x1 - x0, y1 - y0);
        Candidate {
          bbox: InferenceBox::Center([x0 + w / 2.0, y0 + h / 2.0, w, h]),
          confidence: item.score,
          class_index: item.class_index as i64,
        }
      })
      .collect()
  }
}

/// 按类别的贪心非极大值抑制，输入需已按分数降序排列
fn nms(items: &[Scored], iou_threshold: f32, limit: usize) -> Vec<Scored> {
  let mut suppressed = vec![false; items.len()];
  let mut result = Vec::new();

  for i in 0..items.len() {
    if result.len() >= limit {
      break;
    }
    if suppressed[i] {
      continue;
    }
    let best = items[i];
    result.push(best);

    for (j, other) in items.iter().enumerate().skip(i + 1) {
      if !suppressed[j]
        && other.class_index == best.class_index
        && iou(&best.corners, &other.corners) >= iou_threshold
      {
        suppressed[j] = true;
      }
    }
  }

  result
}

/// 计算两个角点形式边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
