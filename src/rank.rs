// 该文件是 Shanan （山南西风） 项目的一部分。
// src/rank.rs - 置信度过滤与排序
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

use crate::{config::DecodeConfig, snapshot::Detection};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranked {
  /// 通过阈值并截断到 `max_detections`
  pub detections: Vec<Detection>,
  /// 阈值前的前 `raw_topk` 个
  pub raw_detections: Vec<Detection>,
  /// 通过阈值的数量（截断前）
  pub passed: usize,
}

/// 稳定降序排序后，分别取原始 Top-K 与过滤后的检测结果。
///
/// 两个列表来自同一排序序列；先过滤再截断。
pub fn rank(mut candidates: Vec<Detection>, config: &DecodeConfig) -> Ranked {
  // sort_by 是稳定排序，同分保持候选原顺序
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let raw_detections: Vec<Detection> = candidates.iter().take(config.raw_topk).cloned().collect();

  let mut detections: Vec<Detection> = candidates
    .into_iter()
    .filter(|d| d.confidence >= config.confidence_threshold)
    .collect();
  let passed = detections.len();
  detections.truncate(config.max_detections);

  Ranked {
    detections,
    raw_detections,
    passed,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(label: &str, confidence: f32) -> Detection {
    Detection {
      label: label.to_string(),
      confidence,
      bbox: [0, 0, 1, 1],
    }
  }

  fn config(threshold: f32, max_detections: usize) -> DecodeConfig {
    DecodeConfig {
      confidence_threshold: threshold,
      max_detections,
      ..Default::default()
    }
  }

  fn confidences(list: &[Detection]) -> Vec<f32> {
    list.iter().map(|d| d.confidence).collect()
  }

  #[test]
  fn filters_and_keeps_raw_view() {
    let ranked = rank(
      vec![det("a", 0.4), det("b", 0.9), det("c", 0.2), det("d", 0.7)],
      &config(0.5, 10),
    );
    assert_eq!(confidences(&ranked.detections), vec![0.9, 0.7]);
    assert_eq!(confidences(&ranked.raw_detections), vec![0.9, 0.7, 0.4, 0.2]);
    assert_eq!(ranked.passed, 2);
  }

  #[test]
  fn caps_after_filtering() {
    let ranked = rank(vec![det("a", 0.94), det("b", 0.95)], &config(0.5, 1));
    assert_eq!(confidences(&ranked.detections), vec![0.95]);
    assert_eq!(ranked.raw_detections.len(), 2);
  }

  #[test]
  fn ties_keep_candidate_order() {
    let ranked = rank(
      vec![det("first", 0.6), det("second", 0.6), det("third", 0.6)],
      &config(0.5, 10),
    );
    let labels: Vec<_> = ranked.detections.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["first", "second", "third"]);
  }

  #[test]
  fn threshold_is_inclusive() {
    let ranked = rank(vec![det("a", 0.5)], &config(0.5, 10));
    assert_eq!(ranked.detections.len(), 1);
  }

  #[test]
  fn raw_view_is_bounded_by_topk() {
    let candidates = (0..50).map(|i| det("x", i as f32 / 50.0)).collect();
    let ranked = rank(candidates, &config(0.0, 100));
    assert_eq!(ranked.raw_detections.len(), config(0.0, 100).raw_topk);
    assert_eq!(ranked.detections.len(), 50);
  }
}
