// 该文件是 Shanan （山南西风） 项目的一部分。
// src/snapshot.rs - 帧快照定义与组装
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
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{config::DecodeConfig, frame::Size, rank::Ranked, transform::CropDiagnostics};

const TOP_SUMMARY_LEN: usize = 3;

/// 检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  /// 类别名称
  pub label: String,
  /// 置信度
  pub confidence: f32,
  /// 显示空间中的 [x, y, w, h]
  pub bbox: [i32; 4],
}

pub type DebugMap = Map<String, Value>;

/// 一次解码周期的完整结果，交给展示层后即丢弃
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
  #[serde(skip)]
  pub frame: Option<RgbImage>,
  pub source_size: Size,
  pub detections: Vec<Detection>,
  pub raw_detections: Vec<Detection>,
  pub top3: Vec<(String, f32)>,
  pub debug: DebugMap,
}

impl FrameSnapshot {
  pub fn empty(source_size: Size) -> Self {
    Self {
      frame: None,
      source_size,
      detections: Vec::new(),
      raw_detections: Vec::new(),
      top3: Vec::new(),
      debug: DebugMap::new(),
    }
  }

  /// 前三个检测结果（带边界框），用于标注显示
  pub fn top_detections(&self) -> &[Detection] {
    let n = self.detections.len().min(TOP_SUMMARY_LEN);
    &self.detections[..n]
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

/// 本周期的诊断数据
#[derive(Debug, Clone, Default)]
pub struct CycleDiagnostics {
  pub input_size: Size,
  pub source_size: Size,
  pub output_shapes: Option<Vec<Vec<usize>>>,
  pub raw_candidates: usize,
  pub kept: usize,
  pub displayed: usize,
  pub crop: CropDiagnostics,
}

pub fn debug_map(config: &DecodeConfig, diagnostics: &CycleDiagnostics) -> DebugMap {
  let value = json!({
    "threshold": config.confidence_threshold,
    "iou": config.iou_threshold,
    "max_detections": config.max_detections,
    "raw_topk": config.raw_topk,
    "input_size": diagnostics.input_size,
    "src_size": diagnostics.source_size,
    "bbox_order": config.bbox_order.as_str(),
    "bbox_normalization": config.bbox_normalization,
    "preserve_aspect_ratio": config.preserve_aspect_ratio,
    "decode_variant": config.decode_variant.as_str(),
    "postprocess": config.decode_variant.postprocess(),
    "network_name": config.network_name,
    "output_shapes": diagnostics.output_shapes,
    "raw_candidates": diagnostics.raw_candidates,
    "kept": diagnostics.kept,
    "displayed": diagnostics.displayed,
    "roi": diagnostics.crop.roi,
    "scaler_crop": diagnostics.crop.scaler_crop,
  });

  match value {
    Value::Object(map) => map,
    _ => DebugMap::new(),
  }
}

pub fn assemble(
  frame: Option<RgbImage>,
  source_size: Size,
  ranked: Ranked,
  debug: DebugMap,
) -> FrameSnapshot {
  let top3 = ranked
    .detections
    .iter()
    .take(TOP_SUMMARY_LEN)
    .map(|d| (d.label.clone(), d.confidence))
    .collect();

  FrameSnapshot {
    frame,
    source_size,
    detections: ranked.detections,
    raw_detections: ranked.raw_detections,
    top3,
    debug,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::PixelRect;

  fn det(label: &str, confidence: f32) -> Detection {
    Detection {
      label: label.into(),
      confidence,
      bbox: [0, 0, 0, 0],
    }
  }

  #[test]
  fn top3_projects_first_three_detections() {
    let ranked = Ranked {
      detections: vec![det("a", 0.9), det("b", 0.8), det("c", 0.7), det("d", 0.6)],
      raw_detections: Vec::new(),
      passed: 4,
    };
    let snapshot = assemble(None, Size::new(10, 10), ranked, DebugMap::new());
    assert_eq!(
      snapshot.top3,
      vec![
        ("a".to_string(), 0.9),
        ("b".to_string(), 0.8),
        ("c".to_string(), 0.7)
      ]
    );
    assert_eq!(snapshot.top_detections().len(), 3);
  }

  #[test]
  fn top3_is_shorter_when_few_detections() {
    let ranked = Ranked {
      detections: vec![det("a", 0.9)],
      ..Default::default()
    };
    let snapshot = assemble(None, Size::new(10, 10), ranked, DebugMap::new());
    assert_eq!(snapshot.top3.len(), 1);
    assert_eq!(snapshot.top_detections(), &[det("a", 0.9)]);
  }

  #[test]
  fn debug_map_records_configuration_and_counts() {
    let diagnostics = CycleDiagnostics {
      input_size: Size::new(320, 320),
      source_size: Size::new(1280, 720),
      raw_candidates: 7,
      kept: 2,
      displayed: 2,
      crop: CropDiagnostics {
        roi: Some(PixelRect::new(1, 2, 3, 4)),
        scaler_crop: None,
      },
      ..Default::default()
    };
    let debug = debug_map(&DecodeConfig::default(), &diagnostics);
    assert_eq!(debug["input_size"], json!([320, 320]));
    assert_eq!(debug["raw_candidates"], json!(7));
    assert_eq!(debug["kept"], json!(2));
    assert_eq!(debug["bbox_order"], json!("yx"));
    assert_eq!(debug["decode_variant"], json!("generic"));
    assert_eq!(debug["postprocess"], json!(""));
    assert_eq!(debug["roi"], json!([1, 2, 3, 4]));
    assert_eq!(debug["scaler_crop"], Value::Null);
    assert_eq!(debug["raw_topk"], json!(20));
  }

  #[test]
  fn debug_map_reports_nanodet_postprocess() {
    let config = DecodeConfig {
      decode_variant: crate::config::DecodeVariant::AnchorFree,
      ..Default::default()
    };
    let debug = debug_map(&config, &CycleDiagnostics::default());
    assert_eq!(debug["decode_variant"], json!("nanodet"));
    assert_eq!(debug["postprocess"], json!("nanodet"));
  }
}
