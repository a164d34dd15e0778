// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 检测快照流水线
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

use std::sync::Arc;

use image::RgbImage;
use tracing::debug;

use crate::{
  config::DecodeConfig,
  decode::{Decoder, RawOutput},
  frame::Size,
  rank::rank,
  snapshot::{CycleDiagnostics, FrameSnapshot, assemble, debug_map},
  transform::{CoordinateMapper, CoordinateTransformer},
};

/// 相机侧在一个周期内交给流水线的全部数据
#[derive(Debug, Clone)]
pub struct CycleInput<M> {
  /// 当前帧；存在时以其尺寸作为 `source_size`
  pub frame: Option<RgbImage>,
  pub source_size: Size,
  pub input_size: Size,
  /// 推理引擎本周期没有输出时为 `None`
  pub outputs: Option<RawOutput>,
  pub metadata: M,
}

impl<M: Default> CycleInput<M> {
  pub fn new(input_size: Size, outputs: Option<RawOutput>) -> Self {
    Self {
      frame: None,
      source_size: input_size,
      input_size,
      outputs,
      metadata: M::default(),
    }
  }
}

impl<M> CycleInput<M> {
  pub fn with_frame(mut self, frame: RgbImage) -> Self {
    self.frame = Some(frame);
    self
  }

  pub fn with_source_size(mut self, source_size: Size) -> Self {
    self.source_size = source_size;
    self
  }

  pub fn with_metadata(mut self, metadata: M) -> Self {
    self.metadata = metadata;
    self
  }
}

/// 每帧同步调用一次，产出一个新的 [`FrameSnapshot`]
pub struct DetectionPipeline<Mp> {
  config: Arc<DecodeConfig>,
  decoder: Decoder,
  mapper: Mp,
}

impl<Mp: CoordinateMapper> DetectionPipeline<Mp> {
  pub fn new(config: Arc<DecodeConfig>, mapper: Mp) -> Self {
    let decoder = Decoder::for_config(&config);
    debug!("流水线解码器: {}", decoder.variant());
    Self {
      config,
      decoder,
      mapper,
    }
  }

  pub fn config(&self) -> &Arc<DecodeConfig> {
    &self.config
  }

  pub fn mapper(&self) -> &Mp {
    &self.mapper
  }

  pub fn process(&self, input: CycleInput<Mp::Metadata>) -> FrameSnapshot {
    let CycleInput {
      frame,
      source_size,
      input_size,
      outputs,
      metadata,
    } = input;

    let source_size = frame
      .as_ref()
      .map(|f| Size::new(f.width(), f.height()))
      .unwrap_or(source_size);

    let candidates = self.decoder.decode(outputs.as_ref(), input_size);
    let raw_candidates = candidates.len();

    let transformer = CoordinateTransformer::new(&self.config, &self.mapper);
    let detections = transformer.transform(candidates, input_size, &metadata);
    let ranked = rank(detections, &self.config);

    let diagnostics = CycleDiagnostics {
      input_size,
      source_size,
      output_shapes: outputs.as_ref().map(RawOutput::shapes),
      raw_candidates,
      kept: ranked.passed,
      displayed: ranked.detections.len(),
      crop: self.mapper.diagnostics(input_size, &metadata),
    };

    debug!(
      "解码完成: 候选 {} 个, 通过阈值 {} 个, 显示 {} 个",
      diagnostics.raw_candidates, diagnostics.kept, diagnostics.displayed
    );

    let debug = debug_map(&self.config, &diagnostics);
    assemble(frame, source_size, ranked, debug)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    decode::GenericOutput,
    frame::{CaptureMetadata, PixelRect},
    transform::{IdentityMapper, RoiMapper},
  };

  #[test]
  fn frame_dimensions_override_source_size() {
    let pipeline = DetectionPipeline::new(Arc::new(DecodeConfig::default()), IdentityMapper);
    let input = CycleInput::<CaptureMetadata>::new(Size::new(320, 320), None)
      .with_source_size(Size::new(1, 1))
      .with_frame(RgbImage::new(64, 48));
    let snapshot = pipeline.process(input);
    assert_eq!(snapshot.source_size, Size::new(64, 48));
    assert!(snapshot.frame.is_some());
    assert_eq!(snapshot.debug["src_size"], serde_json::json!([64, 48]));
  }

  #[test]
  fn debug_counts_follow_the_cycle() {
    let config = DecodeConfig {
      confidence_threshold: 0.5,
      max_detections: 1,
      ..Default::default()
    };
    let pipeline = DetectionPipeline::new(Arc::new(config), IdentityMapper);
    let output = RawOutput::Generic(GenericOutput {
      boxes: vec![[0.0, 0.0, 1.0, 1.0]; 3],
      scores: vec![0.9, 0.8, 0.1],
      classes: vec![0.0, 1.0, 2.0],
    });
    let snapshot = pipeline.process(CycleInput::new(Size::new(10, 10), Some(output)));
    assert_eq!(snapshot.debug["raw_candidates"], serde_json::json!(3));
    assert_eq!(snapshot.debug["kept"], serde_json::json!(2));
    assert_eq!(snapshot.debug["displayed"], serde_json::json!(1));
    assert_eq!(
      snapshot.debug["output_shapes"],
      serde_json::json!([[3, 4], [3], [3]])
    );
  }

  #[test]
  fn mismatched_output_variant_degrades_to_empty() {
    let config = DecodeConfig {
      decode_variant: crate::config::DecodeVariant::AnchorFree,
      ..Default::default()
    };
    let pipeline = DetectionPipeline::new(Arc::new(config), IdentityMapper);
    let output = RawOutput::Generic(GenericOutput {
      boxes: vec![[0.0; 4]],
      scores: vec![0.9],
      classes: vec![0.0],
    });
    let snapshot = pipeline.process(CycleInput::new(Size::new(10, 10), Some(output)));
    assert!(snapshot.detections.is_empty());
    assert!(snapshot.raw_detections.is_empty());
  }

  #[test]
  fn metadata_and_mapper_feed_crop_diagnostics() {
    let config = DecodeConfig {
      preserve_aspect_ratio: true,
      ..Default::default()
    };
    let pipeline = DetectionPipeline::new(
      Arc::new(config),
      RoiMapper::new(Size::new(1280, 720), true),
    );
    assert!(pipeline.config().preserve_aspect_ratio);

    let input_size = Size::new(320, 320);
    let roi = pipeline.mapper().roi(input_size);
    assert_eq!(roi, PixelRect::new(280, 0, 720, 720));

    let metadata =
      CaptureMetadata::new().with_entry("ScalerCrop", serde_json::json!([0, 0, 2304, 1296]));
    let input = CycleInput::new(input_size, None).with_metadata(metadata);
    let snapshot = pipeline.process(input);
    assert_eq!(snapshot.debug["roi"], serde_json::json!([280, 0, 720, 720]));
    assert_eq!(
      snapshot.debug["scaler_crop"],
      serde_json::json!([0, 0, 2304, 1296])
    );
  }
}
