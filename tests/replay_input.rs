// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/replay_input.rs - 录制周期回放输入测试
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

use std::{fs, path::Path, sync::Arc};

use image::RgbImage;
use shanan_exhibit::{
  FromUrl,
  config::{BboxOrder, DecodeConfig, DecodeVariant},
  decode::RawOutput,
  frame::{PixelRect, Size},
  input::{ReplayInput, ReplayInputError},
  pipeline::DetectionPipeline,
  transform::RoiMapper,
};
use url::Url;

const TWO_CYCLES: &str = r#"{"input_size":[320,320],"source_size":[1280,720],"metadata":{"ScalerCrop":[0,0,2304,1296]},"outputs":{"kind":"generic","boxes":[[32,32,96,160],[0,0,10,10]],"scores":[0.9,0.3],"classes":[0,1]}}

{"input_size":[320,320]}
"#;

fn write_recording(dir: &Path, text: &str) -> std::path::PathBuf {
  let path = dir.join("cycles.jsonl");
  fs::write(&path, text).unwrap();
  path
}

fn replay_url(path: &Path, query: &str) -> Url {
  Url::parse(&format!("replay://{}{}", path.display(), query)).unwrap()
}

#[test]
fn parses_each_line_as_a_cycle() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_recording(dir.path(), TWO_CYCLES);

  let mut input = ReplayInput::open(&path, false).unwrap();
  assert_eq!(input.len(), 2);

  let first = input.next().unwrap();
  assert_eq!(first.input_size, Size::new(320, 320));
  assert_eq!(first.source_size, Size::new(1280, 720));
  assert!(matches!(first.outputs, Some(RawOutput::Generic(_))));
  assert_eq!(
    first.metadata.scaler_crop(),
    Some(PixelRect::new(0, 0, 2304, 1296))
  );

  let second = input.next().unwrap();
  assert_eq!(second.source_size, second.input_size);
  assert!(second.outputs.is_none());
  assert!(second.metadata.is_empty());

  assert!(input.next().is_none());
}

#[test]
fn loop_query_restarts_the_recording() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_recording(dir.path(), TWO_CYCLES);

  let input = ReplayInput::from_url(&replay_url(&path, "?loop")).unwrap();
  assert_eq!(input.take(5).count(), 5);

  let input = ReplayInput::from_url(&replay_url(&path, "")).unwrap();
  assert_eq!(input.count(), 2);
}

#[test]
fn rejects_foreign_scheme() {
  let url = Url::parse("folder:///tmp/cycles.jsonl").unwrap();
  assert!(matches!(
    ReplayInput::from_url(&url),
    Err(ReplayInputError::SchemeMismatch)
  ));
}

#[test]
fn blank_recording_is_an_error() {
  let result = ReplayInput::parse("\n  \n", Default::default(), false);
  assert!(matches!(result, Err(ReplayInputError::Empty)));
}

#[test]
fn malformed_line_reports_its_number() {
  let text = "{\"input_size\":[320,320]}\nnot json\n";
  match ReplayInput::parse(text, Default::default(), false) {
    Err(ReplayInputError::FormatError { line, .. }) => assert_eq!(line, 2),
    other => panic!("unexpected result: {:?}", other.map(|i| i.len())),
  }
}

#[test]
fn missing_frame_image_is_skipped() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_recording(
    dir.path(),
    "{\"input_size\":[16,16],\"frame\":\"missing.png\"}\n",
  );

  let cycle = ReplayInput::open(&path, false).unwrap().next().unwrap();
  assert!(cycle.frame.is_none());
}

#[test]
fn frame_is_loaded_relative_to_the_recording() {
  let dir = tempfile::tempdir().unwrap();
  RgbImage::new(80, 60).save(dir.path().join("frame.png")).unwrap();
  let path = write_recording(
    dir.path(),
    "{\"input_size\":[16,16],\"source_size\":[1,1],\"frame\":\"frame.png\"}\n",
  );

  let cycle = ReplayInput::open(&path, false).unwrap().next().unwrap();
  let frame = cycle.frame.as_ref().unwrap();
  assert_eq!((frame.width(), frame.height()), (80, 60));

  let pipeline = DetectionPipeline::new(
    Arc::new(DecodeConfig::default()),
    RoiMapper::new(Size::new(80, 60), false),
  );
  let snapshot = pipeline.process(cycle);
  assert_eq!(snapshot.source_size, Size::new(80, 60));
}

#[test]
fn replayed_cycle_flows_through_the_pipeline() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_recording(dir.path(), TWO_CYCLES);
  let cycle = ReplayInput::open(&path, false).unwrap().next().unwrap();

  let config = DecodeConfig {
    bbox_order: BboxOrder::Xy,
    confidence_threshold: 0.5,
    ..Default::default()
  };
  // 1280x720 的流，320x320 输入，不保持宽高比时 x 放大 4 倍、y 放大 2.25 倍
  let pipeline = DetectionPipeline::new(Arc::new(config), RoiMapper::new(Size::new(1280, 720), false));
  let snapshot = pipeline.process(cycle);

  assert_eq!(snapshot.detections.len(), 1);
  assert_eq!(snapshot.detections[0].bbox, [128, 72, 256, 288]);
  assert_eq!(snapshot.raw_detections.len(), 2);
  assert_eq!(snapshot.debug["roi"], serde_json::json!([0, 0, 1280, 720]));
  assert_eq!(
    snapshot.debug["scaler_crop"],
    serde_json::json!([0, 0, 2304, 1296])
  );
}

#[test]
fn recorded_anchor_free_cycle_with_bogus_shape_is_empty() {
  let line = format!(
    "{{\"input_size\":[32,32],\"outputs\":{{\"kind\":\"anchor_free\",\"shape\":[{},100],\"data\":[0.5]}}}}\n",
    usize::MAX / 2
  );
  let cycle = ReplayInput::parse(&line, Default::default(), false)
    .unwrap()
    .next()
    .unwrap();

  let config = DecodeConfig {
    decode_variant: DecodeVariant::AnchorFree,
    ..Default::default()
  };
  let pipeline = DetectionPipeline::new(Arc::new(config), RoiMapper::new(Size::new(32, 32), false));
  let snapshot = pipeline.process(cycle);
  assert!(snapshot.detections.is_empty());
  assert!(snapshot.raw_detections.is_empty());
}
