// 该文件是 Shanan （山南西风） 项目的一部分。
// src/transform.rs - 坐标变换与标签解析
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

use crate::{
  config::{BboxOrder, DecodeConfig},
  decode::{Candidate, InferenceBox},
  frame::{CaptureMetadata, PixelRect, Size},
  snapshot::Detection,
};

/// 推理空间中的角点形式边界框，像素单位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxCorners {
  pub x0: f32,
  pub y0: f32,
  pub x1: f32,
  pub y1: f32,
}

impl BoxCorners {
  pub fn width(&self) -> f32 {
    self.x1 - self.x0
  }

  pub fn height(&self) -> f32 {
    self.y1 - self.y0
  }
}

/// 按坐标顺序重排，并在需要时把归一化坐标放大到输入尺寸
pub fn correct_corners(
  raw: [f32; 4],
  order: BboxOrder,
  normalized: bool,
  input_size: Size,
) -> BoxCorners {
  let (sx, sy) = if normalized {
    (input_size.width as f32, input_size.height as f32)
  } else {
    (1.0, 1.0)
  };

  let [x0, y0, x1, y1] = match order {
    BboxOrder::Yx => [raw[1], raw[0], raw[3], raw[2]],
    BboxOrder::Xy => raw,
  };

  BoxCorners {
    x0: x0 * sx,
    y0: y0 * sy,
    x1: x1 * sx,
    y1: y1 * sy,
  }
}

pub fn center_to_corners([cx, cy, w, h]: [f32; 4]) -> BoxCorners {
  BoxCorners {
    x0: cx - w / 2.0,
    y0: cy - h / 2.0,
    x1: cx + w / 2.0,
    y1: cy + h / 2.0,
  }
}

/// 类别索引越界时使用合成名称
pub fn resolve_label(labels: &[String], class_index: i64) -> String {
  usize::try_from(class_index)
    .ok()
    .and_then(|i| labels.get(i))
    .cloned()
    .unwrap_or_else(|| format!("Class {}", class_index))
}

/// 相机侧提供的裁剪诊断信息
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CropDiagnostics {
  pub roi: Option<PixelRect>,
  pub scaler_crop: Option<PixelRect>,
}

/// 把推理空间的框映射到显示/传感器空间。
///
/// 由相机侧在构造流水线时注入。
pub trait CoordinateMapper {
  type Metadata;

  /// 返回 `[x, y, w, h]`
  fn map_box(&self, corners: &BoxCorners, input_size: Size, metadata: &Self::Metadata)
  -> [f32; 4];

  fn diagnostics(&self, _input_size: Size, _metadata: &Self::Metadata) -> CropDiagnostics {
    CropDiagnostics::default()
  }
}

/// 不做缩放，推理空间即显示空间
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl CoordinateMapper for IdentityMapper {
  type Metadata = CaptureMetadata;

  fn map_box(&self, corners: &BoxCorners, _input_size: Size, _metadata: &CaptureMetadata) -> [f32; 4] {
    [corners.x0, corners.y0, corners.width(), corners.height()]
  }

  fn diagnostics(&self, _input_size: Size, metadata: &CaptureMetadata) -> CropDiagnostics {
    CropDiagnostics {
      roi: None,
      scaler_crop: metadata.scaler_crop(),
    }
  }
}

/// 网络看到的是输出画面中的一个区域（ROI），按比例映射回输出画面。
///
/// 保持宽高比时 ROI 是画面中居中的、与输入宽高比一致的最大矩形，否则为整个画面。
#[derive(Debug, Clone, Copy)]
pub struct RoiMapper {
  stream_size: Size,
  preserve_aspect_ratio: bool,
}

impl RoiMapper {
  pub fn new(stream_size: Size, preserve_aspect_ratio: bool) -> Self {
    Self {
      stream_size,
      preserve_aspect_ratio,
    }
  }

  pub fn for_config(stream_size: Size, config: &DecodeConfig) -> Self {
    Self::new(stream_size, config.preserve_aspect_ratio)
  }

  pub fn roi(&self, input_size: Size) -> PixelRect {
    let stream = self.stream_size;
    if !self.preserve_aspect_ratio || input_size.is_empty() || stream.is_empty() {
      return PixelRect::full(stream);
    }

    let input_ar = input_size.aspect_ratio();
    if stream.aspect_ratio() > input_ar {
      let height = stream.height as i32;
      let width = (stream.height as f32 * input_ar).round() as i32;
      PixelRect::new((stream.width as i32 - width) / 2, 0, width, height)
    } else {
      let width = stream.width as i32;
      let height = (stream.width as f32 / input_ar).round() as i32;
      PixelRect::new(0, (stream.height as i32 - height) / 2, width, height)
    }
  }
}

impl CoordinateMapper for RoiMapper {
  type Metadata = CaptureMetadata;

  fn map_box(&self, corners: &BoxCorners, input_size: Size, _metadata: &CaptureMetadata) -> [f32; 4] {
    if input_size.is_empty() {
      return [corners.x0, corners.y0, corners.width(), corners.height()];
    }

    let roi = self.roi(input_size);
    let sx = roi.width as f32 / input_size.width as f32;
    let sy = roi.height as f32 / input_size.height as f32;

    [
      roi.x as f32 + corners.x0 * sx,
      roi.y as f32 + corners.y0 * sy,
      corners.width() * sx,
      corners.height() * sy,
    ]
  }

  fn diagnostics(&self, input_size: Size, metadata: &CaptureMetadata) -> CropDiagnostics {
    CropDiagnostics {
      roi: Some(self.roi(input_size)),
      scaler_crop: metadata.scaler_crop(),
    }
  }
}

/// 把候选框转换为带标签、位于显示空间的检测结果
pub struct CoordinateTransformer<'a, Mp> {
  config: &'a DecodeConfig,
  mapper: &'a Mp,
}

impl<'a, Mp: CoordinateMapper> CoordinateTransformer<'a, Mp> {
  pub fn new(config: &'a DecodeConfig, mapper: &'a Mp) -> Self {
    Self { config, mapper }
  }

  pub fn to_corners(&self, bbox: &InferenceBox, input_size: Size) -> BoxCorners {
    match *bbox {
      InferenceBox::Corners(raw) => correct_corners(
        raw,
        self.config.bbox_order,
        self.config.bbox_normalization,
        input_size,
      ),
      InferenceBox::Center(raw) => center_to_corners(raw),
    }
  }

  pub fn transform(
    &self,
    candidates: Vec<Candidate>,
    input_size: Size,
    metadata: &Mp::Metadata,
  ) -> Vec<Detection> {
    candidates
      .into_iter()
      .map(|candidate| {
        let corners = self.to_corners(&candidate.bbox, input_size);
        let [x, y, w, h] = self.mapper.map_box(&corners, input_size, metadata);
        Detection {
          label: resolve_label(&self.config.labels, candidate.class_index),
          confidence: candidate.confidence,
          bbox: [x as i32, y as i32, w as i32, h as i32],
        }
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yx_normalized_matches_xy_pixels() {
    let input = Size::new(320, 240);
    let normalized = correct_corners([0.25, 0.125, 0.75, 0.5], BboxOrder::Yx, true, input);
    let pixels = correct_corners([40.0, 60.0, 160.0, 180.0], BboxOrder::Xy, false, input);
    assert_eq!(normalized, pixels);
  }

  #[test]
  fn xy_normalized_scales_width_then_height() {
    let corners = correct_corners([0.5, 0.5, 1.0, 1.0], BboxOrder::Xy, true, Size::new(200, 100));
    assert_eq!(
      corners,
      BoxCorners {
        x0: 100.0,
        y0: 50.0,
        x1: 200.0,
        y1: 100.0
      }
    );
  }

  #[test]
  fn yx_without_normalization_only_reorders() {
    let corners = correct_corners([1.0, 2.0, 3.0, 4.0], BboxOrder::Yx, false, Size::new(9, 9));
    assert_eq!(
      corners,
      BoxCorners {
        x0: 2.0,
        y0: 1.0,
        x1: 4.0,
        y1: 3.0
      }
    );
  }

  #[test]
  fn center_form_converts_to_corners() {
    let corners = center_to_corners([10.0, 20.0, 4.0, 8.0]);
    assert_eq!(
      corners,
      BoxCorners {
        x0: 8.0,
        y0: 16.0,
        x1: 12.0,
        y1: 24.0
      }
    );
  }

  #[test]
  fn out_of_range_class_gets_synthesized_name() {
    let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    assert_eq!(resolve_label(&labels, 1), "b");
    assert_eq!(resolve_label(&labels, 999), "Class 999");
    assert_eq!(resolve_label(&labels, -1), "Class -1");
  }

  #[test]
  fn roi_mapper_without_aspect_ratio_stretches_to_stream() {
    let mapper = RoiMapper::new(Size::new(1280, 720), false);
    let corners = BoxCorners {
      x0: 80.0,
      y0: 80.0,
      x1: 160.0,
      y1: 240.0,
    };
    let mapped = mapper.map_box(&corners, Size::new(320, 320), &CaptureMetadata::new());
    assert_eq!(mapped, [320.0, 180.0, 320.0, 360.0]);
  }

  #[test]
  fn roi_mapper_preserving_aspect_ratio_letterboxes() {
    let mapper = RoiMapper::new(Size::new(1280, 720), true);
    assert_eq!(mapper.roi(Size::new(320, 320)), PixelRect::new(280, 0, 720, 720));
    let corners = BoxCorners {
      x0: 0.0,
      y0: 0.0,
      x1: 320.0,
      y1: 160.0,
    };
    let mapped = mapper.map_box(&corners, Size::new(320, 320), &CaptureMetadata::new());
    assert_eq!(mapped, [280.0, 0.0, 720.0, 360.0]);

    let tall = RoiMapper::new(Size::new(480, 640), true);
    assert_eq!(tall.roi(Size::new(320, 320)), PixelRect::new(0, 80, 480, 480));
  }

  #[test]
  fn transformer_truncates_to_integers() {
    let config = DecodeConfig {
      labels: vec!["cat".into()],
      bbox_order: BboxOrder::Xy,
      ..Default::default()
    };
    let mapper = IdentityMapper;
    let transformer = CoordinateTransformer::new(&config, &mapper);
    let detections = transformer.transform(
      vec![Candidate {
        bbox: InferenceBox::Corners([1.9, 2.5, 10.2, 20.99]),
        confidence: 0.7,
        class_index: 0,
      }],
      Size::new(100, 100),
      &CaptureMetadata::new(),
    );
    assert_eq!(detections[0].label, "cat");
    assert_eq!(detections[0].bbox, [1, 2, 8, 18]);
  }
}
