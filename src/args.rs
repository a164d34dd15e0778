// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 解码参数配置
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

use std::path::PathBuf;

use clap::Args;

use crate::{
  config::{BboxOrder, ConfigError, DecodeConfig, DecodeOverrides, ModelIntrinsics},
  frame::Size,
};

/// 解码相关的运行时参数，各程序通过 `#[command(flatten)]` 复用
#[derive(Args, Debug, Clone, Default)]
pub struct DecodeArgs {
  /// 模型参数文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub intrinsics: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)，默认 0.55
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)，默认 0.65
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,

  /// 最大检测数量，默认 10
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,

  /// 原始边界框为归一化坐标
  #[arg(long, overrides_with = "no_bbox_normalization")]
  pub bbox_normalization: bool,

  #[arg(long, overrides_with = "bbox_normalization")]
  pub no_bbox_normalization: bool,

  /// 原始边界框坐标顺序
  #[arg(long, value_enum, value_name = "ORDER")]
  pub bbox_order: Option<BboxOrder>,

  /// 后处理方式: "" 表示通用解码, "nanodet" 表示无锚框解码
  #[arg(long, value_name = "KIND")]
  pub postprocess: Option<String>,

  /// 保持输入宽高比
  #[arg(short = 'r', long, overrides_with = "no_preserve_aspect_ratio")]
  pub preserve_aspect_ratio: bool,

  #[arg(long, overrides_with = "preserve_aspect_ratio")]
  pub no_preserve_aspect_ratio: bool,

  /// 标签文件，每行一个类别名称
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 输出画面宽度
  #[arg(long, default_value = "1280", value_name = "WIDTH")]
  pub cam_width: u32,

  /// 输出画面高度
  #[arg(long, default_value = "720", value_name = "HEIGHT")]
  pub cam_height: u32,
}

/// 成对开关转换为三态：未设置、开、关
fn tri_state(on: bool, off: bool) -> Option<bool> {
  match (on, off) {
    (true, _) => Some(true),
    (_, true) => Some(false),
    _ => None,
  }
}

impl DecodeArgs {
  pub fn overrides(&self) -> DecodeOverrides {
    DecodeOverrides {
      threshold: self.threshold,
      iou: self.iou,
      max_detections: self.max_detections,
      bbox_normalization: tri_state(self.bbox_normalization, self.no_bbox_normalization),
      bbox_order: self.bbox_order,
      decode_variant: self.postprocess.clone(),
      preserve_aspect_ratio: tri_state(self.preserve_aspect_ratio, self.no_preserve_aspect_ratio),
      labels_path: self.labels.clone(),
    }
  }

  pub fn intrinsics(&self) -> Result<ModelIntrinsics, ConfigError> {
    match &self.intrinsics {
      Some(path) => ModelIntrinsics::from_json_file(path),
      None => Ok(ModelIntrinsics::default()),
    }
  }

  pub fn resolve(&self) -> Result<DecodeConfig, ConfigError> {
    DecodeConfig::resolve(&self.intrinsics()?, &self.overrides())
  }

  pub fn stream_size(&self) -> Size {
    Size::new(self.cam_width, self.cam_height)
  }
}
