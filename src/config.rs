// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 解码配置解析
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

use std::{
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

/// 阈值前保留的原始候选数量（固定值，与 `max_detections` 无关）
pub const RAW_TOPK: usize = 20;
/// 没有标签来源时生成的占位标签数量
pub const FALLBACK_LABEL_COUNT: usize = 1000;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.55;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.65;
pub const DEFAULT_MAX_DETECTIONS: usize = 10;
/// 无锚框输出每条边的分布 bin 数为 `reg_max + 1`
pub const DEFAULT_REG_MAX: usize = 7;
pub const DEFAULT_STRIDES: [u32; 4] = [8, 16, 32, 64];

const OBJECT_DETECTION_TASK: &str = "object detection";
const DASH_LABEL: &str = "-";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取模型参数文件 {path}: {source}")]
  IntrinsicsFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("模型参数格式错误: {0}")]
  IntrinsicsFormat(#[from] serde_json::Error),
  #[error("无法读取标签文件 {path}: {source}")]
  LabelFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("未知的解码方式: {0:?}")]
  UnknownDecodeVariant(String),
  #[error("未知的边界框坐标顺序: {0:?}")]
  UnknownBboxOrder(String),
  #[error("模型任务不是目标检测: {0:?}")]
  NotDetectionTask(String),
  #[error("无效的检测层步长: {0:?}")]
  InvalidStrides(Vec<u32>),
  #[error("参数 {name} 超出范围 [0, 1]: {value}")]
  OutOfRange { name: &'static str, value: f32 },
}

/// 原始边界框字段的坐标轴顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BboxOrder {
  /// (y0, x0, y1, x1)
  #[default]
  Yx,
  /// (x0, y0, x1, y1)
  Xy,
}

impl BboxOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      BboxOrder::Yx => "yx",
      BboxOrder::Xy => "xy",
    }
  }
}

impl FromStr for BboxOrder {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "yx" => Ok(BboxOrder::Yx),
      "xy" => Ok(BboxOrder::Xy),
      _ => Err(ConfigError::UnknownBboxOrder(s.to_string())),
    }
  }
}

impl fmt::Display for BboxOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 原始输出的解码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeVariant {
  /// 输出已经是一一对应的框、分数、类别三组数组
  #[default]
  Generic,
  /// NanoDet 风格的无锚框输出，需要解码边界框并做 NMS
  AnchorFree,
}

impl DecodeVariant {
  pub fn as_str(&self) -> &'static str {
    match self {
      DecodeVariant::Generic => "generic",
      DecodeVariant::AnchorFree => "nanodet",
    }
  }

  /// 模型参数中 `postprocess` 字段的写法，通用解码为空字符串
  pub fn postprocess(&self) -> &'static str {
    match self {
      DecodeVariant::Generic => "",
      DecodeVariant::AnchorFree => "nanodet",
    }
  }
}

impl FromStr for DecodeVariant {
  type Err = ConfigError;

  /// 空字符串与未设置等价，表示通用解码
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "" | "generic" => Ok(DecodeVariant::Generic),
      "nanodet" | "anchor-free" | "anchor_free" => Ok(DecodeVariant::AnchorFree),
      _ => Err(ConfigError::UnknownDecodeVariant(s.to_string())),
    }
  }
}

impl fmt::Display for DecodeVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 模型随附的网络参数（JSON 格式）。
///
/// 所有字段都可缺省，缺省时由运行时参数或内置默认值补齐。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelIntrinsics {
  pub network_name: Option<String>,
  pub task: Option<String>,
  pub labels: Option<Vec<String>>,
  pub ignore_dash_labels: Option<bool>,
  pub bbox_normalization: Option<bool>,
  pub bbox_order: Option<String>,
  pub postprocess: Option<String>,
  pub preserve_aspect_ratio: Option<bool>,
  pub threshold: Option<f32>,
  pub iou: Option<f32>,
  pub max_detections: Option<usize>,
  pub reg_max: Option<usize>,
  pub strides: Option<Vec<u32>>,
  /// 分类分数是否为未激活的 logit
  pub logit_scores: Option<bool>,
}

impl ModelIntrinsics {
  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载模型参数文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IntrinsicsFile {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&text)
  }
}

/// 运行时覆盖项，`None` 表示沿用模型参数
#[derive(Debug, Clone, Default)]
pub struct DecodeOverrides {
  pub threshold: Option<f32>,
  pub iou: Option<f32>,
  pub max_detections: Option<usize>,
  pub bbox_normalization: Option<bool>,
  pub bbox_order: Option<BboxOrder>,
  pub decode_variant: Option<String>,
  pub preserve_aspect_ratio: Option<bool>,
  pub labels_path: Option<PathBuf>,
}

/// 每帧解码共用的只读配置，变更时重建而不是修改
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeConfig {
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  pub max_detections: usize,
  pub raw_topk: usize,
  pub bbox_normalization: bool,
  pub bbox_order: BboxOrder,
  pub decode_variant: DecodeVariant,
  pub preserve_aspect_ratio: bool,
  pub labels: Vec<String>,
  pub network_name: Option<String>,
  pub reg_max: usize,
  pub strides: Vec<u32>,
  pub logit_scores: bool,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      max_detections: DEFAULT_MAX_DETECTIONS,
      raw_topk: RAW_TOPK,
      bbox_normalization: false,
      bbox_order: BboxOrder::default(),
      decode_variant: DecodeVariant::default(),
      preserve_aspect_ratio: false,
      labels: fallback_labels(),
      network_name: None,
      reg_max: DEFAULT_REG_MAX,
      strides: DEFAULT_STRIDES.to_vec(),
      logit_scores: false,
    }
  }
}

impl DecodeConfig {
  /// 合并模型参数与运行时覆盖项。
  ///
  /// 覆盖项优先；两者都缺省时使用内置默认值。
  pub fn resolve(
    intrinsics: &ModelIntrinsics,
    overrides: &DecodeOverrides,
  ) -> Result<Self, ConfigError> {
    match intrinsics.task.as_deref() {
      Some(task) if task != OBJECT_DETECTION_TASK => {
        error!("网络任务不是目标检测: {}", task);
        return Err(ConfigError::NotDetectionTask(task.to_string()));
      }
      _ => {}
    }

    let confidence_threshold = unit_range(
      "threshold",
      overrides
        .threshold
        .or(intrinsics.threshold)
        .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
    )?;
    let iou_threshold = unit_range(
      "iou",
      overrides
        .iou
        .or(intrinsics.iou)
        .unwrap_or(DEFAULT_IOU_THRESHOLD),
    )?;
    let max_detections = overrides
      .max_detections
      .or(intrinsics.max_detections)
      .unwrap_or(DEFAULT_MAX_DETECTIONS);

    let bbox_order = match overrides.bbox_order {
      Some(order) => order,
      None => intrinsics
        .bbox_order
        .as_deref()
        .map(BboxOrder::from_str)
        .transpose()?
        .unwrap_or_default(),
    };

    let decode_variant = overrides
      .decode_variant
      .as_deref()
      .or(intrinsics.postprocess.as_deref())
      .map(DecodeVariant::from_str)
      .transpose()?
      .unwrap_or_default();

    let mut labels = match (&overrides.labels_path, &intrinsics.labels) {
      (Some(path), _) => read_label_file(path)?,
      (None, Some(labels)) => labels.clone(),
      (None, None) => {
        debug!("未提供标签，生成 {} 个占位标签", FALLBACK_LABEL_COUNT);
        fallback_labels()
      }
    };
    let strides = match &intrinsics.strides {
      Some(strides) if strides.is_empty() || strides.contains(&0) => {
        return Err(ConfigError::InvalidStrides(strides.clone()));
      }
      Some(strides) => strides.clone(),
      None => DEFAULT_STRIDES.to_vec(),
    };

    if intrinsics.ignore_dash_labels.unwrap_or(false) {
      labels.retain(|label| !label.is_empty() && label != DASH_LABEL);
    }

    let config = DecodeConfig {
      confidence_threshold,
      iou_threshold,
      max_detections,
      raw_topk: RAW_TOPK,
      bbox_normalization: overrides
        .bbox_normalization
        .or(intrinsics.bbox_normalization)
        .unwrap_or(false),
      bbox_order,
      decode_variant,
      preserve_aspect_ratio: overrides
        .preserve_aspect_ratio
        .or(intrinsics.preserve_aspect_ratio)
        .unwrap_or(false),
      labels,
      network_name: intrinsics.network_name.clone(),
      reg_max: intrinsics.reg_max.unwrap_or(DEFAULT_REG_MAX),
      strides,
      logit_scores: intrinsics.logit_scores.unwrap_or(false),
    };

    info!(
      "解码配置: 阈值={} IOU={} 最大检测数={} 解码方式={} 坐标顺序={} 归一化={} 标签数={}",
      config.confidence_threshold,
      config.iou_threshold,
      config.max_detections,
      config.decode_variant,
      config.bbox_order,
      config.bbox_normalization,
      config.labels.len()
    );

    Ok(config)
  }

  /// 无锚框解码在 NMS 之后保留的候选上限
  pub fn candidate_cap(&self) -> usize {
    self.max_detections.max(self.raw_topk)
  }
}

fn unit_range(name: &'static str, value: f32) -> Result<f32, ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(ConfigError::OutOfRange { name, value })
  }
}

/// 读取按行分隔的标签文件
pub fn read_label_file(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
  let path = path.as_ref();
  info!("加载标签文件: {}", path.display());
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::LabelFile {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(text.lines().map(str::to_string).collect())
}

pub fn fallback_labels() -> Vec<String> {
  (0..FALLBACK_LABEL_COUNT)
    .map(|i| format!("Class {}", i))
    .collect()
}
