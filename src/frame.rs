// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧尺寸与采集元数据定义
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
use serde_json::{Map, Value};
use tracing::debug;

/// 采集元数据中裁剪区域可能使用的键名，按优先级排列
const SCALER_CROP_KEYS: [&str; 3] = ["ScalerCrop", "scaler_crop", "scalerCrop"];

/// 宽高尺寸，序列化为 `[w, h]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn aspect_ratio(&self) -> f32 {
    if self.height == 0 {
      return 0.0;
    }
    self.width as f32 / self.height as f32
  }
}

impl From<(u32, u32)> for Size {
  fn from((width, height): (u32, u32)) -> Self {
    Self { width, height }
  }
}

impl From<Size> for (u32, u32) {
  fn from(size: Size) -> Self {
    (size.width, size.height)
  }
}

/// 像素矩形 (x, y, w, h)，序列化为 `[x, y, w, h]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct PixelRect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl PixelRect {
  pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 覆盖整个画面的矩形
  pub fn full(size: Size) -> Self {
    Self::new(0, 0, size.width as i32, size.height as i32)
  }
}

impl From<[i32; 4]> for PixelRect {
  fn from([x, y, width, height]: [i32; 4]) -> Self {
    Self::new(x, y, width, height)
  }
}

impl From<PixelRect> for [i32; 4] {
  fn from(rect: PixelRect) -> Self {
    [rect.x, rect.y, rect.width, rect.height]
  }
}

/// 相机在一次采集中附带的元数据。
///
/// 内容对流水线不透明，只在诊断时按键名读取。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureMetadata {
  entries: Map<String, Value>,
}

impl CaptureMetadata {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
    self.entries.insert(key.into(), value);
    self
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.entries.get(key)
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// 读取传感器裁剪区域。
  ///
  /// 只查看第一个存在的键；值不是 4 个数字时返回 `None`。
  pub fn scaler_crop(&self) -> Option<PixelRect> {
    let (key, value) = SCALER_CROP_KEYS
      .iter()
      .find_map(|key| self.entries.get(*key).map(|value| (*key, value)))?;

    let rect = value.as_array().and_then(|items| {
      if items.len() != 4 {
        return None;
      }
      let mut out = [0i32; 4];
      for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as i32;
      }
      Some(PixelRect::from(out))
    });

    if rect.is_none() {
      debug!("元数据 {} 格式无效: {}", key, value);
    }
    rect
  }
}

impl From<Map<String, Value>> for CaptureMetadata {
  fn from(entries: Map<String, Value>) -> Self {
    Self { entries }
  }
}
