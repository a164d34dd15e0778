// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 录制周期回放输入
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decode::RawOutput,
  frame::{CaptureMetadata, Size},
  pipeline::CycleInput,
};

#[derive(Error, Debug)]
pub enum ReplayInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行格式错误: {source}")]
  FormatError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
  #[error("录制文件中没有任何周期")]
  Empty,
}

/// 录制文件中的一行，对应一次采集周期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCycle {
  pub input_size: Size,
  #[serde(default)]
  pub source_size: Option<Size>,
  /// 帧图像路径，相对路径以录制文件所在目录为基准
  #[serde(default)]
  pub frame: Option<PathBuf>,
  #[serde(default)]
  pub metadata: CaptureMetadata,
  #[serde(default)]
  pub outputs: Option<RawOutput>,
}

/// 按 JSON Lines 格式回放录制的推理周期，替代真实相机
pub struct ReplayInput {
  cycles: Vec<RecordedCycle>,
  cursor: usize,
  repeat: bool,
  base_dir: PathBuf,
}

impl FromUrlWithScheme for ReplayInput {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInput {
  type Error = ReplayInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayInputError::SchemeMismatch);
    }

    let repeat = url.query_pairs().any(|(k, _)| k == "loop");
    Self::open(url.path(), repeat)
  }
}

impl ReplayInput {
  pub fn open(path: impl AsRef<Path>, repeat: bool) -> Result<Self, ReplayInputError> {
    let path = path.as_ref();
    info!("加载录制文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();
    Self::parse(&text, base_dir, repeat)
  }

  pub fn parse(text: &str, base_dir: PathBuf, repeat: bool) -> Result<Self, ReplayInputError> {
    let mut cycles = Vec::new();
    for (index, line) in text.lines().enumerate() {
      if line.trim().is_empty() {
        continue;
      }
      let cycle = serde_json::from_str(line).map_err(|source| ReplayInputError::FormatError {
        line: index + 1,
        source,
      })?;
      cycles.push(cycle);
    }

    if cycles.is_empty() {
      return Err(ReplayInputError::Empty);
    }
    debug!("录制文件包含 {} 个周期", cycles.len());

    Ok(Self {
      cycles,
      cursor: 0,
      repeat,
      base_dir,
    })
  }

  pub fn len(&self) -> usize {
    self.cycles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cycles.is_empty()
  }

  fn load_frame(&self, path: &Path) -> Option<RgbImage> {
    let path = self.base_dir.join(path);
    match image::open(&path) {
      Ok(image) => Some(image.to_rgb8()),
      Err(e) => {
        warn!("无法读取帧图像 {}: {}", path.display(), e);
        None
      }
    }
  }
}

impl Iterator for ReplayInput {
  type Item = CycleInput<CaptureMetadata>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor >= self.cycles.len() {
      if !self.repeat {
        return None;
      }
      self.cursor = 0;
    }

    let cycle = self.cycles.get(self.cursor)?.clone();
    self.cursor += 1;

    let frame = cycle.frame.as_deref().and_then(|p| self.load_frame(p));
    Some(CycleInput {
      frame,
      source_size: cycle.source_size.unwrap_or(cycle.input_size),
      input_size: cycle.input_size,
      outputs: cycle.outputs,
      metadata: cycle.metadata,
    })
  }
}
