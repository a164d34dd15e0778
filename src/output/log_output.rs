// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, snapshot::FrameSnapshot};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 把每个快照的摘要写入日志
pub struct LogOutput {
  show_raw: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    let show_raw = url.query_pairs().any(|(k, _)| k == "raw");
    Ok(LogOutput { show_raw })
  }
}

impl Render<FrameSnapshot> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, result: &FrameSnapshot) -> Result<(), Self::Error> {
    if result.is_empty() {
      info!("本帧未检测到对象");
    } else {
      info!("检测到 {} 个对象", result.detections.len());
      for det in &result.detections {
        let [x, y, w, h] = det.bbox;
        info!(
          "  - {}: {:.2}% at ({}, {}, {}x{})",
          det.label,
          det.confidence * 100.0,
          x,
          y,
          w,
          h
        );
      }
    }

    if self.show_raw {
      for (rank, det) in result.raw_detections.iter().enumerate() {
        debug!("  原始候选 #{}: {} {:.3}", rank + 1, det.label, det.confidence);
      }
    }

    Ok(())
  }
}
