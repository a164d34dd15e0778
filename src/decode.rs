// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode.rs - 原始输出解码
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
use tracing::warn;

use crate::{
  config::{DecodeConfig, DecodeVariant},
  frame::Size,
};

mod anchor_free;
mod generic;

pub use self::anchor_free::{AnchorFreeDecoder, AnchorFreeOutput};
pub use self::generic::{GenericDecoder, GenericOutput};

/// 推理空间中的边界框
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InferenceBox {
  /// 按 `bbox_order` 排列的角点坐标，可能仍是归一化值
  Corners([f32; 4]),
  /// 中心点形式 `[cx, cy, w, h]`，像素单位
  Center([f32; 4]),
}

/// 尚未过滤与排序的候选框
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub bbox: InferenceBox,
  pub confidence: f32,
  pub class_index: i64,
}

/// 一次推理的原始输出，按解码方式区分结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawOutput {
  Generic(GenericOutput),
  AnchorFree(AnchorFreeOutput),
}

impl RawOutput {
  pub fn variant(&self) -> DecodeVariant {
    match self {
      RawOutput::Generic(_) => DecodeVariant::Generic,
      RawOutput::AnchorFree(_) => DecodeVariant::AnchorFree,
    }
  }

  /// 各输出张量的形状，仅用于诊断
  pub fn shapes(&self) -> Vec<Vec<usize>> {
    match self {
      RawOutput::Generic(output) => output.shapes(),
      RawOutput::AnchorFree(output) => vec![output.shape.to_vec()],
    }
  }
}

pub trait Decode {
  type Output;

  fn decode(&self, output: &Self::Output, input_size: Size) -> Vec<Candidate>;
}

/// 按配置选定一次的解码器
#[derive(Debug, Clone)]
pub enum Decoder {
  Generic(GenericDecoder),
  AnchorFree(AnchorFreeDecoder),
}

impl Decoder {
  pub fn for_config(config: &DecodeConfig) -> Self {
    match config.decode_variant {
      DecodeVariant::Generic => Decoder::Generic(GenericDecoder),
      DecodeVariant::AnchorFree => Decoder::AnchorFree(AnchorFreeDecoder::for_config(config)),
    }
  }

  pub fn variant(&self) -> DecodeVariant {
    match self {
      Decoder::Generic(_) => DecodeVariant::Generic,
      Decoder::AnchorFree(_) => DecodeVariant::AnchorFree,
    }
  }

  /// 解码一次推理输出。
  ///
  /// 输出缺失或与解码器类型不符时返回空列表。
  pub fn decode(&self, output: Option<&RawOutput>, input_size: Size) -> Vec<Candidate> {
    match (self, output) {
      (_, None) => Vec::new(),
      (Decoder::Generic(decoder), Some(RawOutput::Generic(output))) => {
        decoder.decode(output, input_size)
      }
      (Decoder::AnchorFree(decoder), Some(RawOutput::AnchorFree(output))) => {
        decoder.decode(output, input_size)
      }
      (decoder, Some(output)) => {
        warn!(
          "输出类型 {} 与解码器 {} 不匹配，本帧无检测结果",
          output.variant(),
          decoder.variant()
        );
        Vec::new()
      }
    }
  }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
