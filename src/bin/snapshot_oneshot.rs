// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/snapshot_oneshot.rs - 单周期快照解码
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_exhibit::{
  FromUrl,
  args::DecodeArgs,
  input::ReplayInput,
  output::OutputWrapper,
  pipeline::DetectionPipeline,
  task::{OneShotTask, Task},
  transform::RoiMapper,
};
use tracing::info;

/// 展台检测快照参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源（replay:///path/cycles.jsonl）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径（log:// 或 folder:///path）
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,

  #[command(flatten)]
  pub decode: DecodeArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = Arc::new(args.decode.resolve()?);
  let mapper = RoiMapper::for_config(args.decode.stream_size(), &config);
  let pipeline = DetectionPipeline::new(config, mapper);

  let input = ReplayInput::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, &pipeline, output)?;

  Ok(())
}
