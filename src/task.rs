// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 解码任务调度
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

use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{
  output::Render,
  pipeline::{CycleInput, DetectionPipeline},
  snapshot::FrameSnapshot,
  transform::CoordinateMapper,
};

pub trait Task<I, Mp, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &DetectionPipeline<Mp>, output: O)
  -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  RE: std::error::Error + Sync + Send + 'static,
  Mp: CoordinateMapper,
  I: Iterator<Item = CycleInput<Mp::Metadata>>,
  O: Render<FrameSnapshot, Error = RE>,
> Task<I, Mp, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &DetectionPipeline<Mp>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let cycle = input.next().ok_or_else(|| anyhow::anyhow!("没有输入周期"))?;
    info!("输入周期获取成功，开始解码...");
    let now = std::time::Instant::now();
    let snapshot = pipeline.process(cycle);
    let elapsed = now.elapsed();
    info!("解码完成，耗时: {:.2?}", elapsed);
    output.render_result(&snapshot)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一周期重复解码，统计耗时并检查结果是否一致
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(1);
    self
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  Mp: CoordinateMapper,
  I: Iterator<Item = CycleInput<Mp::Metadata>>,
  O: Render<FrameSnapshot, Error = RE>,
> Task<I, Mp, O> for RepeatShotTask
where
  Mp::Metadata: Clone,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    pipeline: &DetectionPipeline<Mp>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let cycle = input.next().ok_or_else(|| anyhow::anyhow!("没有输入周期"))?;
    info!("输入周期获取成功，开始解码...");

    let mut times = Vec::with_capacity(self.repeat_times);
    let mut first: Option<FrameSnapshot> = None;
    let mut mismatches = 0usize;

    for i in 0..self.repeat_times {
      let now = std::time::Instant::now();
      let snapshot = pipeline.process(cycle.clone());
      let elapsed = now.elapsed();
      info!("({})解码完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);

      if i == 0 {
        output.render_result(&snapshot)?;
        first = Some(snapshot);
        continue;
      }
      if let Some(reference) = &first {
        if reference.detections != snapshot.detections
          || reference.raw_detections != snapshot.raw_detections
        {
          mismatches += 1;
        }
      }
    }

    // 前两次包含预热开销
    let measured = if times.len() > 2 { &times[2..] } else { &times[..] };
    warn!(
      "平均解码时间: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len().max(1) as u32
    );

    if mismatches > 0 {
      warn!("重复解码结果不一致: {} 次", mismatches);
      return Err(anyhow::anyhow!("重复解码结果不一致: {} 次", mismatches));
    }

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  Mp: CoordinateMapper,
  I: Iterator<Item = CycleInput<Mp::Metadata>>,
  O: Render<FrameSnapshot, Error = RE>,
> Task<I, Mp, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: &DetectionPipeline<Mp>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut frame_index = 0usize;
    let mut now = std::time::Instant::now();
    for cycle in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧", frame_index);
      let snapshot = pipeline.process(cycle);
      let elapsed_a = now.elapsed();
      output.render_result(&snapshot)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!("解码完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}
