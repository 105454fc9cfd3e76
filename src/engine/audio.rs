use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};

use crate::config::BoothConfig;
use crate::error::{CaptureError, SessionError};

use super::capture::{AudioSource, CaptureConstraints, MediaStream, MediaTrack, OutputDevice, Platform, TrackHandle};
use super::graph::SignalGraph;
use super::messages::{EngineMsg, TapMsg};
use super::params::StageParams;
use super::state::{FrameClock, SharedF32};

const MAX_MSGS_PER_BLOCK: usize = 24;
const SPECTRUM_FRAMES: usize = 2048;
const RING_SECONDS: usize = 2;
/// Queued input beyond this many blocks is dropped before rendering.
const BACKLOG_BLOCKS: usize = 2;

/// Recording tap: blocks are only sent while `armed` is set.
#[derive(Clone)]
pub struct RecordTap {
  pub tx: Sender<TapMsg>,
  pub armed: Arc<AtomicBool>,
}

/// Render-side half of a session. Lives on the realtime thread once the
/// output opens; everything it shares with the main thread is lock-free.
pub struct Engine {
  graph: SignalGraph,
  rx: Receiver<EngineMsg>,
  source: AudioSource,
  clock: FrameClock,
  reduction: SharedF32,
  pending: Option<(u64, Box<StageParams>)>,
  record: Option<RecordTap>,
  spec_tx: Option<Sender<Vec<f32>>>,
  spec_buf: Vec<f32>,
  input: Vec<f32>,
  rec_buf: Vec<f32>,
  take_open: bool,
}

impl Drop for Engine {
  fn drop(&mut self) {
    if self.take_open { self.end_take(); }
  }
}

impl Engine {
  pub fn graph(&self) -> &SignalGraph { &self.graph }

  pub fn set_record_tap(&mut self, tap: RecordTap) { self.record = Some(tap); }
  pub fn set_spectrum_sender(&mut self, tx: Sender<Vec<f32>>) { self.spec_tx = Some(tx); }

  fn end_take(&mut self) {
    self.take_open = false;
    if let Some(tap) = self.record.as_ref() {
      if !self.rec_buf.is_empty() {
        let _ = tap.tx.try_send(TapMsg::Block(std::mem::take(&mut self.rec_buf)));
      }
      let _ = tap.tx.try_send(TapMsg::End);
    }
  }

  fn accept(&mut self, msg: EngineMsg, now: u64) {
    match msg {
      EngineMsg::SetParams { at_frame, params } => {
        if at_frame <= now {
          self.graph.apply(&params);
          self.pending = None;
        } else {
          // latest snapshot wins
          self.pending = Some((at_frame, params));
        }
      }
    }
  }

  /// Fill `out` (interleaved, `channels` wide) with the next block.
  pub fn process(&mut self, out: &mut [f32], channels: usize) {
    let now = self.clock.now();
    // Drain messages without blocking (tight cap to avoid starving audio)
    let mut drained = 0usize;
    loop {
      match self.rx.try_recv() {
        Ok(msg) => self.accept(msg, now),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => break,
      }
      drained += 1;
      if drained >= MAX_MSGS_PER_BLOCK { break; }
    }
    // a snapshot scheduled for a later frame waits for the clock
    if matches!(self.pending, Some((at, _)) if at <= now) {
      if let Some((_, params)) = self.pending.take() { self.graph.apply(&params); }
    }

    let channels = channels.max(1);
    let frames = out.len() / channels;
    let want = frames * 2;
    if self.input.len() < want { self.input.resize(want, 0.0); }
    // keep monitoring latency at about one block: drop stale whole frames
    let queued = self.source.occupied_len();
    if queued > want * BACKLOG_BLOCKS {
      self.source.skip((queued - want) / 2 * 2);
    }
    // whole frames only; an underrun renders silence
    let avail = (self.source.occupied_len() / 2 * 2).min(want);
    let got = self.source.pop_slice(&mut self.input[..avail]);
    self.input[got..want].fill(0.0);

    let recording = self.record.as_ref().is_some_and(|t| t.armed.load(Ordering::Acquire));
    for (i, frame) in out.chunks_mut(channels).enumerate() {
      let (l, r) = if i < frames { self.graph.render(self.input[2 * i], self.input[2 * i + 1]) } else { (0.0, 0.0) };
      if channels == 1 {
        frame[0] = 0.5 * (l + r);
      } else {
        frame[0] = l;
        frame[1] = r;
        for s in frame.iter_mut().skip(2) { *s = 0.0; }
      }
      // accumulate mono for spectrum
      if self.spec_buf.len() < SPECTRUM_FRAMES { self.spec_buf.push(0.5 * (l + r)); }
      if recording { self.rec_buf.push(l); self.rec_buf.push(r); }
    }

    if self.spec_buf.len() >= SPECTRUM_FRAMES {
      if let Some(tx) = self.spec_tx.as_ref() {
        // non-blocking send of a copy
        let _ = tx.try_send(self.spec_buf[..SPECTRUM_FRAMES].to_vec());
      }
      self.spec_buf.clear();
    }
    if recording && !self.rec_buf.is_empty() {
      if let Some(tap) = self.record.as_ref() {
        let block = std::mem::replace(&mut self.rec_buf, Vec::with_capacity(want));
        let _ = tap.tx.try_send(TapMsg::Block(block));
      }
    }
    // first block after disarm: this thread closes the take
    if !recording && self.take_open { self.end_take(); }
    self.take_open = recording;

    self.clock.advance(frames as u64);
    self.reduction.set(self.graph.reduction());
  }
}

/// Main-side half of a session: the graph's clock, the parameter channel,
/// and the running device output.
pub struct ProcessingContext {
  sample_rate: u32,
  tx: Sender<EngineMsg>,
  clock: FrameClock,
  reduction: SharedF32,
  output: Option<Box<dyn OutputDevice>>,
  applied: Option<StageParams>,
  closed: bool,
}

impl ProcessingContext {
  /// Pair a context with the engine that will render `graph`.
  pub fn new(sample_rate: u32, graph: SignalGraph, source: AudioSource) -> (Self, Engine) {
    let (tx, rx) = unbounded();
    let clock = FrameClock::default();
    let reduction = SharedF32::new(0.0);
    let engine = Engine {
      graph,
      rx,
      source,
      clock: clock.clone(),
      reduction: reduction.clone(),
      pending: None,
      record: None,
      spec_tx: None,
      spec_buf: Vec::with_capacity(SPECTRUM_FRAMES),
      input: vec![0.0; 8192],
      rec_buf: Vec::with_capacity(8192),
      take_open: false,
    };
    let ctx = Self { sample_rate, tx, clock, reduction, output: None, applied: None, closed: false };
    (ctx, engine)
  }

  pub fn sample_rate(&self) -> u32 { self.sample_rate }
  pub fn current_frame(&self) -> u64 { self.clock.now() }
  pub fn current_time(&self) -> f64 { self.clock.now() as f64 / self.sample_rate.max(1) as f64 }

  /// Compressor gain reduction as last published by the render thread.
  pub fn reduction_meter(&self) -> SharedF32 { self.reduction.clone() }

  pub fn attach_output(&mut self, output: Box<dyn OutputDevice>) { self.output = Some(output); }

  /// Send a whole snapshot stamped with the current frame. Returns false once closed.
  pub fn schedule(&mut self, params: StageParams) -> bool {
    let now = self.clock.now();
    self.schedule_at(params, now)
  }

  /// Send a snapshot the engine applies at the first block starting at or
  /// after `at_frame`. A later snapshot replaces one still waiting.
  pub fn schedule_at(&mut self, params: StageParams, at_frame: u64) -> bool {
    if self.closed { return false; }
    if self.tx.send(EngineMsg::SetParams { at_frame, params: Box::new(params.clone()) }).is_err() {
      log::warn!("engine gone; parameter snapshot dropped");
      return false;
    }
    self.applied = Some(params);
    true
  }

  /// Last snapshot handed to the engine.
  pub fn applied(&self) -> Option<&StageParams> { self.applied.as_ref() }

  pub fn is_closed(&self) -> bool { self.closed }

  /// Stop rendering and release the device. Idempotent.
  pub fn close(&mut self) {
    if let Some(mut out) = self.output.take() {
      out.close();
    }
    self.applied = None;
    self.closed = true;
  }
}

impl Drop for ProcessingContext {
  fn drop(&mut self) { self.close(); }
}

struct CpalTrack {
  stream: Option<cpal::Stream>,
}

impl TrackHandle for CpalTrack {
  fn stop(&mut self) {
    if let Some(s) = self.stream.take() {
      let _ = s.pause();
    }
  }
}

struct CpalOutput {
  stream: Option<cpal::Stream>,
}

impl OutputDevice for CpalOutput {
  fn close(&mut self) {
    if let Some(s) = self.stream.take() {
      let _ = s.pause();
    }
  }
}

/// Host audio through cpal. Display/tab capture maps to an input device,
/// typically a loopback or monitor source named in the config.
pub struct CpalPlatform {
  host: cpal::Host,
  capture_device: Option<String>,
  output_device: Option<String>,
  buffer_frames: u32,
}

impl CpalPlatform {
  pub fn new(config: &BoothConfig) -> Self {
    Self {
      host: cpal::default_host(),
      capture_device: config.capture_device.clone(),
      output_device: config.output_device.clone(),
      buffer_frames: config.buffer_frames,
    }
  }

  fn input_device(&self) -> Option<cpal::Device> {
    match self.capture_device.as_deref() {
      Some(name) => self.host.input_devices().ok()?.find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false)),
      None => self.host.default_input_device(),
    }
  }

  fn output_device(&self) -> Option<cpal::Device> {
    match self.output_device.as_deref() {
      Some(name) => self.host.output_devices().ok()?.find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false)),
      None => self.host.default_output_device(),
    }
  }
}

fn pick_config<I>(supported: I, sr: u32) -> Option<cpal::SupportedStreamConfig>
where
  I: Iterator<Item = cpal::SupportedStreamConfigRange> + Clone,
{
  let fits = |c: &cpal::SupportedStreamConfigRange| c.min_sample_rate().0 <= sr && c.max_sample_rate().0 >= sr;
  let known = |f: SampleFormat| matches!(f, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16);
  // prefer stereo f32, then any stereo, then anything at the rate
  supported.clone()
    .find(|c| fits(c) && c.channels() == 2 && c.sample_format() == SampleFormat::F32)
    .or_else(|| supported.clone().find(|c| fits(c) && c.channels() == 2 && known(c.sample_format())))
    .or_else(|| supported.clone().find(|c| fits(c) && known(c.sample_format())))
    .map(|c| c.with_sample_rate(cpal::SampleRate(sr)))
}

fn capture_err(e: cpal::BuildStreamError) -> CaptureError {
  let text = e.to_string();
  let lower = text.to_lowercase();
  if lower.contains("permission") || lower.contains("denied") {
    CaptureError::PermissionDenied(text)
  } else {
    CaptureError::Device(text)
  }
}

fn build_input<T>(device: &cpal::Device, cfg: &cpal::StreamConfig, mut prod: HeapProd<f32>) -> Result<cpal::Stream, cpal::BuildStreamError>
where
  T: Sample + SizedSample,
  f32: FromSample<T>,
{
  let channels = cfg.channels as usize;
  let mut frames: Vec<f32> = Vec::with_capacity(8192);
  device.build_input_stream(
    cfg,
    move |data: &[T], _| {
      frames.clear();
      // upmix mono, keep the first two channels otherwise
      for frame in data.chunks(channels) {
        let l = f32::from_sample(frame[0]);
        let r = if frame.len() > 1 { f32::from_sample(frame[1]) } else { l };
        frames.push(l);
        frames.push(r);
      }
      let room = prod.vacant_len() / 2 * 2;
      let n = room.min(frames.len());
      prod.push_slice(&frames[..n]);
    },
    |e| log::error!("capture stream error: {e}"),
    None,
  )
}

fn build_output<T>(device: &cpal::Device, cfg: &cpal::StreamConfig, mut engine: Engine) -> Result<cpal::Stream, cpal::BuildStreamError>
where
  T: Sample + SizedSample + FromSample<f32>,
{
  let channels = cfg.channels as usize;
  let mut scratch: Vec<f32> = Vec::with_capacity(8192);
  device.build_output_stream(
    cfg,
    move |data: &mut [T], _| {
      scratch.resize(data.len(), 0.0);
      engine.process(&mut scratch, channels);
      for (dst, &s) in data.iter_mut().zip(scratch.iter()) {
        *dst = T::from_sample(s);
      }
    },
    |e| log::error!("output stream error: {e}"),
    None,
  )
}

impl Platform for CpalPlatform {
  fn supports_display_capture(&self) -> bool {
    self.host.input_devices().map(|mut d| d.next().is_some()).unwrap_or(false)
  }

  fn get_display_media(&mut self, constraints: &CaptureConstraints) -> Result<MediaStream, CaptureError> {
    if !self.supports_display_capture() {
      return Err(CaptureError::Unsupported);
    }
    let a = &constraints.audio;
    if a.echo_cancellation || a.noise_suppression || a.auto_gain_control {
      log::warn!("host capture applies no voice processing; enhancement flags ignored");
    }
    let device = self.input_device().ok_or_else(|| CaptureError::Device("capture device not found".into()))?;
    let name = device.name().unwrap_or_else(|_| "capture".into());
    let supported = device.supported_input_configs().map_err(|e| CaptureError::Device(e.to_string()))?;
    let supported: Vec<_> = supported.collect();
    let config = pick_config(supported.into_iter(), a.sample_rate)
      .ok_or_else(|| CaptureError::Device(format!("{name} cannot capture at {} Hz", a.sample_rate)))?;
    let format = config.sample_format();
    let mut cfg: cpal::StreamConfig = config.into();
    cfg.buffer_size = cpal::BufferSize::Fixed(self.buffer_frames);

    let (prod, cons) = HeapRb::<f32>::new(a.sample_rate as usize * 2 * RING_SECONDS).split();
    let stream = match format {
      SampleFormat::F32 => build_input::<f32>(&device, &cfg, prod),
      SampleFormat::I16 => build_input::<i16>(&device, &cfg, prod),
      SampleFormat::U16 => build_input::<u16>(&device, &cfg, prod),
      other => return Err(CaptureError::Device(format!("unsupported sample format {other:?}"))),
    }
    .map_err(capture_err)?;
    stream.play().map_err(|e| CaptureError::Device(e.to_string()))?;
    log::info!("capturing from {name} at {} Hz, {} ch", cfg.sample_rate.0, cfg.channels);

    let track = MediaTrack::audio(name, cons, Box::new(CpalTrack { stream: Some(stream) }));
    Ok(MediaStream::new(cfg.sample_rate.0, vec![track]))
  }

  fn open_output(&mut self, sample_rate: u32, engine: Engine) -> Result<Box<dyn OutputDevice>, SessionError> {
    let device = self.output_device().ok_or_else(|| SessionError::Output("no output device".into()))?;
    let supported: Vec<_> = device
      .supported_output_configs()
      .map_err(|e| SessionError::Output(e.to_string()))?
      .collect();
    let config = pick_config(supported.into_iter(), sample_rate)
      .ok_or_else(|| SessionError::Output(format!("output cannot run at {sample_rate} Hz")))?;
    let format = config.sample_format();
    let mut cfg: cpal::StreamConfig = config.into();
    // Request a larger buffer for better stability; reduce underruns
    cfg.buffer_size = cpal::BufferSize::Fixed(self.buffer_frames);

    let stream = match format {
      SampleFormat::F32 => build_output::<f32>(&device, &cfg, engine),
      SampleFormat::I16 => build_output::<i16>(&device, &cfg, engine),
      SampleFormat::U16 => build_output::<u16>(&device, &cfg, engine),
      other => return Err(SessionError::Output(format!("unsupported sample format {other:?}"))),
    }
    .map_err(|e| SessionError::Output(e.to_string()))?;
    stream.play().map_err(|e| SessionError::Output(e.to_string()))?;
    log::info!("output running at {} Hz, {} ch", cfg.sample_rate.0, cfg.channels);
    Ok(Box::new(CpalOutput { stream: Some(stream) }))
  }
}
