use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use dasp::Sample;

use crate::engine::audio::RecordTap;
use crate::engine::messages::TapMsg;
use crate::error::SessionError;

pub const RECORDING_MIME: &str = "audio/wav";
pub const RECORDING_CHANNELS: u16 = 2;
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a flush waits for the render thread to end the take. Past this
/// the output is assumed stopped and the buffered chunks are returned.
const END_WAIT: Duration = Duration::from_millis(250);

/// A finished take: every recorded chunk concatenated into one WAV buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedBlob {
  pub mime_type: &'static str,
  pub sample_rate: u32,
  pub channels: u16,
  pub frames: u64,
  pub bytes: Vec<u8>,
}

impl RecordedBlob {
  pub fn duration(&self) -> Duration {
    Duration::from_secs_f64(self.frames as f64 / self.sample_rate.max(1) as f64)
  }

  pub fn file_name(at: SystemTime) -> String {
    let ms = at.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    format!("tha-booth-recording-{ms}.wav")
  }

  /// Write the take into `dir` under a timestamped name.
  pub fn save_to(&self, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(Self::file_name(SystemTime::now()));
    fs::write(&path, &self.bytes)?;
    log::info!("saved recording to {}", path.display());
    Ok(path)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
  Inactive,
  Recording,
}

/// Recorder attached to the graph's recording tap. A worker thread turns tap
/// blocks into 16-bit PCM chunks as they arrive.
pub struct Recorder {
  tx: Sender<TapMsg>,
  armed: Arc<AtomicBool>,
  state: RecorderState,
  sample_rate: u32,
}

impl Recorder {
  pub fn new(sample_rate: u32) -> Self {
    let (tx, rx) = unbounded();
    spawn_writer(rx);
    Self { tx, armed: Arc::new(AtomicBool::new(false)), state: RecorderState::Inactive, sample_rate }
  }

  /// Handle for the render thread.
  pub fn tap(&self) -> RecordTap {
    RecordTap { tx: self.tx.clone(), armed: self.armed.clone() }
  }

  pub fn state(&self) -> RecorderState { self.state }

  pub fn start(&mut self) -> Result<(), SessionError> {
    if self.state == RecorderState::Recording {
      return Err(SessionError::AlreadyRecording);
    }
    self.tx.send(TapMsg::Start).map_err(|e| SessionError::Finalize(e.to_string()))?;
    self.armed.store(true, Ordering::Release);
    self.state = RecorderState::Recording;
    log::info!("recording started");
    Ok(())
  }

  /// Disarm the tap, wait for the worker to hand back every chunk, and
  /// concatenate them into one blob. The worker replies once the render
  /// thread has sent its last block, or after `END_WAIT` if it never does.
  pub fn stop(&mut self) -> Result<RecordedBlob, SessionError> {
    if self.state != RecorderState::Recording {
      return Err(SessionError::NotRecording);
    }
    self.armed.store(false, Ordering::Release);
    self.state = RecorderState::Inactive;

    let (reply_tx, reply_rx) = bounded(1);
    self.tx.send(TapMsg::Flush(reply_tx)).map_err(|e| SessionError::Finalize(e.to_string()))?;
    let chunks = reply_rx
      .recv_timeout(FINALIZE_TIMEOUT)
      .map_err(|e| SessionError::Finalize(e.to_string()))?;
    let blob = encode(&chunks, self.sample_rate, RECORDING_CHANNELS).map_err(|e| SessionError::Finalize(e.to_string()))?;
    log::info!("recording stopped: {} chunks, {:.1}s", chunks.len(), blob.duration().as_secs_f32());
    Ok(blob)
  }
}

impl Drop for Recorder {
  fn drop(&mut self) {
    self.armed.store(false, Ordering::Release);
  }
}

fn spawn_writer(rx: Receiver<TapMsg>) {
  thread::spawn(move || {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut pending: Option<(Sender<Vec<Vec<u8>>>, Instant)> = None;
    let mut ended = false;
    loop {
      let msg = match pending.as_ref() {
        Some((_, deadline)) => match rx.recv_deadline(*deadline) {
          Ok(msg) => msg,
          Err(RecvTimeoutError::Timeout) => {
            if let Some((reply, _)) = pending.take() {
              log::debug!("render thread never ended the take; flushing what arrived");
              let _ = reply.send(std::mem::take(&mut chunks));
            }
            continue;
          }
          Err(RecvTimeoutError::Disconnected) => break,
        },
        None => match rx.recv() {
          Ok(msg) => msg,
          Err(_) => break,
        },
      };
      match msg {
        TapMsg::Block(samples) => {
          if samples.is_empty() { continue; }
          let mut chunk = Vec::with_capacity(samples.len() * 2);
          for s in samples {
            let v: i16 = s.clamp(-1.0, 1.0).to_sample::<i16>();
            chunk.extend_from_slice(&v.to_le_bytes());
          }
          chunks.push(chunk);
        }
        TapMsg::Start => {
          chunks.clear();
          ended = false;
        }
        TapMsg::Flush(reply) if ended => {
          let _ = reply.send(std::mem::take(&mut chunks));
        }
        TapMsg::Flush(reply) => pending = Some((reply, Instant::now() + END_WAIT)),
        TapMsg::End => {
          ended = true;
          if let Some((reply, _)) = pending.take() {
            let _ = reply.send(std::mem::take(&mut chunks));
          }
        }
      }
    }
    if let Some((reply, _)) = pending.take() {
      let _ = reply.send(chunks);
    }
  });
}

/// 16-bit little-endian interleaved chunks to a WAV buffer.
pub fn encode(chunks: &[Vec<u8>], sample_rate: u32, channels: u16) -> Result<RecordedBlob, hound::Error> {
  let spec = hound::WavSpec {
    channels,
    sample_rate,
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut cursor = Cursor::new(Vec::new());
  let mut samples = 0u64;
  {
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for chunk in chunks {
      for pair in chunk.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        samples += 1;
      }
    }
    writer.finalize()?;
  }
  Ok(RecordedBlob {
    mime_type: RECORDING_MIME,
    sample_rate,
    channels,
    frames: samples / channels.max(1) as u64,
    bytes: cursor.into_inner(),
  })
}
