use crossbeam_channel::Sender;

use super::params::StageParams;

/// Control messages drained by the render callback at the start of each block.
#[derive(Clone, Debug)]
pub enum EngineMsg {
  /// Apply a whole parameter snapshot once the engine clock reaches `at_frame`.
  SetParams { at_frame: u64, params: Box<StageParams> },
}

/// Messages on the recording tap, consumed by the recorder worker.
#[derive(Debug)]
pub enum TapMsg {
  /// Interleaved stereo frames from one render block.
  Block(Vec<f32>),
  /// Drop anything buffered and start a fresh take.
  Start,
  /// Hand every buffered chunk back and clear, once the take has ended.
  Flush(Sender<Vec<Vec<u8>>>),
  /// Sent by the render thread after the last block of a take.
  End,
}
