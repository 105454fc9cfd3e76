use std::f32::consts::TAU;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

pub const SPECTRUM_BINS: usize = 128;
const F_MIN: f32 = 20.0;
const F_MAX: f32 = 20_000.0;

/// Magnitudes of ~128 log-spaced bands over 20 Hz..20 kHz.
pub fn spectrum(buf: &[f32], sr: f32, planner: &mut FftPlanner<f32>) -> Vec<f32> {
  let n = buf.len();
  let pow2 = n.next_power_of_two().max(4);
  let mut output: Vec<Complex32> = buf.iter().map(|&x| Complex32::new(x, 0.0)).collect();
  output.resize(pow2, Complex32::new(0.0, 0.0));
  // Hann window to stabilize spectrum
  let n_win = n.max(2);
  for (i, c) in output.iter_mut().take(n).enumerate() {
    let w = 0.5 * (1.0 - (TAU * (i as f32) / ((n_win - 1) as f32)).cos());
    c.re *= w;
  }
  let fft = planner.plan_fft_forward(pow2);
  fft.process(&mut output);
  (0..SPECTRUM_BINS)
    .map(|i| {
      let t = i as f32 / (SPECTRUM_BINS - 1) as f32;
      let f = F_MIN * (F_MAX / F_MIN).powf(t);
      let k = ((f / sr) * pow2 as f32).round() as usize;
      let c = output[k.clamp(1, pow2 / 2 - 1)];
      ((c.re * c.re + c.im * c.im).sqrt() / (pow2 as f32)).max(1e-9)
    })
    .collect()
}

/// Spawn the analyser: it receives mono windows from the render thread and
/// emits spectrum frames for a visualizer. Ends when the render side hangs up.
pub fn spawn_analyser(sr: f32) -> (Sender<Vec<f32>>, Receiver<Vec<f32>>) {
  let (win_tx, win_rx) = bounded::<Vec<f32>>(4);
  let (frame_tx, frame_rx) = bounded::<Vec<f32>>(8);
  thread::spawn(move || {
    let mut planner = FftPlanner::<f32>::new();
    while let Ok(buf) = win_rx.recv() {
      // drop frames nobody is reading
      let _ = frame_tx.try_send(spectrum(&buf, sr, &mut planner));
    }
  });
  (win_tx, frame_rx)
}
