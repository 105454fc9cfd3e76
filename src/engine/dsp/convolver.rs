use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};

/// Partition size. The wet path lags the input by exactly this many frames.
pub const BLOCK: usize = 512;

const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_RATE: f32 = 44_100.0;
const MIN_POWER: f32 = 0.000125;

/// Impulse-response normalization used by the platform convolver: scale by
/// the inverse RMS power, calibrated to a 44.1 kHz reference.
pub fn normalization_scale(ir: &[Vec<f32>], sr: f32) -> f32 {
  let len = ir.iter().map(|c| c.len()).max().unwrap_or(0);
  if len == 0 || ir.is_empty() { return 1.0; }
  let sum: f64 = ir.iter().flat_map(|c| c.iter()).map(|&s| (s as f64) * (s as f64)).sum();
  let mut power = (sum / (ir.len() * len) as f64).sqrt() as f32;
  if !power.is_finite() || power < MIN_POWER { power = MIN_POWER; }
  let mut scale = GAIN_CALIBRATION / power;
  if sr > 0.0 { scale *= GAIN_CALIBRATION_RATE / sr; }
  if ir.len() == 4 { scale *= 0.5; }
  scale
}

struct Lane {
  // spectra of the impulse-response partitions
  parts: Vec<Vec<Complex32>>,
  // frequency-domain delay line of past input blocks
  fdl: Vec<Vec<Complex32>>,
  head: usize,
  // [previous block | current block]
  input: Vec<f32>,
  output: Vec<f32>,
  acc: Vec<Complex32>,
}

impl Lane {
  fn new(ir: &[f32], scale: f32, block: usize, fft: &dyn Fft<f32>, scratch: &mut [Complex32]) -> Self {
    let n = block * 2;
    let count = ir.len().div_ceil(block).max(1);
    let mut parts = Vec::with_capacity(count);
    for p in 0..count {
      let mut spec = vec![Complex32::new(0.0, 0.0); n];
      let start = p * block;
      let end = (start + block).min(ir.len());
      if start < end {
        for (dst, &s) in spec.iter_mut().zip(&ir[start..end]) { *dst = Complex32::new(s * scale, 0.0); }
      }
      fft.process_with_scratch(&mut spec, scratch);
      parts.push(spec);
    }
    Self {
      fdl: vec![vec![Complex32::new(0.0, 0.0); n]; count],
      parts,
      head: 0,
      input: vec![0.0; n],
      output: vec![0.0; block],
      acc: vec![Complex32::new(0.0, 0.0); n],
    }
  }

  fn run_block(&mut self, block: usize, fft: &dyn Fft<f32>, ifft: &dyn Fft<f32>, scratch: &mut [Complex32]) {
    let n = block * 2;
    let count = self.parts.len();
    let slot = &mut self.fdl[self.head];
    for (dst, &s) in slot.iter_mut().zip(&self.input) { *dst = Complex32::new(s, 0.0); }
    fft.process_with_scratch(slot, scratch);

    self.acc.fill(Complex32::new(0.0, 0.0));
    for p in 0..count {
      let x = &self.fdl[(self.head + count - p) % count];
      let h = &self.parts[p];
      for ((a, xv), hv) in self.acc.iter_mut().zip(x).zip(h) { *a += xv * hv; }
    }
    ifft.process_with_scratch(&mut self.acc, scratch);

    let norm = 1.0 / n as f32;
    for (o, c) in self.output.iter_mut().zip(&self.acc[block..]) { *o = c.re * norm; }
    self.input.copy_within(block..n, 0);
    self.head = (self.head + 1) % count;
  }
}

/// Uniformly partitioned overlap-save convolution, one impulse-response
/// channel per signal lane (true stereo: left with left, right with right).
pub struct Convolver {
  block: usize,
  fft: Arc<dyn Fft<f32>>,
  ifft: Arc<dyn Fft<f32>>,
  scratch: Vec<Complex32>,
  lanes: [Lane; 2],
  pos: usize,
  scale: f32,
}

impl Convolver {
  /// Normalized convolver with the default partition size. A mono impulse
  /// response is used for both lanes.
  pub fn new(ir: &[Vec<f32>], sr: f32) -> Self {
    let scale = normalization_scale(ir, sr);
    Self::with_block_size(ir, BLOCK, scale)
  }

  pub fn with_block_size(ir: &[Vec<f32>], block: usize, scale: f32) -> Self {
    let block = block.max(1);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(block * 2);
    let ifft = planner.plan_fft_inverse(block * 2);
    let scratch_len = fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len());
    let mut scratch = vec![Complex32::new(0.0, 0.0); scratch_len];
    let empty: Vec<f32> = Vec::new();
    let left = ir.first().unwrap_or(&empty);
    let right = ir.get(1).unwrap_or(left);
    let lanes = [
      Lane::new(left, scale, block, fft.as_ref(), &mut scratch),
      Lane::new(right, scale, block, fft.as_ref(), &mut scratch),
    ];
    Self { block, fft, ifft, scratch, lanes, pos: 0, scale }
  }

  pub fn latency(&self) -> usize { self.block }
  pub fn scale(&self) -> f32 { self.scale }

  #[inline]
  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let out = (self.lanes[0].output[self.pos], self.lanes[1].output[self.pos]);
    self.lanes[0].input[self.block + self.pos] = l;
    self.lanes[1].input[self.block + self.pos] = r;
    self.pos += 1;
    if self.pos == self.block {
      self.pos = 0;
      for lane in self.lanes.iter_mut() {
        lane.run_block(self.block, self.fft.as_ref(), self.ifft.as_ref(), &mut self.scratch);
      }
    }
    out
  }
}
