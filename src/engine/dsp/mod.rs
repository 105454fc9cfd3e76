pub mod biquad;
pub mod convolver;
pub mod delay;
pub mod dynamics;
pub mod gain;
pub mod panner;
pub mod waveshaper;

pub use biquad::{BiquadFilter, FilterKind};
pub use convolver::Convolver;
pub use delay::DelayLine;
pub use dynamics::{Compressor, NoiseGate};
pub use gain::Gain;
pub use panner::StereoPanner;
pub use waveshaper::{Oversample, WaveShaper};
