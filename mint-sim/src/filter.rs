//! Band-pass filtering of generated samples
//!
//! `use_iir` selects the design:
//! - IIR: 2nd-order Butterworth high-pass at `l_freq` feeding a 2nd-order
//!   Butterworth low-pass at `h_freq`
//! - FIR: Hamming-windowed sinc band-pass, built as the difference of two
//!   low-pass kernels that each have unit gain at DC
//!
//! Both run causally, one sample at a time, with per-channel state carried
//! across batches. Missing cutoffs default to 1 Hz and 50 Hz.

use mint_common::ProcessingConfig;
use std::collections::VecDeque;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Low cutoff used when the config leaves `l_freq` unset
pub const DEFAULT_L_FREQ: f64 = 1.0;

/// High cutoff used when the config leaves `h_freq` unset
pub const DEFAULT_H_FREQ: f64 = 50.0;

/// Upper bound on FIR kernel length for very low cutoffs
const MAX_FIR_TAPS: usize = 4097;

/// Butterworth quality factor
const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Normalized biquad coefficients (`a0 == 1`)
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(cutoff: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = Self::angular(cutoff, sample_rate);
        Self::normalized(
            (1.0 - cos_w) / 2.0,
            1.0 - cos_w,
            (1.0 - cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    fn highpass(cutoff: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = Self::angular(cutoff, sample_rate);
        Self::normalized(
            (1.0 + cos_w) / 2.0,
            -(1.0 + cos_w),
            (1.0 + cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    fn angular(cutoff: f64, sample_rate: f64) -> (f64, f64) {
        let omega = 2.0 * PI * cutoff / sample_rate;
        (omega.cos(), omega.sin() / (2.0 * BUTTERWORTH_Q))
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Direct form I delay line
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, c: &Biquad, x: f64) -> f64 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

#[derive(Debug, Clone)]
enum Design {
    Iir { highpass: Biquad, lowpass: Biquad },
    Fir { taps: Vec<f64> },
}

#[derive(Debug, Clone)]
enum ChannelState {
    Iir([BiquadState; 2]),
    /// Newest sample first, always `taps.len()` long
    Fir(VecDeque<f64>),
}

/// Stateful multi-channel band-pass filter
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    design: Design,
    channels: Vec<ChannelState>,
    l_freq: f64,
    h_freq: f64,
}

impl BandpassFilter {
    /// Build the filter a processing config asks for
    ///
    /// Returns `None` when `apply_bandpass` is off or the band cannot be
    /// realized at `config.sfreq` (the reason is logged).
    ///
    /// # Arguments
    ///
    /// * `config` - Processing config received from the client
    /// * `channels` - Number of independent channels to keep state for
    pub fn from_config(config: &ProcessingConfig, channels: usize) -> Option<Self> {
        if !config.apply_bandpass {
            return None;
        }
        let l_freq = config.l_freq.unwrap_or(DEFAULT_L_FREQ);
        let h_freq = config.h_freq.unwrap_or(DEFAULT_H_FREQ);
        Self::new(config.use_iir, config.sfreq, l_freq, h_freq, channels)
    }

    /// Band-pass between `l_freq` and `h_freq` Hz at `sample_rate`
    ///
    /// `h_freq` is clamped to 1 Hz below Nyquist. Returns `None` (and logs)
    /// when the resulting band is empty.
    pub fn new(
        use_iir: bool,
        sample_rate: f64,
        l_freq: f64,
        h_freq: f64,
        channels: usize,
    ) -> Option<Self> {
        if !(sample_rate.is_finite() && sample_rate > 2.0) {
            warn!("Band-pass ignored: invalid sampling rate {}", sample_rate);
            return None;
        }
        let h_freq = h_freq.min(sample_rate / 2.0 - 1.0);
        if !(l_freq.is_finite() && h_freq.is_finite() && 0.0 < l_freq && l_freq < h_freq) {
            warn!(
                "Band-pass ignored: empty band {}..{} Hz at {} Hz",
                l_freq, h_freq, sample_rate
            );
            return None;
        }

        let design = if use_iir {
            Design::Iir {
                highpass: Biquad::highpass(l_freq, sample_rate),
                lowpass: Biquad::lowpass(h_freq, sample_rate),
            }
        } else {
            Design::Fir {
                taps: fir_bandpass(l_freq, h_freq, sample_rate),
            }
        };

        let state = match &design {
            Design::Iir { .. } => ChannelState::Iir([BiquadState::default(); 2]),
            Design::Fir { taps } => ChannelState::Fir(VecDeque::from(vec![0.0; taps.len()])),
        };
        debug!(
            "Band-pass {}..{} Hz ({}) over {} channels",
            l_freq,
            h_freq,
            if use_iir { "iir" } else { "fir" },
            channels
        );

        Some(Self {
            design,
            channels: vec![state; channels],
            l_freq,
            h_freq,
        })
    }

    /// Effective `(low, high)` cutoffs in Hz
    pub fn band(&self) -> (f64, f64) {
        (self.l_freq, self.h_freq)
    }

    /// Filter one sample of `channel`; unknown channels pass through
    pub fn process(&mut self, channel: usize, x: f64) -> f64 {
        let Some(state) = self.channels.get_mut(channel) else {
            return x;
        };
        match (&self.design, state) {
            (Design::Iir { highpass, lowpass }, ChannelState::Iir([hp, lp])) => {
                let y = hp.process(highpass, x);
                lp.process(lowpass, y)
            }
            (Design::Fir { taps }, ChannelState::Fir(history)) => {
                history.pop_back();
                history.push_front(x);
                taps.iter().zip(history.iter()).map(|(t, v)| t * v).sum()
            }
            _ => x,
        }
    }
}

/// Odd kernel length for a Hamming window: `3.3 * sample_rate / transition`
fn fir_length(l_freq: f64, sample_rate: f64) -> usize {
    let transition = (l_freq * 0.25).max(2.0).min(l_freq);
    let n = (3.3 * sample_rate / transition).ceil() as usize;
    (n | 1).clamp(3, MAX_FIR_TAPS)
}

fn fir_bandpass(l_freq: f64, h_freq: f64, sample_rate: f64) -> Vec<f64> {
    let n = fir_length(l_freq, sample_rate);
    let high = lowpass_kernel(h_freq, sample_rate, n);
    let low = lowpass_kernel(l_freq, sample_rate, n);
    high.iter().zip(&low).map(|(h, l)| h - l).collect()
}

/// Hamming-windowed sinc scaled to unit DC gain
fn lowpass_kernel(cutoff: f64, sample_rate: f64, n: usize) -> Vec<f64> {
    let fc = cutoff / sample_rate;
    let mid = (n - 1) as f64 / 2.0;
    let mut taps: Vec<f64> = (0..n)
        .map(|i| {
            let m = i as f64 - mid;
            let sinc = if m == 0.0 {
                2.0 * fc
            } else {
                (2.0 * PI * fc * m).sin() / (PI * m)
            };
            let window = 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
            sinc * window
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 256.0;

    fn bandpass(use_iir: bool) -> BandpassFilter {
        BandpassFilter::new(use_iir, RATE, 1.0, 50.0, 1).unwrap()
    }

    /// Largest output magnitude over the last `window` of `total` samples
    fn peak_after(filter: &mut BandpassFilter, freq: f64, total: usize, window: usize) -> f64 {
        (0..total)
            .map(|i| filter.process(0, (2.0 * PI * freq * i as f64 / RATE).sin()))
            .skip(total - window)
            .fold(0.0_f64, |peak, y| peak.max(y.abs()))
    }

    #[test]
    fn test_iir_removes_offset() {
        let mut filter = bandpass(true);
        let last = (0..2560).map(|_| filter.process(0, 50.0)).last().unwrap();
        assert!(last.abs() < 0.05, "residual offset {}", last);
    }

    #[test]
    fn test_iir_passes_band_and_attenuates_above() {
        let pass = peak_after(&mut bandpass(true), 10.0, 2560, 256);
        assert!((0.8..1.1).contains(&pass), "10 Hz gain {}", pass);

        let stop = peak_after(&mut bandpass(true), 100.0, 2560, 256);
        assert!(stop < 0.5, "100 Hz gain {}", stop);
    }

    #[test]
    fn test_fir_kernel_has_zero_dc_gain() {
        let mut filter = bandpass(false);
        let taps = fir_length(1.0, RATE);
        assert_eq!(taps, 845);

        let last = (0..taps + 10).map(|_| filter.process(0, 50.0)).last().unwrap();
        assert!(last.abs() < 1e-6, "residual offset {}", last);
    }

    #[test]
    fn test_fir_passes_band_and_attenuates_above() {
        let total = fir_length(1.0, RATE) + 512;
        let pass = peak_after(&mut bandpass(false), 10.0, total, 256);
        assert!((0.9..1.1).contains(&pass), "10 Hz gain {}", pass);

        let stop = peak_after(&mut bandpass(false), 100.0, total, 256);
        assert!(stop < 0.1, "100 Hz gain {}", stop);
    }

    #[test]
    fn test_channels_filtered_independently() {
        let mut filter = BandpassFilter::new(true, RATE, 1.0, 50.0, 2).unwrap();
        for _ in 0..100 {
            filter.process(0, 50.0);
        }
        // Channel 1 has seen nothing yet, so its first output is b0 * x
        let fresh = filter.process(1, 1.0);
        let mut reference = BandpassFilter::new(true, RATE, 1.0, 50.0, 1).unwrap();
        assert_eq!(fresh, reference.process(0, 1.0));

        // Out-of-range channels pass through
        assert_eq!(filter.process(5, 42.0), 42.0);
    }

    #[test]
    fn test_config_defaults_and_rejections() {
        let mut config = ProcessingConfig::passthrough(RATE, 4);
        assert!(BandpassFilter::from_config(&config, 4).is_none());

        config.apply_bandpass = true;
        let filter = BandpassFilter::from_config(&config, 4).unwrap();
        assert_eq!(filter.band(), (DEFAULT_L_FREQ, DEFAULT_H_FREQ));

        // High cutoff above Nyquist is clamped
        config.h_freq = Some(500.0);
        let filter = BandpassFilter::from_config(&config, 4).unwrap();
        assert_eq!(filter.band(), (1.0, 127.0));

        config.l_freq = Some(60.0);
        config.h_freq = Some(40.0);
        assert!(BandpassFilter::from_config(&config, 4).is_none());

        config.l_freq = Some(1.0);
        config.sfreq = 0.0;
        assert!(BandpassFilter::from_config(&config, 4).is_none());
    }
}
