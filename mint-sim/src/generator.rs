//! Synthetic EEG batch generator

use crate::filter::BandpassFilter;
use mint_common::config::SimulatorSettings;
use mint_common::{ProcessingConfig, RawBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces consecutive batches of uniform noise in `[0, 100)`
///
/// Timestamps are seconds since the generator was created, spaced by
/// `1 / sample_rate`. A processing config can add band-pass filtering and
/// downsampling on top of the raw noise.
#[derive(Debug)]
pub struct SignalGenerator {
    channels: usize,
    batch_size: usize,
    sample_rate: f64,
    sample_index: u64,
    rng: StdRng,

    /// Filter built from `filter_config`, if it asked for one
    filter: Option<BandpassFilter>,
    filter_config: Option<ProcessingConfig>,
}

impl SignalGenerator {
    pub fn new(settings: &SimulatorSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Deterministic values for tests
    pub fn with_seed(settings: &SimulatorSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: &SimulatorSettings, rng: StdRng) -> Self {
        Self {
            channels: settings.channels,
            batch_size: settings.batch_size,
            sample_rate: settings.sample_rate,
            sample_index: 0,
            rng,
            filter: None,
            filter_config: None,
        }
    }

    /// Samples generated so far (before downsampling)
    pub fn samples_generated(&self) -> u64 {
        self.sample_index
    }

    /// Next batch of `batch_size` samples
    ///
    /// With `apply_bandpass` set, every sample goes through the band-pass
    /// filter first. With a `downsample_factor` of `k > 1` only samples whose
    /// running index is a multiple of `k` are kept, so the batch carries
    /// roughly `batch_size / k` points.
    pub fn next_batch(&mut self, config: Option<&ProcessingConfig>) -> RawBatch {
        self.apply_filter_config(config);
        let factor = config.and_then(|c| c.downsample_factor).unwrap_or(1);
        let step = u64::from(factor.max(1));
        let mut timestamps = Vec::with_capacity(self.batch_size);
        let mut signals = vec![Vec::with_capacity(self.batch_size); self.channels];

        for _ in 0..self.batch_size {
            let index = self.sample_index;
            self.sample_index += 1;
            let keep = index % step == 0;
            if keep {
                timestamps.push(index as f64 / self.sample_rate);
            }

            // Dropped samples still feed the filter so its state stays continuous
            for (n, channel) in signals.iter_mut().enumerate() {
                let raw = self.rng.gen_range(0.0..100.0);
                let value = match self.filter.as_mut() {
                    Some(filter) => filter.process(n, raw),
                    None => raw,
                };
                if keep {
                    channel.push(value);
                }
            }
        }

        RawBatch {
            timestamps,
            signals,
        }
    }

    /// Rebuild the filter when the band-pass part of the config changes
    fn apply_filter_config(&mut self, config: Option<&ProcessingConfig>) {
        let unchanged = match (config, self.filter_config.as_ref()) {
            (Some(next), Some(current)) => same_band(next, current),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.filter = config.and_then(|c| BandpassFilter::from_config(c, self.channels));
        self.filter_config = config.cloned();
    }

    /// Whether samples are currently band-pass filtered
    pub fn is_filtering(&self) -> bool {
        self.filter.is_some()
    }
}

fn same_band(a: &ProcessingConfig, b: &ProcessingConfig) -> bool {
    a.apply_bandpass == b.apply_bandpass
        && a.use_iir == b.use_iir
        && a.l_freq == b.l_freq
        && a.h_freq == b.h_freq
        && a.sfreq == b.sfreq
}
