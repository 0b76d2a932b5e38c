//! Waveform sizing
//!
//! Records carry a fixed number of amplitude samples. Live amplitude
//! samples and decoded peaks both have arbitrary lengths and are fitted to
//! that size here.

/// Resample `source` to exactly `len` values, keeping the peak of each bucket
pub fn fit(source: &[i32], len: usize) -> Vec<i32> {
    let mut target = vec![0; len];
    fit_into(&mut target, source);
    target
}

/// Overwrite `target` in place with `source` resampled to `target.len()`
pub fn fit_into(target: &mut [i32], source: &[i32]) {
    let len = target.len();
    if len == 0 {
        return;
    }
    if source.is_empty() {
        target.fill(0);
        return;
    }

    for (i, slot) in target.iter_mut().enumerate() {
        let start = i * source.len() / len;
        let end = ((i + 1) * source.len() / len).max(start + 1).min(source.len());
        *slot = source[start..end].iter().copied().max().unwrap_or(0);
    }
}

/// Scale a normalised peak (0.0..=1.0) to the 16-bit amplitude range
pub fn to_amplitude(peak: f32) -> i32 {
    (peak.clamp(0.0, 1.0) * i16::MAX as f32).round() as i32
}
