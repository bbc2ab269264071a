//! FFT cross-correlation in "valid" mode.
//!
//! Uses the convolution theorem, `corr(a, b) = IFFT(FFT(a) * conj(FFT(b)))`,
//! evaluated block by block (overlap-save) so a full-length episode never
//! needs a single transform the size of the whole signal.

use rustfft::{num_complex::Complex, FftPlanner};

/// Smallest transform used per block.
const MIN_BLOCK_LEN: usize = 1 << 15;

/// Linear cross-correlation of `kernel` slid across `signal`.
///
/// Output index `k` is `sum(signal[k + j] * kernel[j])` for every `j` in the
/// kernel, for `k` in `0..=signal.len() - kernel.len()`. Returns an empty
/// vector when the kernel is empty or longer than the signal.
pub fn correlate_valid(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let m = kernel.len();
    if m == 0 || m > n {
        return Vec::new();
    }

    let out_len = n - m + 1;

    // Block length: room for the kernel plus a useful stretch of output,
    // but never larger than the whole signal needs.
    let fft_len = (2 * m)
        .next_power_of_two()
        .max(MIN_BLOCK_LEN)
        .min(n.next_power_of_two())
        .max(m.next_power_of_two());
    let step = fft_len - m + 1;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    // Kernel spectrum, conjugated once for every block
    let mut kernel_spec: Vec<Complex<f64>> =
        kernel.iter().map(|&x| Complex::new(x, 0.0)).collect();
    kernel_spec.resize(fft_len, Complex::new(0.0, 0.0));
    fft.process(&mut kernel_spec);
    for value in &mut kernel_spec {
        *value = value.conj();
    }

    let scale = 1.0 / fft_len as f64;
    let mut output = Vec::with_capacity(out_len);
    let mut block = vec![Complex::new(0.0, 0.0); fft_len];
    let mut start = 0;

    while start < out_len {
        let end = (start + fft_len).min(n);
        for (slot, &x) in block.iter_mut().zip(&signal[start..end]) {
            *slot = Complex::new(x, 0.0);
        }
        for slot in block.iter_mut().skip(end - start) {
            *slot = Complex::new(0.0, 0.0);
        }

        fft.process(&mut block);
        for (value, k) in block.iter_mut().zip(&kernel_spec) {
            *value *= k;
        }
        ifft.process(&mut block);

        // Only the first `step` lags are free of circular wrap-around
        let take = step.min(out_len - start);
        output.extend(block[..take].iter().map(|c| c.re * scale));
        start += step;
    }

    output
}

/// First maximum of a correlation curve as `(index, value)`.
///
/// Ties resolve to the lowest index. NaN values never win.
pub fn first_peak(values: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value || value.is_nan() => {}
            None if value.is_nan() => {}
            _ => best = Some((idx, value)),
        }
    }
    best
}
