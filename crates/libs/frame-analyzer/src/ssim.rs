//! Structural similarity (SSIM) between two luma buffers
//!
//! Computes a single global SSIM index over the whole buffer, following
//! Wang et al., "Image quality assessment: From error measurement to
//! structural similarity" (IEEE TIP, 2004). The constants match the
//! reference Matlab implementation for an 8-bit dynamic range.

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;
const C1: f64 = (K1 * L) * (K1 * L);
const C2: f64 = (K2 * L) * (K2 * L);
const C3: f64 = C2 / 2.0;

/// Mean and variance of a buffer
#[derive(Debug, Clone, Copy, PartialEq)]
struct Moments {
    mean: f64,
    variance: f64,
}

/// Mean and biased variance in one accumulation pass.
///
/// The variance reuses the running totals of the mean pass
/// (`E[x^2] - E[x]^2`) instead of a second centered sum.
fn moments(a: &[u8]) -> Moments {
    let n = a.len() as f64;
    let (sum, sum_sq) = a.iter().fold((0.0_f64, 0.0_f64), |(s, sq), &v| {
        let v = f64::from(v);
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    // Clamp the tiny negative values cancellation can produce on flat buffers
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Moments { mean, variance }
}

/// cov(X, Y) = E[(X - mean_x)(Y - mean_y)]
fn covariance(x: &[u8], y: &[u8], mean_x: f64, mean_y: f64) -> f64 {
    let accu: f64 = x
        .iter()
        .zip(y)
        .map(|(&a, &b)| (f64::from(a) - mean_x) * (f64::from(b) - mean_y))
        .sum();
    accu / x.len() as f64
}

/// Compute the SSIM index of two equal-length luma buffers.
///
/// # Arguments
/// * `x` - First buffer, 8-bit luma samples
/// * `y` - Second buffer, same length as `x`
///
/// # Returns
/// A score in `[-1, 1]`, `1.0` for identical buffers. Returns `0.0` when the
/// lengths differ or the buffers are empty.
pub fn ssim(x: &[u8], y: &[u8]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let mx = moments(x);
    let my = moments(y);
    let sigma_x = mx.variance.sqrt();
    let sigma_y = my.variance.sqrt();
    let sigma_xy = covariance(x, y, mx.mean, my.mean);

    let luminance = (2.0 * (mx.mean * my.mean) + C1)
        / (mx.mean * mx.mean + my.mean * my.mean + C1);
    let contrast = (2.0 * (sigma_x * sigma_y) + C2) / (mx.variance + my.variance + C2);
    let structure = (sigma_xy + C3) / (sigma_x * sigma_y + C3);

    luminance * contrast * structure
}
