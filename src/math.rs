use itertools::izip;
use multiversion::multiversion;

use crate::error::{check_len, SamplerError};

/// Above this magnitude `exp` no longer changes the result of the
/// guarded transforms in f64 precision.
pub const LARGE_NUMBER: f64 = 1e2;

/// Compute `ln(1 + exp(x))` without overflowing for large `x`.
///
/// For `x > 100`, `exp(x) + 1` and `exp(x)` are indistinguishable, so the
/// result is `x` itself.
#[inline]
pub fn log1pexp(x: f64) -> f64 {
    if x > LARGE_NUMBER {
        x
    } else {
        x.exp().ln_1p()
    }
}

/// Elementwise [`log1pexp`].
pub fn log1pexp_slice(x: &[f64], out: &mut [f64]) -> Result<(), SamplerError> {
    check_len("log1pexp output", x.len(), out.len())?;
    x.iter()
        .zip(out.iter_mut())
        .for_each(|(&x, out)| *out = log1pexp(x));
    Ok(())
}

/// The logistic function `1 / (1 + exp(-z))`.
///
/// Collapses to exactly zero once `-z` exceeds [`LARGE_NUMBER`]. In the
/// other tail `exp(-z)` underflows to zero and the result is one, so the
/// output is never NaN for finite input.
#[inline]
pub fn sigmoid(z: f64) -> f64 {
    let m = -z;
    if m > LARGE_NUMBER {
        0.
    } else {
        1. / (1. + m.exp())
    }
}

#[multiversion(targets("x86_64+avx+avx2+fma", "x86_64+avx", "x86+sse"))]
pub(crate) fn axpy(x: &[f64], y: &mut [f64], a: f64) {
    let n = x.len();
    assert!(y.len() == n);

    izip!(x, y).for_each(|(x, y)| {
        *y += a * x;
    });
}

#[multiversion(targets("x86_64+avx+avx2+fma", "x86_64+avx", "x86+sse"))]
pub(crate) fn axpy_out(x: &[f64], y: &[f64], a: f64, out: &mut [f64]) {
    let n = x.len();
    assert!(y.len() == n);
    assert!(out.len() == n);

    izip!(x, y, out).for_each(|(x, y, out)| {
        *out = a * x + y;
    });
}

/// `out = position - step_size * grad + sqrt(2 * step_size) * noise`
#[multiversion(targets("x86_64+avx+avx2+fma", "x86_64+avx", "x86+sse"))]
pub(crate) fn langevin_update(
    position: &[f64],
    grad: &[f64],
    noise: &[f64],
    step_size: f64,
    out: &mut [f64],
) {
    let n = position.len();
    assert!(grad.len() == n);
    assert!(noise.len() == n);
    assert!(out.len() == n);

    let noise_scale = (2. * step_size).sqrt();
    izip!(position, grad, noise, out).for_each(|(x, g, e, out)| {
        *out = x - step_size * g + noise_scale * e;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn check_log1pexp(x in -50f64..50f64) {
            let naive = (1. + x.exp()).ln();
            prop_assert!((log1pexp(x) - naive).abs() < 1e-8);
        }

        #[test]
        fn check_log1pexp_large(x in 100.0001f64..1e300) {
            prop_assert_eq!(log1pexp(x), x);
        }

        #[test]
        fn check_sigmoid_range(z in -1e4f64..1e4f64) {
            let p = sigmoid(z);
            prop_assert!(p.is_finite());
            prop_assert!((0. ..=1.).contains(&p));
            if z.abs() < 30. {
                prop_assert!((p + sigmoid(-z) - 1.).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn check_log1pexp_extremes() {
        assert_eq!(log1pexp(1000.), 1000.);
        assert_eq!(log1pexp(f64::MAX), f64::MAX);
        assert_eq!(log1pexp(-1000.), 0.);
        assert_relative_eq!(log1pexp(0.), 2f64.ln());

        let x = [-3., 0., 150.];
        let mut out = [0.; 3];
        log1pexp_slice(&x, &mut out).unwrap();
        assert_relative_eq!(out[0], (-3f64).exp().ln_1p());
        assert_eq!(out[2], 150.);

        let mut short = [0.; 2];
        assert!(matches!(
            log1pexp_slice(&x, &mut short),
            Err(SamplerError::ShapeMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn check_sigmoid_tails() {
        assert_eq!(sigmoid(-100.5), 0.);
        assert_eq!(sigmoid(-1e10), 0.);
        assert_eq!(sigmoid(1e10), 1.);
        assert_eq!(sigmoid(0.), 0.5);
        assert!(sigmoid(-99.) > 0.);
    }

    #[test]
    fn check_langevin_update() {
        let x = [1., 2.];
        let g = [0.5, -1.];
        let e = [1., 0.];
        let mut out = [0.; 2];
        langevin_update(&x, &g, &e, 0.5, &mut out);
        assert_relative_eq!(out[0], 1. - 0.25 + 1.);
        assert_relative_eq!(out[1], 2. + 0.5);

        let mut y = [1., 1.];
        axpy(&x, &mut y, 2.);
        assert_eq!(y, [3., 5.]);

        axpy_out(&x, &g, -1., &mut out);
        assert_eq!(out, [-0.5, -3.]);
    }
}
