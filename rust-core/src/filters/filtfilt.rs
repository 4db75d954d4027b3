//! Forward-backward (zero-phase) IIR filtering
//!
//! Direct form II transposed filtering with steady-state initial conditions
//! and odd reflection padding at both ends of the window.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, StreamstaffError};

/// Normalise by `a[0]` and pad both coefficient sets to the same length
fn normalize(b: &[f64], a: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let a0 = match a.first() {
        Some(&a0) if a0 != 0.0 => a0,
        _ => {
            return Err(StreamstaffError::config(
                "denominator must have a non-zero leading coefficient",
            ))
        }
    };
    if b.is_empty() {
        return Err(StreamstaffError::config("numerator is empty"));
    }

    let n = b.len().max(a.len());
    let mut b_norm = vec![0.0; n];
    let mut a_norm = vec![0.0; n];
    for (dst, &src) in b_norm.iter_mut().zip(b) {
        *dst = src / a0;
    }
    for (dst, &src) in a_norm.iter_mut().zip(a) {
        *dst = src / a0;
    }
    Ok((b_norm, a_norm))
}

/// Run `x` through the filter once
///
/// # Arguments
/// * `b`, `a` - Normalised coefficients of equal length
/// * `x` - Input samples
/// * `state` - Delay line of length `len - 1`, updated in place
fn lfilter_in_place(b: &[f64], a: &[f64], x: &[f64], state: &mut [f64]) -> Vec<f64> {
    let n = b.len();
    let mut out = Vec::with_capacity(x.len());

    for &xi in x {
        if state.is_empty() {
            out.push(b[0] * xi);
            continue;
        }
        let yi = b[0] * xi + state[0];
        for j in 1..n - 1 {
            state[j - 1] = b[j] * xi + state[j] - a[j] * yi;
        }
        state[n - 2] = b[n - 1] * xi - a[n - 1] * yi;
        out.push(yi);
    }

    out
}

/// Causal IIR filtering of `x`
///
/// # Arguments
/// * `b`, `a` - Transfer function coefficients
/// * `x` - Input samples
/// * `zi` - Optional initial delay-line state (`max(len(a), len(b)) - 1` values)
///
/// # Returns
/// Filtered samples and the final delay-line state
pub fn lfilter(b: &[f64], a: &[f64], x: &[f64], zi: Option<&[f64]>) -> Result<(Vec<f64>, Vec<f64>)> {
    let (b, a) = normalize(b, a)?;
    let order = b.len() - 1;
    let mut state = match zi {
        Some(zi) if zi.len() != order => {
            return Err(StreamstaffError::config(format!(
                "initial state needs {} values, got {}",
                order,
                zi.len()
            )))
        }
        Some(zi) => zi.to_vec(),
        None => vec![0.0; order],
    };
    let y = lfilter_in_place(&b, &a, x, &mut state);
    Ok((y, state))
}

/// Delay-line state for a unit step in steady state
///
/// Solves `(I - A^T) zi = b[1:] - a[1:] * b[0]` where `A` is the companion
/// matrix of `a`.
pub fn lfilter_zi(b: &[f64], a: &[f64]) -> Result<Vec<f64>> {
    let (b, a) = normalize(b, a)?;
    let order = b.len() - 1;
    if order == 0 {
        return Ok(Vec::new());
    }

    // Companion matrix C has -a[1..] on its first row and ones on the
    // subdiagonal; the system matrix is I - C^T.
    let system = DMatrix::from_fn(order, order, |i, j| {
        let identity = if i == j { 1.0 } else { 0.0 };
        let companion_ji = if j == 0 {
            -a[i + 1]
        } else if i + 1 == j {
            1.0
        } else {
            0.0
        };
        identity - companion_ji
    });
    let rhs = DVector::from_fn(order, |i, _| b[i + 1] - a[i + 1] * b[0]);

    let zi = system.lu().solve(&rhs).ok_or_else(|| {
        StreamstaffError::config("filter has a pole at z = 1; no steady-state response exists")
    })?;
    Ok(zi.iter().copied().collect())
}

/// Odd extension of `x` by `padlen` samples at each end
fn odd_extend(x: &[f64], padlen: usize) -> Vec<f64> {
    let last = x.len() - 1;
    let mut ext = Vec::with_capacity(x.len() + 2 * padlen);
    ext.extend((1..=padlen).rev().map(|i| 2.0 * x[0] - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=padlen).map(|i| 2.0 * x[last] - x[last - i]));
    ext
}

/// Zero-phase filtering: forward pass, then the same filter on the reversed output
///
/// # Arguments
/// * `b`, `a` - Transfer function coefficients
/// * `x` - Input samples
/// * `padlen` - Samples of odd extension added to each end; must be below `x.len()`
///
/// # Returns
/// Filtered samples, same length as `x`
pub fn filtfilt(b: &[f64], a: &[f64], x: &[f64], padlen: usize) -> Result<Vec<f64>> {
    if x.len() <= padlen {
        return Err(StreamstaffError::config(format!(
            "input of {} samples is too short for padlen {}",
            x.len(),
            padlen
        )));
    }

    let (b, a) = normalize(b, a)?;
    let zi = lfilter_zi(&b, &a)?;
    let ext = odd_extend(x, padlen);

    let mut state: Vec<f64> = zi.iter().map(|z| z * ext[0]).collect();
    let mut forward = lfilter_in_place(&b, &a, &ext, &mut state);

    forward.reverse();
    let mut state: Vec<f64> = zi.iter().map(|z| z * forward[0]).collect();
    let mut backward = lfilter_in_place(&b, &a, &forward, &mut state);
    backward.reverse();

    Ok(backward[padlen..backward.len() - padlen].to_vec())
}
