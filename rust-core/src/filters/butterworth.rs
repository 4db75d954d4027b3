//! Digital Butterworth IIR design
//!
//! Analog prototype poles are frequency-transformed in zero/pole/gain form,
//! mapped to the z-plane with the bilinear transform (pre-warped cutoffs) and
//! finally expanded to transfer-function coefficients `b`, `a`.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;

use crate::error::{Result, StreamstaffError};

/// Pass/stop band arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResponse {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

impl FilterResponse {
    pub fn name(&self) -> &'static str {
        match self {
            FilterResponse::Lowpass => "lowpass",
            FilterResponse::Highpass => "highpass",
            FilterResponse::Bandpass => "bandpass",
            FilterResponse::Bandstop => "bandstop",
        }
    }

    /// Number of cutoff frequencies the response needs
    pub fn cutoff_count(&self) -> usize {
        match self {
            FilterResponse::Lowpass | FilterResponse::Highpass => 1,
            FilterResponse::Bandpass | FilterResponse::Bandstop => 2,
        }
    }
}

impl fmt::Display for FilterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterResponse {
    type Err = StreamstaffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "lowpass" => Ok(FilterResponse::Lowpass),
            "high" | "highpass" => Ok(FilterResponse::Highpass),
            "band" | "bandpass" => Ok(FilterResponse::Bandpass),
            "stop" | "bandstop" => Ok(FilterResponse::Bandstop),
            other => Err(StreamstaffError::config(format!(
                "unsupported filter_response '{}'",
                other
            ))),
        }
    }
}

/// IIR coefficients, `a[0] == 1`
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
    /// Largest pole magnitude; sets how fast transients die out
    pub max_pole_radius: f64,
}

impl TransferFunction {
    /// Number of taps in the longer of `b` and `a`
    pub fn taps(&self) -> usize {
        self.b.len().max(self.a.len())
    }

    /// Gain at normalised frequency `w` (1.0 = Nyquist)
    pub fn gain_at(&self, w: f64) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -PI * w);
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .rev()
                .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z_inv + c)
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }
}

struct Zpk {
    z: Vec<Complex64>,
    p: Vec<Complex64>,
    k: f64,
}

impl Zpk {
    fn degree(&self) -> usize {
        self.p.len() - self.z.len()
    }
}

/// Design a digital Butterworth filter
///
/// # Arguments
/// * `order` - Filter order (number of prototype poles)
/// * `wn` - Cutoff(s) normalised to Nyquist, each in (0, 1); one value for
///   low/high pass, `[low, high]` for band responses
/// * `response` - Band arrangement
pub fn butter(order: usize, wn: &[f64], response: FilterResponse) -> Result<TransferFunction> {
    if order == 0 {
        return Err(StreamstaffError::config("filter order must be at least 1"));
    }
    if wn.len() != response.cutoff_count() {
        return Err(StreamstaffError::config(format!(
            "{} filter needs {} cutoff frequencies, got {}",
            response,
            response.cutoff_count(),
            wn.len()
        )));
    }
    if let Some(bad) = wn.iter().find(|&&w| !(w > 0.0 && w < 1.0)) {
        return Err(StreamstaffError::config(format!(
            "normalized cutoff {} is outside (0, 1); cutoff must lie below Nyquist",
            bad
        )));
    }
    if wn.len() == 2 && wn[0] >= wn[1] {
        return Err(StreamstaffError::config(format!(
            "band edges must be increasing, got [{}, {}]",
            wn[0], wn[1]
        )));
    }

    // Pre-warp for the bilinear transform at fs = 2
    let fs = 2.0;
    let warped: Vec<f64> = wn.iter().map(|&w| 2.0 * fs * (PI * w / fs).tan()).collect();

    let proto = buttap(order);
    let analog = match response {
        FilterResponse::Lowpass => lp2lp(proto, warped[0]),
        FilterResponse::Highpass => lp2hp(proto, warped[0]),
        FilterResponse::Bandpass => {
            lp2bp(proto, (warped[0] * warped[1]).sqrt(), warped[1] - warped[0])
        }
        FilterResponse::Bandstop => {
            lp2bs(proto, (warped[0] * warped[1]).sqrt(), warped[1] - warped[0])
        }
    };
    let digital = bilinear(analog, fs);

    let max_pole_radius = digital.p.iter().map(|p| p.norm()).fold(0.0, f64::max);
    let b = poly(&digital.z).iter().map(|c| c.re * digital.k).collect();
    let a = poly(&digital.p).iter().map(|c| c.re).collect();

    Ok(TransferFunction {
        b,
        a,
        max_pole_radius,
    })
}

/// Analog Butterworth prototype: unit cutoff, poles on the left half circle
fn buttap(order: usize) -> Zpk {
    let n = order as i64;
    let p = (0..order as i64)
        .map(|i| {
            let m = (-n + 1 + 2 * i) as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
        })
        .collect();
    Zpk {
        z: Vec::new(),
        p,
        k: 1.0,
    }
}

fn lp2lp(zpk: Zpk, wo: f64) -> Zpk {
    let degree = zpk.degree() as i32;
    Zpk {
        z: zpk.z.iter().map(|&z| z * wo).collect(),
        p: zpk.p.iter().map(|&p| p * wo).collect(),
        k: zpk.k * wo.powi(degree),
    }
}

fn lp2hp(zpk: Zpk, wo: f64) -> Zpk {
    let degree = zpk.degree();
    let mut z: Vec<Complex64> = zpk.z.iter().map(|&z| wo / z).collect();
    let p = zpk.p.iter().map(|&p| wo / p).collect();
    z.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        z,
        p,
        k: zpk.k * (neg_product(&zpk.z) / neg_product(&zpk.p)).re,
    }
}

fn lp2bp(zpk: Zpk, wo: f64, bw: f64) -> Zpk {
    let degree = zpk.degree();
    let split = |roots: &[Complex64]| -> Vec<Complex64> {
        let scaled: Vec<Complex64> = roots.iter().map(|&r| r * (bw / 2.0)).collect();
        let plus = scaled.iter().map(|&r| r + (r * r - wo * wo).sqrt());
        let minus = scaled.iter().map(|&r| r - (r * r - wo * wo).sqrt());
        plus.chain(minus).collect()
    };
    let mut z = split(&zpk.z);
    let p = split(&zpk.p);
    z.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        z,
        p,
        k: zpk.k * bw.powi(degree as i32),
    }
}

fn lp2bs(zpk: Zpk, wo: f64, bw: f64) -> Zpk {
    let degree = zpk.degree();
    let split = |roots: &[Complex64]| -> Vec<Complex64> {
        let inverted: Vec<Complex64> = roots.iter().map(|&r| (bw / 2.0) / r).collect();
        let plus = inverted.iter().map(|&r| r + (r * r - wo * wo).sqrt());
        let minus = inverted.iter().map(|&r| r - (r * r - wo * wo).sqrt());
        plus.chain(minus).collect()
    };
    let mut z = split(&zpk.z);
    let p = split(&zpk.p);
    z.extend(std::iter::repeat(Complex64::new(0.0, wo)).take(degree));
    z.extend(std::iter::repeat(Complex64::new(0.0, -wo)).take(degree));
    Zpk {
        z,
        p,
        k: zpk.k * (neg_product(&zpk.z) / neg_product(&zpk.p)).re,
    }
}

fn bilinear(zpk: Zpk, fs: f64) -> Zpk {
    let degree = zpk.degree();
    let fs2 = Complex64::new(2.0 * fs, 0.0);
    let mut z: Vec<Complex64> = zpk.z.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    let p = zpk.p.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    // Zeros at infinity map to Nyquist
    z.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));

    let num: Complex64 = zpk.z.iter().map(|&z| fs2 - z).product();
    let den: Complex64 = zpk.p.iter().map(|&p| fs2 - p).product();
    Zpk {
        z,
        p,
        k: zpk.k * (num / den).re,
    }
}

fn neg_product(roots: &[Complex64]) -> Complex64 {
    roots.iter().map(|&r| -r).product()
}

/// Monic polynomial coefficients (highest power first) with the given roots
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowpass_order2_matches_reference() {
        // scipy.signal.butter(2, 0.5)
        let tf = butter(2, &[0.5], FilterResponse::Lowpass).unwrap();
        let b_ref = [0.29289322, 0.58578644, 0.29289322];
        let a_ref = [1.0, 0.0, 0.17157288];

        for (b, r) in tf.b.iter().zip(b_ref.iter()) {
            assert!((b - r).abs() < 1e-7, "b {} vs {}", b, r);
        }
        for (a, r) in tf.a.iter().zip(a_ref.iter()) {
            assert!((a - r).abs() < 1e-7, "a {} vs {}", a, r);
        }
    }

    #[test]
    fn test_lowpass_unity_dc_gain() {
        let tf = butter(2, &[11.0 / 128.0], FilterResponse::Lowpass).unwrap();
        assert_eq!(tf.b.len(), 3);
        assert_eq!(tf.a.len(), 3);
        assert!((tf.gain_at(0.0) - 1.0).abs() < 1e-10);
        // -3 dB at the cutoff
        assert!((tf.gain_at(11.0 / 128.0) - 0.5f64.sqrt()).abs() < 1e-9);
        assert!(tf.gain_at(0.9) < 0.01);
        assert!(tf.max_pole_radius < 1.0);
    }

    #[test]
    fn test_highpass_unity_nyquist_gain() {
        let tf = butter(3, &[0.2], FilterResponse::Highpass).unwrap();
        assert_eq!(tf.taps(), 4);
        assert!((tf.gain_at(1.0) - 1.0).abs() < 1e-10);
        assert!(tf.gain_at(0.0) < 1e-10);
    }

    #[test]
    fn test_bandpass_and_bandstop() {
        let bp = butter(2, &[0.2, 0.4], FilterResponse::Bandpass).unwrap();
        assert_eq!(bp.taps(), 5);
        assert!(bp.gain_at(0.0) < 1e-10);
        assert!(bp.gain_at(1.0) < 1e-10);
        // Geometric centre of the pre-warped edges, mapped back to digital
        let center =
            2.0 / PI * ((PI * 0.1).tan() * (PI * 0.2).tan()).sqrt().atan();
        assert!((bp.gain_at(center) - 1.0).abs() < 1e-9);

        let bs = butter(2, &[0.2, 0.4], FilterResponse::Bandstop).unwrap();
        assert!((bs.gain_at(0.0) - 1.0).abs() < 1e-9);
        assert!((bs.gain_at(1.0) - 1.0).abs() < 1e-9);
        assert!(bs.gain_at(center) < 1e-6);
    }

    #[test]
    fn test_invalid_cutoffs() {
        assert!(butter(2, &[1.0], FilterResponse::Lowpass).is_err());
        assert!(butter(2, &[0.0], FilterResponse::Lowpass).is_err());
        assert!(butter(2, &[0.4, 0.2], FilterResponse::Bandpass).is_err());
        assert!(butter(2, &[0.4], FilterResponse::Bandpass).is_err());
        assert!(butter(0, &[0.4], FilterResponse::Lowpass).is_err());
    }

    #[test]
    fn test_parse_response() {
        assert_eq!("low".parse::<FilterResponse>().unwrap(), FilterResponse::Lowpass);
        assert_eq!("bandstop".parse::<FilterResponse>().unwrap(), FilterResponse::Bandstop);
        assert!("comb".parse::<FilterResponse>().is_err());
    }
}
