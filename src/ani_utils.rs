//! Containment/Jaccard to average-nucleotide-identity (ANI) conversions,
//! with confidence intervals derived from a Bernoulli point-mutation model.
//!
//! Equations follow the closed-form mutation-rate inversions used by
//! `mutation-rate-ci-calculator` (doi:10.1101/2022.01.11.475870).

use roots::{find_root_brent, SimpleConvergency};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{Error, Result};

/// Default threshold above which `probability_nothing_common` marks a
/// result untrustworthy (spec default `10^-3`).
pub const DEFAULT_PROB_THRESHOLD: f64 = 1e-3;

/// An ANI point estimate bundled with its confidence interval and the two
/// guard flags a caller should check before trusting it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AniEstimate {
    pub ani: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// `probability_nothing_common` exceeded `DEFAULT_PROB_THRESHOLD`.
    pub potential_false_negative: bool,
    /// The Chernoff-bound cardinality check failed at 95% confidence within
    /// a 20% relative error.
    pub size_may_be_inaccurate: bool,
}

fn exp_n_mutated(l: f64, k: f64, r1: f64) -> f64 {
    let q = r1_to_q(k, r1);
    l * q
}

fn var_n_mutated(l: f64, k: f64, r1: f64, q: Option<f64>) -> Result<f64> {
    if r1 == 0.0 {
        return Ok(0.0);
    }

    let q = q.unwrap_or_else(|| r1_to_q(k, r1));

    let var_n = l * (1.0 - q) * (q * (2.0 * k + (2.0 / r1) - 1.0) - 2.0 * k)
        + k * (k - 1.0) * (1.0 - q).powi(2)
        + (2.0 * (1.0 - q) / (r1.powi(2))) * ((1.0 + (k - 1.0) * (1.0 - q)) * r1 - q);

    if var_n < 0.0 {
        Err(Error::ANIEstimationError {
            message: "variance of mutated k-mer count is negative".into(),
        })
    } else {
        Ok(var_n)
    }
}

fn exp_n_mutated_squared(l: f64, k: f64, p: f64) -> Result<f64> {
    let var_n = var_n_mutated(l, k, p, None)?;
    let exp_n_squared = exp_n_mutated(l, k, p).powi(2);
    Ok(var_n + exp_n_squared)
}

fn probit(p: f64) -> f64 {
    Normal::new(0.0, 1.0).unwrap().inverse_cdf(p)
}

fn r1_to_q(k: f64, r1: f64) -> f64 {
    1.0 - (1.0 - r1).powi(k as i32)
}

/// Probability that two genomes related at the estimated ANI share *no*
/// sampled hashes purely due to scaled subsampling.
pub fn probability_nothing_common(
    ani_estimate: f64,
    ksize: f64,
    f_scaled: f64,
    n_unique_kmers: f64,
) -> Result<f64> {
    if ani_estimate == 0.0 || ani_estimate == 1.0 {
        return Ok(1.0 - ani_estimate);
    }

    let exp_nmut = exp_n_mutated(n_unique_kmers, ksize, 1.0 - ani_estimate);
    let mut expected_log_probability = (n_unique_kmers - exp_nmut) * (1.0 - f_scaled).ln();

    if expected_log_probability.is_infinite() {
        expected_log_probability = f64::NEG_INFINITY;
    }
    Ok(expected_log_probability.exp())
}

/// Point estimate of ANI from a containment value, via the closed-form
/// inversion of the Bernoulli point-mutation model.
pub fn ani_from_containment(containment: f64, ksize: f64) -> f64 {
    if containment == 0.0 {
        0.0
    } else if containment == 1.0 {
        1.0
    } else {
        1.0 - (1.0 - containment.powf(1.0 / ksize))
    }
}

/// Point estimate of ANI from a Jaccard value, via the closed-form
/// inversion of the Bernoulli point-mutation model (spec §4.2's
/// Jaccard→ANI inversion, mirroring `ani_from_containment`'s
/// containment→ANI inversion).
pub fn ani_from_jaccard(jaccard: f64, ksize: f64) -> f64 {
    if jaccard <= 0.0001 {
        0.0
    } else if jaccard >= 0.9999 {
        1.0
    } else {
        (2.0 * jaccard / (1.0 + jaccard)).powf(1.0 / ksize)
    }
}

/// Point estimate plus a Wilson-style confidence interval, and the
/// probability that two genomes at this ANI would share no sampled hashes.
///
/// Returns `(point_estimate, ci_low, ci_high, prob_nothing_in_common)`.
pub fn ani_from_containment_ci(
    containment: f64,
    ksize: f64,
    scaled: u64,
    n_unique_kmers: u64,
    confidence: Option<f64>,
    prob_threshold: Option<f64>,
) -> Result<(f64, f64, f64, f64)> {
    let confidence = confidence.unwrap_or(0.95);
    let _prob_threshold = prob_threshold.unwrap_or(1e-3);

    let point_estimate = ani_from_containment(containment, ksize);

    let scaled_f64 = scaled as f64;
    let f_scaled = 1.0 / scaled_f64;
    let n_unique_kmers_f = n_unique_kmers as f64;
    let alpha = 1.0 - confidence;

    let z_alpha = probit(1.0 - alpha / 2.0);
    let bias_factor = 1.0 - (1.0 - f_scaled).powi(n_unique_kmers as i32);
    let term_1 =
        (1.0 - f_scaled) / (f_scaled * n_unique_kmers_f.powi(3) * bias_factor.powi(2));
    let term_2 = |pest: f64| {
        n_unique_kmers_f * exp_n_mutated(n_unique_kmers_f, ksize, pest)
            - exp_n_mutated_squared(n_unique_kmers_f, ksize, pest).unwrap_or(0.0)
    };
    let term_3 = |pest: f64| {
        var_n_mutated(n_unique_kmers_f, ksize, pest, None).unwrap_or(0.0) / n_unique_kmers_f.powi(2)
    };

    let var_direct = |pest: f64| term_1 * term_2(pest) + term_3(pest);

    let f1 = |pest: f64| {
        (1.0 - pest).powi(ksize as i32) + z_alpha * var_direct(pest).sqrt() - containment
    };
    let f2 = |pest: f64| {
        (1.0 - pest).powi(ksize as i32) - z_alpha * var_direct(pest).sqrt() - containment
    };

    let mut convergency = SimpleConvergency {
        eps: 1e-15,
        max_iter: 1000,
    };

    let mutation_rate_high =
        find_root_brent(1e-7, 1.0 - 1e-7, f1, &mut convergency).unwrap_or(1.0);
    let mutation_rate_low =
        find_root_brent(1e-7, 1.0 - 1e-7, f2, &mut convergency).unwrap_or(0.0);

    let ci_low = 1.0 - mutation_rate_high;
    let ci_high = 1.0 - mutation_rate_low;

    let prob_nothing_in_common =
        probability_nothing_common(point_estimate, ksize, f_scaled, n_unique_kmers_f)?;

    Ok((point_estimate, ci_low, ci_high, prob_nothing_in_common))
}

/// Chernoff-bound check on whether `n_hashes * scaled` is an accurate
/// cardinality estimate at `confidence` (default 95%, within 20%).
pub fn size_is_accurate(n_hashes: usize, scaled: u64, confidence: f64, relative_error: f64) -> bool {
    if n_hashes == 0 || scaled <= 1 {
        return true;
    }
    let n = n_hashes as f64;
    let delta = relative_error;
    // Chernoff bound: P[|X - E[X]| > delta*E[X]] <= 2*exp(-E[X]*delta^2/3)
    let failure_bound = 2.0 * (-n * delta * delta / 3.0).exp();
    failure_bound <= 1.0 - confidence
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ani_from_containment_edges() {
        assert_eq!(ani_from_containment(0.0, 31.0), 0.0);
        assert_eq!(ani_from_containment(1.0, 31.0), 1.0);
    }

    #[test]
    fn ani_from_jaccard_edges_and_midpoint() {
        assert_eq!(ani_from_jaccard(0.0, 31.0), 0.0);
        assert_eq!(ani_from_jaccard(1.0, 31.0), 1.0);
        let mid = ani_from_jaccard(0.5, 21.0);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn ani_from_containment_ci_bounds_sane() {
        let (point, lo, hi, _prob) =
            ani_from_containment_ci(0.9, 21.0, 1000, 500_000, None, None).unwrap();
        assert!(point > 0.0 && point < 1.0);
        assert!(lo <= point + 1e-9);
        assert!(hi >= point - 1e-9);
    }

    #[test]
    fn size_accuracy_improves_with_more_hashes() {
        assert!(!size_is_accurate(2, 1000, 0.95, 0.2));
        assert!(size_is_accurate(10_000, 10, 0.95, 0.2));
    }
}
