//! The reliability-band function `bounds(coverage, erate, k, p) -> (L, U)`.
//!
//! Spec §1 marks the reliability-band formula as an external collaborator
//! consumed as a pure function, and §9's Open Questions leave its exact
//! closed form unspecified at the distillation boundary. `original_source`
//! gives the real formula Gerbil uses (`computeUpper_inG`/`computeLower_inG`
//! in `Application.cpp`): treat per-k-mer observation counts as binomial
//! with success probability derived from `erate` and `k`, and walk outward
//! from the expected coverage accumulating probability mass until it
//! crosses `min_probability`. This is implemented here rather than left as
//! a stub, since E5 is untestable without a concrete, deterministic
//! function.

/// Probability a single true occurrence of a k-mer survives sequencing
/// without an error landing inside it, given a per-base error rate.
fn survival_probability(erate: f64, k: usize) -> f64 {
    (1.0 - erate).powi(k as i32)
}

/// log of the binomial coefficient `C(n, k)`, via the log-gamma identity,
/// avoiding factorial overflow for realistic coverage values.
fn ln_binomial(n: u64, k: u64) -> f64 {
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

fn ln_factorial(n: u64) -> f64 {
    (1..=n).map(|i| (i as f64).ln()).sum()
}

fn binomial_pmf(n: u64, k: u64, p: f64) -> f64 {
    if k > n {
        return 0.0;
    }
    (ln_binomial(n, k) + k as f64 * p.ln() + (n - k) as f64 * (1.0 - p).ln()).exp()
}

/// Upper bound: the smallest `m` such that the binomial tail mass for
/// counts `>= m` (given `n = coverage` trials) drops below
/// `1 - min_probability`, walking downward from `coverage` accumulating
/// mass exactly as Gerbil's `computeUpper_inG` does, plus one.
fn compute_upper(coverage: f64, p_success: f64, min_probability: f64) -> u64 {
    let n = coverage.round().max(1.0) as u64;
    let mut sum = 0.0;
    let mut m = n;
    loop {
        sum += binomial_pmf(n, m, p_success);
        if sum >= min_probability || m == 0 {
            break;
        }
        m -= 1;
    }
    m + 1
}

/// Lower bound: the largest `m` such that the binomial tail mass for
/// counts `<= m` stays below `1 - min_probability`, walking upward from 2
/// as `computeLower_inG` does.
fn compute_lower(coverage: f64, p_success: f64, min_probability: f64) -> u64 {
    let n = coverage.round().max(1.0) as u64;
    let mut sum = 0.0;
    let mut m = 2u64;
    loop {
        sum += binomial_pmf(n, m, p_success);
        if sum >= min_probability || m >= n {
            break;
        }
        m += 1;
    }
    (m.max(3) - 1).max(2)
}

/// Derives the reliability band `[L, U]` from expected sequencing
/// `coverage`, per-base `erate`, k-mer length `k`, and the confidence
/// level `min_probability` the caller wants the band to capture.
pub fn bounds(coverage: f64, erate: f64, k: usize, min_probability: f64) -> (u64, u64) {
    let p_success = survival_probability(erate, k).clamp(1e-9, 1.0 - 1e-9);
    let lower = compute_lower(coverage, p_success, min_probability);
    let upper = compute_upper(coverage, p_success, min_probability);
    (lower, upper.max(lower))
}
