//! Binomial tail probabilities
//!
//! Terms are generated with the ratio recurrence
//! `t(i+1) = t(i) * (n - i) / (i + 1) * p / (1 - p)` in log space and summed
//! with log-sum-exp, so `n` in the thousands neither overflows nor underflows.
//! Every result is clamped into `[0, 1]`.

/// All mass sits on one outcome when `p` is at (or beyond) an edge
fn degenerate_outcome(n: u64, p: f64) -> Option<u64> {
    if p.is_nan() || p <= 0.0 {
        Some(0)
    } else if p >= 1.0 {
        Some(n)
    } else {
        None
    }
}

/// `ln P(X = i)` for `i = 0..=n`
struct LogTerms {
    i: u64,
    n: u64,
    ln_term: f64,
    ln_odds: f64,
}

impl LogTerms {
    fn new(n: u64, p: f64) -> Self {
        Self { i: 0, n, ln_term: n as f64 * (-p).ln_1p(), ln_odds: p.ln() - (-p).ln_1p() }
    }
}

impl Iterator for LogTerms {
    type Item = (u64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.i > self.n {
            return None;
        }
        let item = (self.i, self.ln_term);
        if self.i < self.n {
            self.ln_term += ((self.n - self.i) as f64).ln() - ((self.i + 1) as f64).ln()
                + self.ln_odds;
        }
        self.i += 1;
        Some(item)
    }
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

fn sum_terms(terms: impl Iterator<Item = (u64, f64)>) -> f64 {
    let ln_sum = terms.fold(f64::NEG_INFINITY, |acc, (_, ln_term)| log_add(acc, ln_term));
    clamp_probability(ln_sum.exp())
}

fn clamp_probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// P(X = k) for X ~ Binomial(n, p)
pub fn pmf(k: i64, n: u64, p: f64) -> f64 {
    if k < 0 || k as u64 > n {
        return 0.0;
    }
    let k = k as u64;
    if let Some(outcome) = degenerate_outcome(n, p) {
        return if k == outcome { 1.0 } else { 0.0 };
    }
    LogTerms::new(n, p)
        .nth(k as usize)
        .map(|(_, ln_term)| clamp_probability(ln_term.exp()))
        .unwrap_or(0.0)
}

/// P(X <= k) for X ~ Binomial(n, p)
pub fn lower_tail(k: i64, n: u64, p: f64) -> f64 {
    if k < 0 {
        return 0.0;
    }
    let k = k as u64;
    if k >= n {
        return 1.0;
    }
    if let Some(outcome) = degenerate_outcome(n, p) {
        return if outcome <= k { 1.0 } else { 0.0 };
    }
    sum_terms(LogTerms::new(n, p).take_while(|&(i, _)| i <= k))
}

/// P(X >= k) for X ~ Binomial(n, p)
pub fn upper_tail(k: i64, n: u64, p: f64) -> f64 {
    if k <= 0 {
        return 1.0;
    }
    let k = k as u64;
    if k > n {
        return 0.0;
    }
    if let Some(outcome) = degenerate_outcome(n, p) {
        return if outcome >= k { 1.0 } else { 0.0 };
    }
    sum_terms(LogTerms::new(n, p).skip_while(|&(i, _)| i < k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_small_exact_values() {
        // Binomial(4, 0.5): 1, 4, 6, 4, 1 over 16
        assert!((pmf(2, 4, 0.5) - 6.0 / 16.0).abs() < EPS);
        assert!((lower_tail(1, 4, 0.5) - 5.0 / 16.0).abs() < EPS);
        assert!((upper_tail(3, 4, 0.5) - 5.0 / 16.0).abs() < EPS);
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(lower_tail(-1, 10, 0.3), 0.0);
        assert_eq!(lower_tail(10, 10, 0.3), 1.0);
        assert_eq!(lower_tail(25, 10, 0.3), 1.0);
        assert_eq!(upper_tail(0, 10, 0.3), 1.0);
        assert_eq!(upper_tail(11, 10, 0.3), 0.0);
    }

    #[test]
    fn test_degenerate_probabilities() {
        // p = 0: every trial fails
        assert_eq!(lower_tail(0, 10, 0.0), 1.0);
        assert_eq!(upper_tail(1, 10, 0.0), 0.0);
        assert_eq!(pmf(0, 10, -0.5), 1.0);

        // p = 1: every trial succeeds
        assert_eq!(lower_tail(9, 10, 1.0), 0.0);
        assert_eq!(upper_tail(10, 10, 1.0), 1.0);
        assert_eq!(pmf(10, 10, 1.0), 1.0);
    }

    #[test]
    fn test_large_n_is_finite() {
        let n = 5_000;
        let p = 0.5;
        let lower = lower_tail(2_400, n, p);
        let upper = upper_tail(2_401, n, p);
        assert!(lower.is_finite() && upper.is_finite());
        assert!(lower > 0.0 && lower < 0.01);
        assert!((lower + upper - 1.0).abs() < 1e-6);

        // Far tail underflows toward zero rather than NaN
        let far = lower_tail(10, n, p);
        assert!(!far.is_nan() && far < 1e-300);
    }

    #[test]
    fn test_lower_tail_plus_last_mass_is_one() {
        for n in [1u64, 7, 50, 400] {
            for p in [0.05, 0.3, 0.5, 0.95] {
                let total = lower_tail(n as i64 - 1, n, p) + pmf(n as i64, n, p);
                assert!((total - 1.0).abs() < 1e-9, "n={n} p={p} total={total}");
            }
        }
    }

    proptest! {
        #[test]
        fn prop_complementary_tails_sum_to_one(n in 1u64..600, k_frac in 0.0f64..1.0, p in 0.001f64..0.999) {
            let k = ((n as f64 - 1.0) * k_frac) as i64;
            let total = lower_tail(k, n, p) + upper_tail(k + 1, n, p);
            prop_assert!((total - 1.0).abs() < 1e-8, "total = {}", total);
        }

        #[test]
        fn prop_lower_tail_non_decreasing(n in 1u64..200, p in 0.001f64..0.999) {
            let mut previous = 0.0;
            for k in -1..=(n as i64) {
                let current = lower_tail(k, n, p);
                prop_assert!(current + 1e-12 >= previous);
                prop_assert!((0.0..=1.0).contains(&current));
                previous = current;
            }
        }
    }
}
