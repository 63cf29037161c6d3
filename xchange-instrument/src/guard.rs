use rust_decimal::Decimal;

/// Relative tolerance used for "did this rate actually change" comparisons
/// throughout the cache (spec §3 "last-seen copies drive change detection").
pub const DEFAULT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// `true` iff `value` is strictly positive. [`Decimal`] has no NaN/Inf
/// representation, so positivity is the only finiteness-adjacent check needed
/// once a value has been parsed into one; callers reading raw upstream floats
/// should validate with [`is_finite_f64`] first.
pub fn is_positive(value: Decimal) -> bool {
    value.is_sign_positive() && !value.is_zero()
}

/// `true` iff a raw upstream `f64` is representable as a valid, finite
/// [`Decimal`] rate or size (spec §1 C1 "NaN/Inf rejection").
pub fn is_finite_f64(value: f64) -> bool {
    value.is_finite()
}

/// Epsilon-tolerant relative equality: `true` when `a` and `b` differ by less
/// than `epsilon` of the larger magnitude. Used to decide whether a freshly
/// fetched rate counts as "changed" before publishing (spec §3, §4.3).
pub fn approx_eq(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs());
    if scale.is_zero() {
        return true;
    }
    ((a - b).abs() / scale) < epsilon
}

/// Convenience wrapper around [`approx_eq`] using [`DEFAULT_EPSILON`].
pub fn approx_eq_default(a: Decimal, b: Decimal) -> bool {
    approx_eq(a, b, DEFAULT_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn positive_rejects_zero_and_negative() {
        assert!(is_positive(dec!(0.01)));
        assert!(!is_positive(dec!(0)));
        assert!(!is_positive(dec!(-1)));
    }

    #[test]
    fn finite_f64_rejects_nan_and_inf() {
        assert!(is_finite_f64(1.0));
        assert!(!is_finite_f64(f64::NAN));
        assert!(!is_finite_f64(f64::INFINITY));
        assert!(!is_finite_f64(f64::NEG_INFINITY));
    }

    #[test]
    fn approx_eq_tolerates_tiny_drift() {
        assert!(approx_eq_default(dec!(100.000001), dec!(100.000002)));
        assert!(!approx_eq_default(dec!(100.0), dec!(100.5)));
    }

    #[test]
    fn approx_eq_handles_both_zero() {
        assert!(approx_eq_default(dec!(0), dec!(0)));
    }
}
