use noisy_float::{FloatChecker, NoisyFloat};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonNegativeChecker;

impl FloatChecker<f32> for NonNegativeChecker {
    #[inline]
    fn check(value: f32) -> bool {
        value.is_finite() && 0. <= value
    }

    #[inline]
    fn assert(value: f32) {
        debug_assert!(Self::check(value), "unexpected non-finite or negative time: {value}");
    }
}

/// Media time in seconds. Finite and non-negative by construction.
pub type P32 = NoisyFloat<f32, NonNegativeChecker>;

pub fn p32(value: f32) -> P32 {
    P32::new(value)
}

pub fn abs_delta(a: P32, b: P32) -> P32 {
    p32((a.raw() - b.raw()).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(1.5, 0.5, 1.; "forward")]
    #[test_case(0.5, 1.5, 1.; "backward")]
    #[test_case(2., 2., 0.; "equal")]
    fn deltas_are_magnitudes(a: f32, b: f32, expected: f32) {
        assert_eq!(p32(expected), abs_delta(p32(a), p32(b)));
    }
}
