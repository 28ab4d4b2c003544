use educe::Educe;

use crate::utils::*;

/// Largest gap observed between consecutive non-seek clock samples. Coarse
/// sources (embed polling, stream sidecars) can jump several hundred
/// milliseconds per report; the registry widens opted-in windows' end
/// boundary by this much so their stop transition is never sampled past.
#[derive(Debug, Educe)]
#[educe(Default)]
pub struct DriftTracker {
    #[educe(Default(expression = "p32(0.)"))]
    max_error: P32,
    previous: Option<P32>,
}

impl DriftTracker {
    pub fn record(&mut self, t: P32) {
        if let Some(previous) = self.previous {
            self.max_error = self.max_error.max(abs_delta(t, previous));
        }
        self.previous = Some(t);
    }

    /// Seek completions and (re)enabling of tracking discard accumulated
    /// error; the jump to the seek target is not drift.
    pub fn reset(&mut self, t: P32) {
        self.max_error = p32(0.);
        self.previous = Some(t);
    }

    pub fn max_error(&self) -> P32 {
        self.max_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tracks_running_maximum() {
        let mut drift = DriftTracker::default();
        [0., 0.25, 0.5, 1.25, 1.5]
            .map(p32)
            .into_iter()
            .for_each(|t| drift.record(t));
        assert_eq!(p32(0.75), drift.max_error());
    }

    #[test]
    fn first_sample_records_no_error() {
        let mut drift = DriftTracker::default();
        drift.record(p32(42.));
        assert_eq!(p32(0.), drift.max_error());
    }

    #[test]
    fn reset_rebases_on_the_seek_target() {
        let mut drift = DriftTracker::default();
        drift.record(p32(0.));
        drift.record(p32(0.5));
        drift.reset(p32(30.));
        assert_eq!(p32(0.), drift.max_error());

        // The next delta is measured from the seek target, not across it.
        drift.record(p32(30.25));
        assert_eq!(p32(0.25), drift.max_error());
    }

    #[test]
    fn backward_samples_count_as_magnitude() {
        let mut drift = DriftTracker::default();
        drift.record(p32(5.));
        drift.record(p32(4.5));
        assert_eq!(p32(0.5), drift.max_error());
    }
}
