//! The immutable record of a bus-master capability probe.

/// Confidence band derived from the probe's total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Bus mastering verified across every phase.
    High,
    /// Solid but not perfect; DMA is still trusted.
    Medium,
    /// Marginal; DMA only with an explicit user opt-in.
    Low,
    /// Bus mastering must not be used on this host.
    Failed,
}

/// Score thresholds for the confidence bands. The defaults are the
/// production values; the configuration loader may tune them.
#[derive(Debug, Clone, Copy)]
pub struct ProbeThresholds {
    /// Minimum total for [`Confidence::High`].
    pub high: u16,
    /// Minimum total for [`Confidence::Medium`].
    pub medium: u16,
    /// Minimum total for [`Confidence::Low`].
    pub low: u16,
}

impl Default for ProbeThresholds {
    fn default() -> Self {
        Self {
            high: 400,
            medium: 250,
            low: 150,
        }
    }
}

impl ProbeThresholds {
    /// Maps a total score to its band.
    #[must_use]
    pub fn band(&self, total: u16) -> Confidence {
        if total >= self.high {
            Confidence::High
        } else if total >= self.medium {
            Confidence::Medium
        } else if total >= self.low {
            Confidence::Low
        } else {
            Confidence::Failed
        }
    }
}

/// Maximum points per phase, in phase order.
pub const PHASE_MAX: [u16; 7] = [70, 80, 100, 85, 82, 85, 50];

/// The probe's findings for one NIC. Produced once at open, immutable after;
/// recovery consults it before it would ever re-enable DMA.
#[derive(Debug, Clone, Copy)]
pub struct ProbeReport {
    /// Points earned per phase.
    pub phase_scores: [u16; 7],
    /// Sum of the phase scores.
    pub total: u16,
    /// Confidence band for `total`.
    pub confidence: Confidence,
    /// True when the result permits production DMA without an opt-in.
    pub safe_for_production: bool,
    /// True when a phase aborted the probe to protect the host.
    pub aborted: bool,
}

impl ProbeReport {
    /// Builds a report from phase scores.
    #[must_use]
    pub fn from_scores(scores: [u16; 7], thresholds: &ProbeThresholds, aborted: bool) -> Self {
        let total: u16 = scores.iter().sum();
        let confidence = if aborted {
            Confidence::Failed
        } else {
            thresholds.band(total)
        };
        let safe = matches!(confidence, Confidence::High | Confidence::Medium) && !aborted;
        Self {
            phase_scores: scores,
            total,
            confidence,
            safe_for_production: safe,
            aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_thresholds() {
        let t = ProbeThresholds::default();
        assert_eq!(t.band(552), Confidence::High);
        assert_eq!(t.band(400), Confidence::High);
        assert_eq!(t.band(399), Confidence::Medium);
        assert_eq!(t.band(250), Confidence::Medium);
        assert_eq!(t.band(249), Confidence::Low);
        assert_eq!(t.band(150), Confidence::Low);
        assert_eq!(t.band(149), Confidence::Failed);
    }

    #[test]
    fn abort_forces_failed_regardless_of_score() {
        let report =
            ProbeReport::from_scores([70, 80, 100, 85, 82, 85, 50], &ProbeThresholds::default(), true);
        assert_eq!(report.confidence, Confidence::Failed);
        assert!(!report.safe_for_production);
        assert_eq!(report.total, 552);
    }

    #[test]
    fn phase_caps_sum_to_552() {
        assert_eq!(PHASE_MAX.iter().sum::<u16>(), 552);
    }
}
