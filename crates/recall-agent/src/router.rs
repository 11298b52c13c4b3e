use recall_core::Category;

/// Default gate below which creations land in the review holding area.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Deterministic gate deciding where a `create` lands.
///
/// Pure function of (confidence, threshold): at or above the threshold the
/// classified category wins; below it the entry goes to `review` and the
/// classified label survives only in confirmation text. Applied only to
/// creations; moves and deletes are explicit user corrections and bypass
/// the gate.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceRouter {
    threshold: f64,
}

impl ConfidenceRouter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn route(&self, classified: Category, confidence: f64) -> Category {
        if confidence >= self.threshold {
            classified
        } else {
            Category::Review
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for ConfidenceRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}
