use serde::{Deserialize, Serialize};

/// Quality of a reading or of a value derived from several readings.
///
/// Variants are ordered from best to worst so `max()` over the inputs gives
/// the quality of the derived value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Quality {
    /// Every input is fresh and plausible
    Good,
    /// Some input is stale, missing or the result is implausible
    #[default]
    Uncertain,
    /// Some input reported a value that cannot be read
    Bad,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Uncertain => "uncertain",
            Self::Bad => "bad",
        }
    }

    /// Worst of two qualities
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_as_str() {
        assert_eq!(Quality::Good.as_str(), "good");
        assert_eq!(Quality::Uncertain.as_str(), "uncertain");
        assert_eq!(Quality::Bad.as_str(), "bad");
    }

    #[test]
    fn test_combine_keeps_worst() {
        assert_eq!(Quality::Good.combine(Quality::Good), Quality::Good);
        assert_eq!(Quality::Good.combine(Quality::Uncertain), Quality::Uncertain);
        assert_eq!(Quality::Bad.combine(Quality::Uncertain), Quality::Bad);
    }

    #[test]
    fn test_default() {
        assert_eq!(Quality::default(), Quality::Uncertain);
    }
}
