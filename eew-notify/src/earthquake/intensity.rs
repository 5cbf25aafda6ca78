//! Seismic intensity scale (CWA, 10 levels).

use serde::{Deserialize, Serialize};

const LABELS: [&str; 10] = [
    "0級", "1級", "2級", "3級", "4級", "5弱", "5強", "6弱", "6強", "7級",
];

/// Upper bounds (exclusive) of the computed intensity value for levels 0..=8.
const LEVEL_BOUNDS: [f64; 9] = [0.5, 1.5, 2.5, 3.5, 4.5, 5.0, 5.5, 6.0, 6.5];

/// An intensity level on the 0..=9 scale, where 5 and 6 are split into weak/strong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Intensity(u8);

impl Intensity {
    pub const MAX_LEVEL: u8 = 9;

    pub fn new(level: u8) -> Option<Self> {
        (level <= Self::MAX_LEVEL).then_some(Self(level))
    }

    /// Round a computed intensity value to its level.
    pub fn from_value(value: f64) -> Self {
        let level = LEVEL_BOUNDS
            .iter()
            .position(|bound| value < *bound)
            .unwrap_or(Self::MAX_LEVEL as usize);
        Self(level as u8)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        LABELS[self.0 as usize]
    }
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<i64> for Intensity {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("intensity level {value} out of range 0..=9"))
    }
}

impl From<Intensity> for i64 {
    fn from(value: Intensity) -> Self {
        value.0 as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-1.0, 0)]
    #[case(0.49, 0)]
    #[case(0.5, 1)]
    #[case(3.6, 4)]
    #[case(4.5, 5)]
    #[case(4.99, 5)]
    #[case(5.2, 6)]
    #[case(6.4, 8)]
    #[case(6.5, 9)]
    #[case(8.0, 9)]
    fn test_from_value(#[case] value: f64, #[case] level: u8) {
        assert_eq!(Intensity::from_value(value).level(), level);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Intensity::new(0).unwrap().label(), "0級");
        assert_eq!(Intensity::new(5).unwrap().label(), "5弱");
        assert_eq!(Intensity::new(8).unwrap().label(), "6強");
        assert!(Intensity::new(10).is_none());
    }

    #[test]
    fn test_deserialize_from_level() {
        let i: Intensity = serde_json::from_str("6").unwrap();
        assert_eq!(i.label(), "5強");
        assert!(serde_json::from_str::<Intensity>("12").is_err());
    }
}
