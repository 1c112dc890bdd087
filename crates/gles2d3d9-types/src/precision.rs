use std::fmt;

/// GLSL ES precision qualifier attached to a uniform declaration.
///
/// Precision never affects storage size or register footprint; it is carried through for
/// downstream validation (e.g. matching vertex/fragment declarations of the same uniform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Precision {
    Low,
    #[default]
    Medium,
    High,
}

impl Precision {
    /// Parses a GLSL ES precision keyword (`lowp`, `mediump`, `highp`).
    pub fn from_glsl_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "lowp" => Some(Self::Low),
            "mediump" => Some(Self::Medium),
            "highp" => Some(Self::High),
            _ => None,
        }
    }

    /// The GLSL ES keyword for this qualifier.
    pub const fn as_glsl_keyword(self) -> &'static str {
        match self {
            Self::Low => "lowp",
            Self::Medium => "mediump",
            Self::High => "highp",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_glsl_keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip() {
        for p in [Precision::Low, Precision::Medium, Precision::High] {
            assert_eq!(Precision::from_glsl_keyword(p.as_glsl_keyword()), Some(p));
        }
        assert_eq!(Precision::from_glsl_keyword("precise"), None);
    }

    #[test]
    fn default_is_mediump() {
        assert_eq!(Precision::default(), Precision::Medium);
    }
}
