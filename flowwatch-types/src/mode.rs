//! Scenario modes.

use core::fmt;
use core::str::FromStr;

/// A named scenario governing the synthetic metric distributions.
///
/// The generator stores mode strings verbatim, so a mode name that does not
/// parse into one of these variants is legal state; it simply generates with
/// [`Mode::Normal`] parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Normal,
    Congestion,
    Outage,
    Flap,
}

impl Mode {
    /// Every known mode, in declaration order.
    pub const ALL: [Mode; 4] = [Mode::Normal, Mode::Congestion, Mode::Outage, Mode::Flap];

    /// The canonical upper-case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Congestion => "CONGESTION",
            Mode::Outage => "OUTAGE",
            Mode::Flap => "FLAP",
        }
    }

    /// Parse a mode name, ignoring ASCII case.
    pub fn parse(name: &str) -> Option<Mode> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mode: {}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::parse(s).ok_or_else(|| UnknownMode(s.to_string()))
    }
}
