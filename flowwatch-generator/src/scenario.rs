//! Scenario state and per-mode distribution parameters.

use flowwatch_types::Mode;
use rand::Rng;

/// A mean with a symmetric uniform deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub mean: f64,
    pub deviation: f64,
}

impl Spread {
    pub const fn new(mean: f64, deviation: f64) -> Self {
        Self { mean, deviation }
    }

    /// Draw `mean + U(-deviation, deviation)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.mean + (rng.gen::<f64>() * 2.0 - 1.0) * self.deviation
    }
}

/// Distribution parameters for one mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    pub latency_ms: Spread,
    pub throughput: Spread,
    pub alert_rate: Spread,
}

impl ModeProfile {
    /// Built-in parameters for `mode`.
    pub const fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Normal => Self {
                latency_ms: Spread::new(40.0, 10.0),
                throughput: Spread::new(850.0, 100.0),
                alert_rate: Spread::new(0.05, 0.03),
            },
            Mode::Congestion => Self {
                latency_ms: Spread::new(180.0, 60.0),
                throughput: Spread::new(380.0, 120.0),
                alert_rate: Spread::new(0.35, 0.10),
            },
            Mode::Outage => Self {
                latency_ms: Spread::new(900.0, 300.0),
                throughput: Spread::new(25.0, 20.0),
                alert_rate: Spread::new(0.85, 0.10),
            },
            Mode::Flap => Self {
                latency_ms: Spread::new(150.0, 140.0),
                throughput: Spread::new(500.0, 450.0),
                alert_rate: Spread::new(0.40, 0.30),
            },
        }
    }
}

/// The generator's mutable scenario: the current mode name plus the
/// parameter table it selects from.
///
/// The mode is kept exactly as set. Only an exact match against a known
/// mode name selects that mode's profile; anything else generates with the
/// NORMAL profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    mode: String,
    profiles: [ModeProfile; 4],
}

impl Scenario {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            profiles: Mode::ALL.map(ModeProfile::for_mode),
        }
    }

    /// The current mode, verbatim.
    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = mode.into();
    }

    /// The known mode the current name selects, if any.
    pub fn known_mode(&self) -> Option<Mode> {
        Mode::ALL.into_iter().find(|m| m.as_str() == self.mode)
    }

    /// Parameters in effect for the current mode.
    pub fn profile(&self) -> ModeProfile {
        self.profile_for(self.known_mode().unwrap_or_default())
    }

    pub fn profile_for(&self, mode: Mode) -> ModeProfile {
        self.profiles[index(mode)]
    }

    /// Replace the parameters for one mode.
    pub fn set_profile(&mut self, mode: Mode, profile: ModeProfile) {
        self.profiles[index(mode)] = profile;
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new(Mode::Normal.as_str())
    }
}

fn index(mode: Mode) -> usize {
    match mode {
        Mode::Normal => 0,
        Mode::Congestion => 1,
        Mode::Outage => 2,
        Mode::Flap => 3,
    }
}
