//! The scenario-driven sample generator and its emission loop.

use std::sync::Arc;
use std::time::Duration;

use flowwatch_types::{now_ms, Envelope, MetricSample, Mode};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::scenario::{ModeProfile, Scenario};
use crate::settings::GeneratorSettings;
use crate::subscribers::Subscribers;

/// Nodes generated when none are configured.
pub const DEFAULT_NODES: [&str; 5] = ["NYC", "LA", "CHI", "MIA", "SEA"];

/// Interval between ticks when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(800);

/// Shortest tick interval; shorter values are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Synthesizes samples for a fixed node set under a mutable scenario.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use flowwatch_generator::{MetricGenerator, Subscribers};
///
/// #[tokio::main]
/// async fn main() {
///     let generator = Arc::new(
///         MetricGenerator::builder()
///             .nodes(["NYC", "LA"])
///             .mode("CONGESTION")
///             .build(),
///     );
///     let subscribers = Arc::new(Subscribers::new());
///
///     // Broadcast a multi-metric envelope every 800 ms
///     let emission = generator.start(subscribers.clone());
///
///     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
///     emission.stop();
/// }
/// ```
#[derive(Debug)]
pub struct MetricGenerator {
    nodes: Vec<String>,
    interval: Duration,
    scenario: RwLock<Scenario>,
    rng: Mutex<StdRng>,
}

/// Point-in-time view served to polling consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorSnapshot {
    pub nodes: Vec<String>,
    pub mode: String,
}

impl MetricGenerator {
    /// Create a generator with the default nodes, NORMAL mode and an
    /// entropy-seeded RNG.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the generator.
    pub fn builder() -> GeneratorBuilder {
        GeneratorBuilder::new()
    }

    /// Create a generator from loaded settings.
    pub fn from_settings(settings: &GeneratorSettings) -> Self {
        let mut builder = Self::builder()
            .nodes(settings.nodes.iter().cloned())
            .mode(settings.mode.as_str())
            .interval(settings.interval());
        if let Some(seed) = settings.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The current mode name, verbatim.
    pub fn mode(&self) -> String {
        self.scenario.read().mode().to_string()
    }

    /// Set the mode to the upper-cased form of `mode`.
    ///
    /// Unknown names are accepted and stored; they generate with NORMAL
    /// parameters.
    pub fn set_mode(&self, mode: &str) {
        let mode = mode.to_uppercase();
        let mut scenario = self.scenario.write();
        if scenario.mode() != mode {
            if Mode::parse(&mode).is_none() {
                debug!(mode = %mode, "unknown mode, generating with NORMAL parameters");
            }
            info!(from = %scenario.mode(), to = %mode, "scenario mode changed");
        }
        scenario.set_mode(mode);
    }

    /// Replace the distribution parameters for one mode.
    pub fn set_profile(&self, mode: Mode, profile: ModeProfile) {
        self.scenario.write().set_profile(mode, profile);
    }

    /// Apply an inbound control frame.
    ///
    /// Any JSON object carrying a non-null `mode` field sets the mode. Returns
    /// the new mode if the frame changed it.
    pub fn apply_control(&self, frame: &str) -> Option<String> {
        let mode = control_mode(frame)?;
        self.set_mode(&mode);
        Some(self.mode())
    }

    /// Generate one sample for `node` stamped with the current time.
    pub fn gen_sample(&self, node: &str) -> MetricSample {
        self.gen_sample_at(node, now_ms())
    }

    /// Generate one sample for `node` stamped with `timestamp`.
    pub fn gen_sample_at(&self, node: &str, timestamp: u64) -> MetricSample {
        let profile = self.scenario.read().profile();
        let mut rng = self.rng.lock();

        MetricSample {
            node: node.to_string(),
            timestamp,
            throughput: profile.throughput.sample(&mut *rng).max(0.0),
            latency_ms: profile.latency_ms.sample(&mut *rng).max(0.0),
            alert_rate: profile.alert_rate.sample(&mut *rng).clamp(0.0, 1.0),
            // Deliberately independent of the scenario
            flow_index: rng.gen::<f64>(),
        }
    }

    /// Generate one sample per node, packaged as a `multi-metric` envelope.
    pub fn tick(&self) -> Envelope {
        let timestamp = now_ms();
        let samples = self
            .nodes
            .iter()
            .map(|node| self.gen_sample_at(node, timestamp))
            .collect();
        Envelope::multi_metric(samples)
    }

    /// The `info` envelope sent to each new subscriber.
    pub fn info(&self) -> Envelope {
        Envelope::info(self.nodes.clone(), self.mode())
    }

    /// Synchronous snapshot of the node set and mode.
    pub fn snapshot(&self) -> GeneratorSnapshot {
        GeneratorSnapshot {
            nodes: self.nodes.clone(),
            mode: self.mode(),
        }
    }

    /// Generate a tick and offer it to every subscriber.
    ///
    /// Returns how many subscribers accepted the frame.
    pub fn broadcast_tick(&self, subscribers: &Subscribers) -> usize {
        match self.tick().to_json() {
            Ok(frame) => subscribers.broadcast(&frame),
            Err(e) => {
                warn!(error = %e, "failed to encode tick");
                0
            }
        }
    }

    /// Start background emission of ticks.
    ///
    /// This spawns a tokio task that broadcasts a `multi-metric` envelope to
    /// `subscribers` every interval, whether or not anyone is listening.
    ///
    /// Returns a handle that can be used to stop the emission.
    pub fn start(self: &Arc<Self>, subscribers: Arc<Subscribers>) -> EmissionHandle {
        use tokio::sync::watch;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let generator = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(generator.interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let delivered = generator.broadcast_tick(&subscribers);
                        debug!(delivered, "tick broadcast");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        EmissionHandle { stop_tx }
    }
}

impl Default for MetricGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a [`MetricGenerator`].
#[derive(Debug, Default)]
pub struct GeneratorBuilder {
    nodes: Option<Vec<String>>,
    mode: Option<String>,
    interval: Option<Duration>,
    seed: Option<u64>,
    profiles: Vec<(Mode, ModeProfile)>,
}

impl GeneratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node set. Duplicates are dropped, first occurrence wins.
    pub fn nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = Some(nodes.into_iter().map(Into::into).collect());
        self
    }

    /// Set the initial mode (upper-cased).
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the tick interval. Defaults to 800 ms, never below [`MIN_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Seed the RNG for reproducible sample streams.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the parameters for one mode.
    pub fn profile(mut self, mode: Mode, profile: ModeProfile) -> Self {
        self.profiles.push((mode, profile));
        self
    }

    /// Build the generator.
    pub fn build(self) -> MetricGenerator {
        let mut nodes: Vec<String> = Vec::new();
        let configured = self
            .nodes
            .unwrap_or_else(|| DEFAULT_NODES.iter().map(|n| n.to_string()).collect());
        for node in configured {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }

        let mode = self
            .mode
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| Mode::Normal.as_str().to_string());
        let mut scenario = Scenario::new(mode);
        for (mode, profile) in self.profiles {
            scenario.set_profile(mode, profile);
        }

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        MetricGenerator {
            nodes,
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL).max(MIN_INTERVAL),
            scenario: RwLock::new(scenario),
            rng: Mutex::new(rng),
        }
    }
}

/// Handle for controlling background emission.
///
/// Drop this handle to stop emission, or call `stop()` explicitly.
pub struct EmissionHandle {
    stop_tx: tokio::sync::watch::Sender<bool>,
}

impl EmissionHandle {
    /// Stop background emission.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }
}

impl std::fmt::Debug for EmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionHandle").finish_non_exhaustive()
    }
}

/// Extract the requested mode from a control frame.
///
/// Strings are taken as-is; other non-null JSON values use their JSON text.
fn control_mode(frame: &str) -> Option<String> {
    let value: Value = serde_json::from_str(frame).ok()?;
    match value.get("mode")? {
        Value::Null => None,
        Value::String(mode) => Some(mode.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Spread;

    fn seeded(mode: &str) -> MetricGenerator {
        MetricGenerator::builder()
            .nodes(["NYC", "LA"])
            .mode(mode)
            .seed(42)
            .build()
    }

    #[test]
    fn test_defaults() {
        let generator = MetricGenerator::new();
        assert_eq!(generator.nodes(), DEFAULT_NODES);
        assert_eq!(generator.mode(), "NORMAL");
        assert_eq!(generator.interval(), Duration::from_millis(800));
    }

    #[test]
    fn test_builder_dedupes_nodes() {
        let generator = MetricGenerator::builder().nodes(["A", "B", "A"]).build();
        assert_eq!(generator.nodes(), ["A", "B"]);
    }

    #[test]
    fn test_outage_throughput_mean_within_deviation() {
        let generator = seeded("OUTAGE");
        let profile = ModeProfile::for_mode(Mode::Outage);

        let samples: Vec<MetricSample> =
            (0..1000).map(|i| generator.gen_sample_at("NYC", i)).collect();
        let mean = samples.iter().map(|s| s.throughput).sum::<f64>() / samples.len() as f64;

        assert!((mean - profile.throughput.mean).abs() <= profile.throughput.deviation);
        assert!(samples.iter().all(|s| s.throughput >= 0.0 && s.latency_ms >= 0.0));
    }

    #[test]
    fn test_samples_respect_bounds_in_every_mode() {
        for mode in Mode::ALL {
            let generator = seeded(mode.as_str());
            for i in 0..500 {
                let sample = generator.gen_sample_at("LA", i);
                assert!(sample.throughput >= 0.0);
                assert!(sample.latency_ms >= 0.0);
                assert!((0.0..=1.0).contains(&sample.alert_rate));
                assert!((0.0..=1.0).contains(&sample.flow_index));
            }
        }
    }

    #[test]
    fn test_negative_draws_are_clamped() {
        let generator = MetricGenerator::builder()
            .mode("FLAP")
            .profile(
                Mode::Flap,
                ModeProfile {
                    latency_ms: Spread::new(-50.0, 1.0),
                    throughput: Spread::new(-50.0, 1.0),
                    alert_rate: Spread::new(2.0, 0.5),
                },
            )
            .seed(1)
            .build();

        let sample = generator.gen_sample_at("NYC", 1);
        assert_eq!(sample.latency_ms, 0.0);
        assert_eq!(sample.throughput, 0.0);
        assert_eq!(sample.alert_rate, 1.0);
    }

    #[test]
    fn test_unknown_mode_generates_with_normal_parameters() {
        let generator = seeded("storm");
        assert_eq!(generator.mode(), "STORM");

        let normal = ModeProfile::for_mode(Mode::Normal);
        for i in 0..200 {
            let sample = generator.gen_sample_at("NYC", i);
            let offset = (sample.latency_ms - normal.latency_ms.mean).abs();
            assert!(offset <= normal.latency_ms.deviation);
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let a = seeded("NORMAL");
        let b = seeded("NORMAL");
        assert_eq!(a.gen_sample_at("NYC", 5), b.gen_sample_at("NYC", 5));
    }

    #[test]
    fn test_tick_has_one_sample_per_node_in_order() {
        let generator = seeded("NORMAL");
        match generator.tick() {
            Envelope::MultiMetric { data } => {
                let nodes: Vec<_> = data.iter().map(|s| s.node.clone().unwrap()).collect();
                assert_eq!(nodes, ["NYC", "LA"]);
                assert_eq!(data[0].ts, data[1].ts);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_info_and_snapshot_reflect_mode() {
        let generator = seeded("NORMAL");
        generator.set_mode("congestion");

        assert_eq!(
            generator.info(),
            Envelope::info(vec!["NYC".into(), "LA".into()], "CONGESTION")
        );
        assert_eq!(
            generator.snapshot(),
            GeneratorSnapshot {
                nodes: vec!["NYC".into(), "LA".into()],
                mode: "CONGESTION".into(),
            }
        );
    }

    #[test]
    fn test_apply_control() {
        let generator = seeded("NORMAL");

        assert_eq!(generator.apply_control(r#"{"mode":"outage"}"#), Some("OUTAGE".into()));
        assert_eq!(generator.mode(), "OUTAGE");

        // Any message with a mode field counts, typed or not
        assert_eq!(
            generator.apply_control(r#"{"type":"whatever","mode":"flap"}"#),
            Some("FLAP".into())
        );

        // Non-string modes are stored by their JSON text
        assert_eq!(generator.apply_control(r#"{"mode":3}"#), Some("3".into()));

        assert_eq!(generator.apply_control(r#"{"type":"ping","ts":1}"#), None);
        assert_eq!(generator.apply_control(r#"{"mode":null}"#), None);
        assert_eq!(generator.apply_control("garbage"), None);
        assert_eq!(generator.mode(), "3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_emission_broadcasts_every_interval() {
        let generator = Arc::new(
            MetricGenerator::builder()
                .nodes(["NYC"])
                .interval(Duration::from_millis(800))
                .seed(3)
                .build(),
        );
        let subscribers = Arc::new(Subscribers::new());
        let (_, mut rx) = subscribers.subscribe();

        let emission = generator.start(subscribers.clone());

        // First tick fires immediately, then one every 800 ms
        tokio::time::sleep(Duration::from_millis(1700)).await;
        emission.stop();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        assert!(matches!(Envelope::decode(&frames[0]), Envelope::MultiMetric { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_ticks() {
        let generator = Arc::new(
            MetricGenerator::builder()
                .nodes(["NYC"])
                .interval(Duration::ZERO)
                .seed(3)
                .build(),
        );
        assert_eq!(generator.interval(), MIN_INTERVAL);

        let subscribers = Arc::new(Subscribers::new());
        let (_, mut rx) = subscribers.subscribe();
        let emission = generator.start(subscribers.clone());

        tokio::time::sleep(Duration::from_millis(5)).await;
        emission.stop();

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert!(count >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emission_stops_when_handle_dropped() {
        let generator = Arc::new(MetricGenerator::builder().seed(3).build());
        let subscribers = Arc::new(Subscribers::new());
        let (_, mut rx) = subscribers.subscribe();

        drop(generator.start(subscribers.clone()));
        tokio::time::sleep(Duration::from_millis(5000)).await;

        // At most the immediate first tick can slip through
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert!(count <= 1);
    }
}
