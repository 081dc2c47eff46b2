use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub tracking_sessions_active: IntGauge,
    pub position_events_total: IntCounterVec,
    pub route_builds_total: IntCounterVec,
    pub route_latency_seconds: HistogramVec,
    pub geolocation_failures_total: IntCounter,
    pub channel_reconnects_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tracking_sessions_active = IntGauge::new(
            "tracking_sessions_active",
            "Map sessions currently mounted",
        )
        .expect("valid tracking_sessions_active metric");

        let position_events_total = IntCounterVec::new(
            Opts::new("position_events_total", "Driver position events by outcome"),
            &["outcome"],
        )
        .expect("valid position_events_total metric");

        let route_builds_total = IntCounterVec::new(
            Opts::new("route_builds_total", "Route overlay builds by outcome"),
            &["outcome"],
        )
        .expect("valid route_builds_total metric");

        let route_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "route_latency_seconds",
                "Latency of route computation in seconds",
            ),
            &["outcome"],
        )
        .expect("valid route_latency_seconds metric");

        let geolocation_failures_total = IntCounter::new(
            "geolocation_failures_total",
            "Position queries that failed or timed out",
        )
        .expect("valid geolocation_failures_total metric");

        let channel_reconnects_total = IntCounter::new(
            "channel_reconnects_total",
            "Real-time channel reconnect attempts",
        )
        .expect("valid channel_reconnects_total metric");

        registry
            .register(Box::new(tracking_sessions_active.clone()))
            .expect("register tracking_sessions_active");
        registry
            .register(Box::new(position_events_total.clone()))
            .expect("register position_events_total");
        registry
            .register(Box::new(route_builds_total.clone()))
            .expect("register route_builds_total");
        registry
            .register(Box::new(route_latency_seconds.clone()))
            .expect("register route_latency_seconds");
        registry
            .register(Box::new(geolocation_failures_total.clone()))
            .expect("register geolocation_failures_total");
        registry
            .register(Box::new(channel_reconnects_total.clone()))
            .expect("register channel_reconnects_total");

        Self {
            registry,
            tracking_sessions_active,
            position_events_total,
            route_builds_total,
            route_latency_seconds,
            geolocation_failures_total,
            channel_reconnects_total,
        }
    }

    pub fn record_route(&self, outcome: &str, elapsed_secs: f64) {
        self.route_builds_total.with_label_values(&[outcome]).inc();
        self.route_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
