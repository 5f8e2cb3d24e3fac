//! The metrics sink seam: the core only needs `publish(name, labels, value)`;
//! the `prometheus`-backed implementation and its `/metrics` HTTP handler
//! live here as the one shipped collaborator.

use std::collections::HashMap;
use std::sync::Mutex;

/// A destination for gauge samples. The controller and electricity node
/// never construct Prometheus types directly, they publish through
/// this trait so the sink can be swapped (or no-op'd in tests).
pub trait MetricsSink: Send + Sync {
    fn publish(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

/// A `prometheus`-backed sink exposing gauges keyed by their full label
/// set, lazily registering a `GaugeVec` per metric name on first use.
pub struct PrometheusSink {
    registry: prometheus::Registry,
    gauges: Mutex<HashMap<String, prometheus::GaugeVec>>,
}

impl PrometheusSink {
    pub fn new() -> PrometheusSink {
        PrometheusSink {
            registry: prometheus::Registry::new(),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &prometheus::Registry {
        &self.registry
    }

    /// Render the current registry in Prometheus text-exposition format.
    pub fn encode(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = prometheus::TextEncoder::new();
        let mut buf = String::new();
        if let Err(e) = encoder.encode_utf8(&metric_families, &mut buf) {
            log::warn!("failed to encode metrics: {}", e);
        }
        buf
    }

    fn gauge_for(&self, name: &str, label_names: &[&str]) -> prometheus::GaugeVec {
        let mut gauges = self.gauges.lock().expect("metrics lock poisoned");
        if let Some(g) = gauges.get(name) {
            return g.clone();
        }

        let opts = prometheus::Opts::new(name, format!("{} gauge", name));
        let gauge = prometheus::GaugeVec::new(opts, label_names)
            .unwrap_or_else(|e| panic!("invalid metric definition for {}: {}", name, e));
        self.registry
            .register(Box::new(gauge.clone()))
            .unwrap_or_else(|e| panic!("failed to register {}: {}", name, e));
        gauges.insert(name.to_string(), gauge.clone());
        gauge
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusSink {
    fn publish(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let label_names: Vec<&str> = labels.iter().map(|(k, _)| *k).collect();
        let label_values: Vec<&str> = labels.iter().map(|(_, v)| *v).collect();
        let gauge = self.gauge_for(name, &label_names);
        gauge.with_label_values(&label_values).set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_registers_and_updates_gauge() {
        let sink = PrometheusSink::new();
        sink.publish("home_aircon_temperature", &[("ip", "192.0.2.1"), ("location", "Room1"), ("type", "room")], 28.0);
        let rendered = sink.encode();
        assert!(rendered.contains("home_aircon_temperature"));
        assert!(rendered.contains("28"));
    }

    #[test]
    fn republishing_same_labels_overwrites_value() {
        let sink = PrometheusSink::new();
        sink.publish("home_smartmeter_exporter_instantpower", &[], 100.0);
        sink.publish("home_smartmeter_exporter_instantpower", &[], 504.0);
        let rendered = sink.encode();
        assert!(rendered.contains("504"));
        assert!(!rendered.contains(" 100\n"));
    }
}
