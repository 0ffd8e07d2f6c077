use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Per-service operational metrics, keyed by service name and refreshed on
/// each `/metrics` poll. Kept deliberately light: uptime plus whatever
/// counters an individual service chooses to report through
/// `custom_metrics`, rather than process-wide CPU/memory sampling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub uptime_seconds: u64,
    pub operations_total: u64,
    pub operations_per_second: f32,
    pub errors_total: u64,
    pub custom_metrics: HashMap<String, f64>,
}

impl ServiceMetrics {
    /// Ensure all numeric fields are finite before serialization
    pub fn sanitize(&mut self) {
        if !self.operations_per_second.is_finite() {
            self.operations_per_second = 0.0;
        }
        self.custom_metrics.retain(|_, value| value.is_finite());
    }

    /// Return a sanitized copy of the metrics
    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    /// Calculate average operations per second based on uptime
    pub fn throughput_per_second(&self) -> f32 {
        if self.uptime_seconds == 0 {
            return 0.0;
        }
        (self.operations_total as f32) / (self.uptime_seconds as f32)
    }
}

pub struct MetricsCollector {
    service_start_times: Arc<Mutex<HashMap<&'static str, Instant>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            service_start_times: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record the moment a service started, for uptime tracking.
    pub fn start_monitoring(&self, service_name: &'static str) {
        let start_times = self.service_start_times.clone();
        tokio::spawn(async move {
            start_times.lock().await.insert(service_name, Instant::now());
        });
    }

    /// Collect metrics for a specific service.
    pub async fn collect_for_service(&self, name: &str) -> ServiceMetrics {
        let start_times = self.service_start_times.lock().await;
        let uptime = start_times
            .get(name)
            .map(|start| start.elapsed().as_secs())
            .unwrap_or(0);
        drop(start_times);

        ServiceMetrics {
            uptime_seconds: uptime,
            operations_total: 0,
            operations_per_second: 0.0,
            errors_total: 0,
            custom_metrics: HashMap::new(),
        }
        .sanitized()
    }

    /// Collect metrics for every named service.
    pub async fn collect_all(
        &self,
        service_names: &[&'static str],
    ) -> HashMap<&'static str, ServiceMetrics> {
        let mut metrics = HashMap::new();
        for &name in service_names {
            metrics.insert(name, self.collect_for_service(name).await);
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceMetrics;
    use std::collections::HashMap;

    #[test]
    fn sanitizes_non_finite_values() {
        let mut metrics = ServiceMetrics {
            uptime_seconds: 0,
            operations_total: 0,
            operations_per_second: f32::INFINITY,
            errors_total: 0,
            custom_metrics: HashMap::from([
                ("valid".to_string(), 1.0),
                ("nan".to_string(), f64::NAN),
                ("inf".to_string(), f64::INFINITY),
            ]),
        };

        metrics.sanitize();

        assert!(metrics.operations_per_second.is_finite());
        assert_eq!(metrics.custom_metrics.len(), 1);
        assert_eq!(metrics.custom_metrics.get("valid"), Some(&1.0));
    }

    #[test]
    fn throughput_is_zero_with_no_uptime() {
        let metrics = ServiceMetrics::default();
        assert_eq!(metrics.throughput_per_second(), 0.0);
    }
}
