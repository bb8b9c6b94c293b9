use prometheus::{
    register_counter_with_registry, register_gauge_with_registry, Counter, Gauge, Registry,
};
use std::sync::Arc;

pub struct RelayMetrics {
    pub active_users: Gauge,
    pub logins_total: Counter,
    pub login_failures_total: Counter,
    pub messages_forwarded_total: Counter,
    pub messages_dropped_total: Counter,
    pub errors_total: Counter,
    pub disconnects_total: Counter,
    pub registry: Arc<Registry>,
}

impl RelayMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let active_users = register_gauge_with_registry!(
            "signal_relay_active_users",
            "Number of currently registered users",
            registry
        )?;

        let logins_total = register_counter_with_registry!(
            "signal_relay_logins_total",
            "Total number of successful logins",
            registry
        )?;

        let login_failures_total = register_counter_with_registry!(
            "signal_relay_login_failures_total",
            "Total number of rejected logins",
            registry
        )?;

        let messages_forwarded_total = register_counter_with_registry!(
            "signal_relay_messages_forwarded_total",
            "Total number of signaling messages forwarded to a recipient",
            registry
        )?;

        let messages_dropped_total = register_counter_with_registry!(
            "signal_relay_messages_dropped_total",
            "Total number of messages dropped for an unknown recipient",
            registry
        )?;

        let errors_total = register_counter_with_registry!(
            "signal_relay_errors_total",
            "Total number of malformed or unrecognized messages",
            registry
        )?;

        let disconnects_total = register_counter_with_registry!(
            "signal_relay_disconnects_total",
            "Total number of closed sockets",
            registry
        )?;

        Ok(Self {
            active_users,
            logins_total,
            login_failures_total,
            messages_forwarded_total,
            messages_dropped_total,
            errors_total,
            disconnects_total,
            registry,
        })
    }

    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new().unwrap()
    }
}
