use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

/// Liveness reporting for the long-running loops of the ingester.
///
/// The ingester can only be trusted with publish events while its consumer
/// loop keeps polling Kafka and the rdkafka client keeps emitting statistics.
/// Each of those loops registers itself as a component and must report
/// healthy more often than its deadline:
///   - a component that never reported is `Starting` and fails the check;
///   - a component that reported `Unhealthy` fails the check;
///   - a component whose last report is older than its deadline is `Stalled`
///     and fails the check.
///
/// The registry is only about liveness. Readiness of downstream services
/// (the native writer) is probed separately by the HTTP admin handlers.
#[derive(Default, Debug)]
pub struct HealthStatus {
    /// True when at least one component is registered and all of them are healthy
    pub healthy: bool,
    /// Status of each registered component, ordered by name
    pub components: BTreeMap<String, ComponentStatus>,
}

impl HealthStatus {
    /// Names and statuses of the components that fail the check.
    pub fn failing(&self) -> impl Iterator<Item = (&str, &ComponentStatus)> {
        self.components
            .iter()
            .filter(|(_, status)| !matches!(status, ComponentStatus::HealthyUntil(_)))
            .map(|(name, status)| (name.as_str(), status))
    }
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = self.to_string();
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "healthy: {}", self.healthy)?;
        for (name, status) in &self.components {
            writeln!(f, "{name}: {status}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Set on registration, until the first report
    Starting,
    /// Reported healthy, must report again before the deadline
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// The HealthyUntil deadline has passed without a new report
    Stalled,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Starting => write!(f, "starting"),
            ComponentStatus::HealthyUntil(until) => write!(f, "healthy until {until}"),
            ComponentStatus::Unhealthy => write!(f, "unhealthy"),
            ComponentStatus::Stalled => write!(f, "stalled"),
        }
    }
}

type Components = Arc<RwLock<BTreeMap<String, ComponentStatus>>>;

/// Handed to a component so it can report its own status.
///
/// Reporting is synchronous and never blocks on I/O, so handles can be used
/// from the rdkafka statistics callback thread as well as from async tasks.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Components,
}

impl HealthHandle {
    /// Report healthy until `now + deadline`.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc() + self.deadline,
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut components) => {
                components.insert(self.component.clone(), status);
            }
            // The probes will fail and the process will be restarted
            Err(_) => warn!("poisoned health registry lock"),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Components,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a component in `Starting` state and returns its reporting handle.
    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Computes the overall status from the registered components.
    /// Can be used directly as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let Ok(components) = self.components.read() else {
            warn!("{} health check failed: poisoned registry lock", self.name);
            return HealthStatus::default();
        };

        let now = OffsetDateTime::now_utc();
        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: BTreeMap::new(),
        };

        for (name, component_status) in components.iter() {
            let current = match component_status {
                ComponentStatus::HealthyUntil(until) if *until > now => component_status.clone(),
                ComponentStatus::HealthyUntil(_) => ComponentStatus::Stalled,
                other => other.clone(),
            };
            if !matches!(current, ComponentStatus::HealthyUntil(_)) {
                status.healthy = false;
            }
            status.components.insert(name.clone(), current);
        }

        match status.healthy {
            true => debug!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, status.components),
        }
        status
    }
}
