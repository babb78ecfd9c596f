//! Best-effort telemetry refresh.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use stagelink_core::{RelayError, TelemetrySource};

use crate::{
    config::AttributeSpec,
    snapshot::{Sentinel, TelemetryReading, TelemetrySnapshot, TelemetryValue},
};

/// Fetches the configured attributes from a telemetry source.
///
/// `refresh` never fails: every problem ends up as a sentinel value or as
/// the snapshot's `error`.
pub struct TelemetryRefresher<S: ?Sized> {
    source: Arc<S>,
    attributes: Vec<AttributeSpec>,
}

impl<S> TelemetryRefresher<S>
where
    S: TelemetrySource + ?Sized,
{
    /// Create a refresher over an ordered attribute list.
    #[must_use]
    pub fn new(source: Arc<S>, attributes: Vec<AttributeSpec>) -> Self {
        Self { source, attributes }
    }

    /// Attributes this refresher reports, in order.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// Fetch a fresh snapshot.
    ///
    /// Values are fetched one after another in configuration order.
    pub async fn refresh(&self) -> TelemetrySnapshot {
        let attributes = match self.source.list_attributes().await {
            Ok(attributes) => attributes,
            Err(e) => {
                tracing::error!("Telemetry attribute listing failed: {e}");
                return self.connection_failed(&e);
            }
        };

        let ids: HashMap<String, String> = attributes
            .into_iter()
            .map(|a| (a.name, a.web_id))
            .collect();
        tracing::debug!(available = ids.len(), "Telemetry attributes listed");

        let fallback_time = Utc::now().to_rfc3339();
        let mut readings = Vec::with_capacity(self.attributes.len());

        for spec in &self.attributes {
            let (value, timestamp) = match ids.get(&spec.attribute) {
                None => {
                    tracing::warn!(attribute = %spec.attribute, "Attribute not found on telemetry element");
                    (TelemetryValue::Sentinel(Sentinel::NotFound), None)
                }
                Some(web_id) => match self.source.fetch_value(web_id).await {
                    Ok(v) => (TelemetryValue::from_raw(v.value), v.timestamp),
                    Err(e) => {
                        tracing::warn!(attribute = %spec.attribute, "Failed to fetch value: {e}");
                        (TelemetryValue::Sentinel(value_sentinel(&e)), None)
                    }
                },
            };
            readings.push(TelemetryReading {
                label: spec.label.clone(),
                value,
                unit: spec.unit.clone(),
                timestamp: timestamp.unwrap_or_else(|| fallback_time.clone()),
            });
        }

        TelemetrySnapshot {
            readings,
            is_loading: false,
            error: None,
            last_updated: Some(Utc::now()),
        }
    }

    fn connection_failed(&self, error: &RelayError) -> TelemetrySnapshot {
        let now = Utc::now();
        let timestamp = now.to_rfc3339();
        TelemetrySnapshot {
            readings: self
                .attributes
                .iter()
                .map(|spec| TelemetryReading {
                    label: spec.label.clone(),
                    value: TelemetryValue::Sentinel(Sentinel::ConnectionFailed),
                    unit: spec.unit.clone(),
                    timestamp: timestamp.clone(),
                })
                .collect(),
            is_loading: false,
            error: Some(format!("Failed to connect to telemetry relay: {error}")),
            last_updated: Some(now),
        }
    }
}

const fn value_sentinel(error: &RelayError) -> Sentinel {
    match error {
        RelayError::Status(_) => Sentinel::Error,
        RelayError::Transport(_) | RelayError::Decode(_) => Sentinel::Unavailable,
    }
}
