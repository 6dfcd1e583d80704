use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// One health alert observed on a resource
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub resource_arn: String,

    #[serde(default)]
    pub detail: AlertDetail,

    /// Epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,
}

/// Alert payload. Only the pipeline index is interpreted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertDetail {
    #[serde(
        default,
        deserialize_with = "pipeline_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub pipeline: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pipeline index arrives as a number or a numeric string
fn pipeline_index<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Uniqueness key of an alert: resource plus pipeline when present
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AlertKey {
    pub resource_id: String,
    pub pipeline: Option<u32>,
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.pipeline {
            Some(p) => write!(f, "{}:{}", self.resource_id, p),
            None => f.write_str(&self.resource_id),
        }
    }
}

impl AlertEvent {
    pub fn new(resource_arn: impl Into<String>, pipeline: Option<u32>) -> Self {
        Self {
            resource_arn: resource_arn.into(),
            detail: AlertDetail {
                pipeline,
                extra: Map::new(),
            },
            timestamp: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn key(&self) -> AlertKey {
        AlertKey {
            resource_id: self.resource_arn.clone(),
            pipeline: self.detail.pipeline,
        }
    }
}

/// Keep one alert per key: the last observation, at the position the key
/// was first seen
pub fn dedup(alerts: &[AlertEvent]) -> Vec<AlertEvent> {
    let mut slots: HashMap<AlertKey, usize> = HashMap::new();
    let mut unique: Vec<AlertEvent> = Vec::new();

    for alert in alerts {
        match slots.get(&alert.key()) {
            Some(&index) => unique[index] = alert.clone(),
            None => {
                slots.insert(alert.key(), unique.len());
                unique.push(alert.clone());
            }
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_number_or_string() {
        let alerts: Vec<AlertEvent> = serde_json::from_str(
            r#"[
                {"resource_arn": "x", "detail": {"pipeline": 1, "alert_type": "RTP"}, "timestamp": 10},
                {"resource_arn": "y", "detail": {"pipeline": "0"}},
                {"resource_arn": "z"}
            ]"#,
        )
        .unwrap();

        assert_eq!(alerts[0].detail.pipeline, Some(1));
        assert_eq!(alerts[0].detail.extra["alert_type"], "RTP");
        assert_eq!(alerts[0].timestamp, 10);
        assert_eq!(alerts[1].detail.pipeline, Some(0));
        assert_eq!(alerts[2].detail.pipeline, None);
        assert_eq!(alerts[2].key().to_string(), "z");
        assert_eq!(alerts[0].key().to_string(), "x:1");
    }

    #[test]
    fn test_dedup_keeps_last_observation() {
        let alerts = vec![
            AlertEvent::new("x", Some(0)).with_timestamp(1),
            AlertEvent::new("x", Some(1)).with_timestamp(2),
            AlertEvent::new("x", Some(0)).with_timestamp(3),
            AlertEvent::new("y", None).with_timestamp(4),
            AlertEvent::new("y", None).with_timestamp(5),
        ];

        let unique = dedup(&alerts);
        let seen: Vec<(String, i64)> = unique
            .iter()
            .map(|a| (a.key().to_string(), a.timestamp))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("x:0".to_string(), 3),
                ("x:1".to_string(), 2),
                ("y".to_string(), 5),
            ]
        );
    }
}
