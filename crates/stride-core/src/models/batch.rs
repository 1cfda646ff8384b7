//! Batch model and wire payload entries

use serde::{Deserialize, Serialize};

use super::sample::{NewSample, Sample, SampleKey};

/// One entry of a batch payload as it crosses the wire.
///
/// Field names are the wire schema: a JSON array of
/// `{"entryId": 17, "date": "2025-03-01 08:00:00", "steps": 12, "heartRate": 71.5}`
/// objects. `entryId` is the sender's local sample id, echoed back in acks
/// for precise sync marking; receivers must not assume it matches their own
/// row ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    #[serde(rename = "entryId", default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<i64>,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(rename = "heartRate", default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
}

impl BatchEntry {
    /// Build a wire entry from a stored sample
    #[must_use]
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            entry_id: Some(sample.id),
            date: sample.recorded_at.clone(),
            steps: sample.steps,
            heart_rate: sample.heart_rate,
        }
    }

    /// The de-duplication key of this entry
    #[must_use]
    pub fn key(&self) -> SampleKey {
        SampleKey {
            recorded_at: self.date.clone(),
            steps: self.steps,
            heart_rate: self.heart_rate,
        }
    }

    /// Validate and convert into an insertable sample.
    ///
    /// Fails when the entry carries no measurement at all, which is how a
    /// malformed item inside an otherwise valid payload surfaces.
    pub fn into_new_sample(self) -> crate::Result<NewSample> {
        NewSample::new(self.date, self.steps, self.heart_rate)
    }
}

/// A durable record of one transmission attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Locally assigned, monotonically increasing id
    pub id: i64,
    /// Creation time, unix milliseconds
    pub created_at: i64,
    /// Serialized payload (JSON array of [`BatchEntry`])
    pub payload_json: String,
    pub confirmed: bool,
}

impl Batch {
    /// Decode the stored payload
    pub fn entries(&self) -> crate::Result<Vec<BatchEntry>> {
        Ok(serde_json::from_str(&self.payload_json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entry_serializes_with_wire_field_names() {
        let entry = BatchEntry {
            entry_id: Some(17),
            date: "2025-03-01 08:00:00".to_string(),
            steps: Some(12),
            heart_rate: Some(71.5),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"entryId":17,"date":"2025-03-01 08:00:00","steps":12,"heartRate":71.5}"#
        );
    }

    #[test]
    fn entry_without_measurements_is_rejected() {
        let entry = BatchEntry {
            entry_id: None,
            date: "2025-03-01 08:00:00".to_string(),
            steps: None,
            heart_rate: None,
        };
        assert!(entry.into_new_sample().is_err());
    }

    #[test]
    fn missing_optional_fields_deserialize_as_none() {
        let entry: BatchEntry =
            serde_json::from_str(r#"{"date":"2025-03-01 08:00:00","steps":3}"#).unwrap();
        assert_eq!(entry.entry_id, None);
        assert_eq!(entry.heart_rate, None);
        assert_eq!(entry.steps, Some(3));
    }
}
