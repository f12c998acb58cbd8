//! Sensor aggregation: reduce a cluster of same-role sensors to one reading.
//!
//! Each cluster (monitored area, reference area) is reduced to the median
//! of its *active* sensors.  A sensor is excluded when it has no value, no
//! known activity, or its last activity is older than the staleness
//! timeout.  An empty active set yields no reading, and the caller skips
//! the evaluation cycle.

use serde::{Deserialize, Serialize};

use crate::app::ports::SensorCapability;
use crate::scheduler::Timestamp;

/// Which area a sensor cluster measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorRole {
    Monitored,
    Reference,
}

impl core::fmt::Display for SensorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Monitored => write!(f, "monitored"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// Why a sensor was left out of the reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The sensor has never reported a value.
    NoValue,
    /// The sensor has no recorded activity timestamp.
    NoActivity,
    /// Last activity is older than the staleness timeout.
    Stale { silent_secs: u64 },
}

/// Result of reducing one cluster, with the inclusion/exclusion lists
/// kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// Median of the active sensors, `None` if none are active.
    pub value: Option<f32>,
    pub included: Vec<String>,
    pub excluded: Vec<(String, ExclusionReason)>,
}

impl Aggregate {
    /// True if the cluster has sensors but every one was excluded.
    pub fn all_excluded(&self) -> bool {
        self.included.is_empty() && !self.excluded.is_empty()
    }

    /// Compact form kept in the persisted state for status reporting.
    pub fn summary(&self) -> ClusterReading {
        ClusterReading {
            value: self.value,
            active: self.included.len() as u16,
            total: (self.included.len() + self.excluded.len()) as u16,
        }
    }
}

/// Last reduced value of a cluster plus its active/total counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterReading {
    pub value: Option<f32>,
    pub active: u16,
    pub total: u16,
}

/// Reduce `cluster` to its representative value at time `now`.
pub fn representative_value(
    cluster: &[Box<dyn SensorCapability>],
    stale_after_secs: u32,
    now: Timestamp,
) -> Aggregate {
    let mut values = Vec::with_capacity(cluster.len());
    let mut agg = Aggregate::default();

    for sensor in cluster {
        let id = sensor.id().to_owned();
        let Some(value) = sensor.current_value() else {
            agg.excluded.push((id, ExclusionReason::NoValue));
            continue;
        };
        let Some(last) = sensor.last_activity() else {
            agg.excluded.push((id, ExclusionReason::NoActivity));
            continue;
        };
        let silent_secs = now.saturating_sub(last);
        if silent_secs > u64::from(stale_after_secs) {
            agg.excluded
                .push((id, ExclusionReason::Stale { silent_secs }));
            continue;
        }
        values.push(value);
        agg.included.push(id);
    }

    agg.value = median(&mut values);
    agg
}

/// Median after numeric sort; mean of the two middle values for even counts.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
