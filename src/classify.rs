use serde::{Serialize, Serializer};
use std::fmt;

/// Discharge granularity used for `discharging-<bucket>` tags, scanned in ascending order.
pub const DISCHARGE_BUCKETS: [u8; 5] = [10, 25, 50, 80, 100];

/// Below this fraction a reading is reported the same way as a failed read.
const CHARGE_FLOOR: f64 = 0.01;

/// Above this fraction a non-discharging battery counts as charged.
const CHARGED_ABOVE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Charge {
    Known(f64),
    Unknown,
}

impl Charge {
    /// Build a known charge from a raw ratio, clamped to `[0, 1]`.
    /// NaN becomes `Unknown`.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio.is_nan() {
            Charge::Unknown
        } else {
            Charge::Known(ratio.clamp(0.0, 1.0))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Critical,
    Warning,
    Unknown,
    Ac,
    Charging,
    Charged,
    Discharging(u8),
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Critical => f.write_str("critical"),
            Tag::Warning => f.write_str("warning"),
            Tag::Unknown => f.write_str("unknown"),
            Tag::Ac => f.write_str("AC"),
            Tag::Charging => f.write_str("charging"),
            Tag::Charged => f.write_str("charged"),
            Tag::Discharging(bucket) => write!(f, "discharging-{}", bucket),
        }
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Severity thresholds in percent. Ordering between the two is not checked;
/// `critical` is simply tested first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { warning: 20.0, critical: 10.0 }
    }
}

pub fn display_text(charge: Charge, on_ac: bool) -> String {
    if on_ac {
        return "ac".into();
    }
    match charge {
        Charge::Unknown => "n/a".into(),
        Charge::Known(f) => format!("{:.0}%", f * 100.0),
    }
}

/// Classify a reading into severity and power-state tags.
///
/// `status` is only invoked when the battery is not on AC and the reading is
/// usable; it should return the live status string, or `None` if it could not
/// be read.
pub fn state_tags<F>(charge: Charge, on_ac: bool, thresholds: &Thresholds, status: F) -> Vec<Tag>
where
    F: FnOnce() -> Option<String>,
{
    let fraction = match charge {
        Charge::Known(f) if f >= CHARGE_FLOOR => f,
        _ => return unknown_tags(),
    };

    let mut tags = Vec::with_capacity(2);
    if fraction < thresholds.critical / 100.0 {
        tags.push(Tag::Critical);
    } else if fraction < thresholds.warning / 100.0 {
        tags.push(Tag::Warning);
    }

    if on_ac {
        tags.push(Tag::Ac);
        return tags;
    }

    let Some(status) = status() else {
        return unknown_tags();
    };

    if status == "Discharging" {
        tags.push(Tag::Discharging(nearest_bucket(fraction * 100.0)));
    } else if fraction > CHARGED_ABOVE {
        tags.push(Tag::Charged);
    } else {
        tags.push(Tag::Charging);
    }
    tags
}

pub fn unknown_tags() -> Vec<Tag> {
    vec![Tag::Critical, Tag::Unknown]
}

/// Closest entry of `DISCHARGE_BUCKETS` to `percent`; on a tie the lower bucket wins.
pub fn nearest_bucket(percent: f64) -> u8 {
    let mut best = DISCHARGE_BUCKETS[0];
    let mut best_dist = (percent - best as f64).abs();
    for &bucket in &DISCHARGE_BUCKETS[1..] {
        let dist = (percent - bucket as f64).abs();
        if dist < best_dist {
            best = bucket;
            best_dist = dist;
        }
    }
    best
}
