use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::{self, Charge, Tag, Thresholds};
use crate::config::BatteryConfig;
use crate::sensor::{Sensor, SensorError};

const CHARGE_FULL: &str = "charge_full";
const CHARGE_NOW: &str = "charge_now";
const STATUS: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub charge: Charge,
    pub on_ac: bool,
}

impl Default for BatteryReading {
    fn default() -> Self {
        Self { charge: Charge::Known(1.0), on_ac: false }
    }
}

/// Reader for one `power_supply` device directory.
#[derive(Debug, Clone)]
pub struct PowerSupply {
    dir: PathBuf,
}

impl PowerSupply {
    pub fn new(root: &Path, device: &str) -> Self {
        Self { dir: root.join(device) }
    }

    /// Overwrite `reading` with the current state of the device.
    ///
    /// A missing device directory means mains power. Every error path leaves
    /// the reading as `Unknown` on battery.
    pub fn update(&self, reading: &mut BatteryReading) -> Result<(), SensorError> {
        reading.on_ac = false;
        if !self.dir.exists() {
            reading.on_ac = true;
            reading.charge = Charge::Known(1.0);
            return Ok(());
        }

        match self.read_charge() {
            Ok(charge) => {
                reading.charge = charge;
                Ok(())
            }
            Err(e) => {
                reading.charge = Charge::Unknown;
                Err(e)
            }
        }
    }

    /// Live status string, e.g. `Discharging`. Not cached.
    pub fn status(&self) -> Result<String, SensorError> {
        read_attr(&self.dir.join(STATUS))
    }

    fn read_charge(&self) -> Result<Charge, SensorError> {
        let full_path = self.dir.join(CHARGE_FULL);
        let now_path = self.dir.join(CHARGE_NOW);

        let full_raw = read_attr(&full_path)?;
        let full: i64 = full_raw
            .parse()
            .map_err(|_| SensorError::malformed(&full_path, &full_raw))?;
        if full <= 0 {
            return Err(SensorError::malformed(&full_path, &full_raw));
        }

        let now_raw = read_attr(&now_path)?;
        let now: f64 = now_raw
            .parse()
            .map_err(|_| SensorError::malformed(&now_path, &now_raw))?;
        if !now.is_finite() || now < 0.0 {
            return Err(SensorError::malformed(&now_path, &now_raw));
        }

        Ok(Charge::from_ratio((now / full as f64).min(1.0)))
    }
}

/// Missing or inaccessible files are unreadable; bytes that are not UTF-8 are malformed.
fn read_attr(path: &Path) -> Result<String, SensorError> {
    let bytes = fs::read(path).map_err(|e| SensorError::unreadable(path, e))?;
    match String::from_utf8(bytes) {
        Ok(raw) => Ok(raw.trim().to_string()),
        Err(e) => Err(SensorError::malformed(path, String::from_utf8_lossy(e.as_bytes()))),
    }
}

pub struct BatterySensor {
    name: String,
    supply: PowerSupply,
    thresholds: Thresholds,
    reading: BatteryReading,
}

impl BatterySensor {
    pub fn new(config: &BatteryConfig) -> Self {
        Self {
            name: format!("battery:{}", config.device),
            supply: PowerSupply::new(&config.power_supply_root, &config.device),
            thresholds: Thresholds { warning: config.warning, critical: config.critical },
            reading: BatteryReading::default(),
        }
    }
}

impl Sensor for BatterySensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> Result<(), SensorError> {
        self.supply.update(&mut self.reading)
    }

    fn label(&self) -> String {
        classify::display_text(self.reading.charge, self.reading.on_ac)
    }

    fn tags(&self) -> Vec<Tag> {
        classify::state_tags(self.reading.charge, self.reading.on_ac, &self.thresholds, || {
            match self.supply.status() {
                Ok(status) => Some(status),
                Err(e) => {
                    log::warn!("{}: {}", self.name, e);
                    None
                }
            }
        })
    }
}
