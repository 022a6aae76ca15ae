use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarConfig {
    #[serde(default)]
    pub bar: BarSettings,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSettings {
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_format")]
    pub format: OutputFormat,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[value(name = "i3bar")]
    I3bar,
    #[value(name = "plain")]
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_warning")]
    pub warning: f64,
    #[serde(default = "default_critical")]
    pub critical: f64,
    #[serde(default = "default_power_supply_root")]
    pub power_supply_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default = "default_fg_color", deserialize_with = "deserialize_color")]
    pub fg_color: [u8; 4],
    #[serde(default = "default_critical_color", deserialize_with = "deserialize_color")]
    pub critical_color: [u8; 4],
    #[serde(default = "default_warning_color", deserialize_with = "deserialize_color")]
    pub warning_color: [u8; 4],
    #[serde(default = "default_good_color", deserialize_with = "deserialize_color")]
    pub good_color: [u8; 4],
    /// Text placed before the label, keyed by tag name.
    #[serde(default)]
    pub prefix: HashMap<String, String>,
}

// Defaults

fn default_interval() -> u64 { 5 }
fn default_format() -> OutputFormat { OutputFormat::I3bar }
fn default_device() -> String { "BAT0".into() }
fn default_warning() -> f64 { 20.0 }
fn default_critical() -> f64 { 10.0 }
fn default_power_supply_root() -> PathBuf { PathBuf::from("/sys/class/power_supply") }

fn default_fg_color() -> [u8; 4] { [0xFF, 0xFF, 0xFF, 0xFF] }
fn default_critical_color() -> [u8; 4] { [0xEF, 0x44, 0x44, 0xFF] }
fn default_warning_color() -> [u8; 4] { [0xFB, 0xBF, 0x24, 0xFF] }
fn default_good_color() -> [u8; 4] { [0x4A, 0xDE, 0x80, 0xFF] }

fn deserialize_color<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 4], D::Error> {
    let s = String::deserialize(d)?;
    parse_color(&s).map_err(serde::de::Error::custom)
}

pub fn parse_color(s: &str) -> Result<[u8; 4]> {
    let s = s.trim_start_matches('#');
    anyhow::ensure!(s.len() == 6 || s.len() == 8, "Color must be RRGGBB or RRGGBBAA");
    anyhow::ensure!(s.chars().all(|c| c.is_ascii_hexdigit()), "Color must be hex digits: {}", s);
    let r = u8::from_str_radix(&s[0..2], 16)?;
    let g = u8::from_str_radix(&s[2..4], 16)?;
    let b = u8::from_str_radix(&s[4..6], 16)?;
    let a = if s.len() == 8 { u8::from_str_radix(&s[6..8], 16)? } else { 0xFF };
    Ok([r, g, b, a])
}

// Implementations

impl Default for BarSettings {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            format: default_format(),
            strict: false,
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            warning: default_warning(),
            critical: default_critical(),
            power_supply_root: default_power_supply_root(),
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            fg_color: default_fg_color(),
            critical_color: default_critical_color(),
            warning_color: default_warning_color(),
            good_color: default_good_color(),
            prefix: HashMap::new(),
        }
    }
}

impl BarConfig {
    /// Apply a `section.key=value` override on top of the loaded file.
    pub fn apply_param(&mut self, param: &str) -> Result<()> {
        let (key, value) = param
            .split_once('=')
            .with_context(|| format!("Parameter must be key=value: {}", param))?;
        let value = value.trim();

        match key.trim() {
            "bar.interval" => {
                self.bar.interval = value
                    .parse()
                    .with_context(|| format!("Invalid interval: {}", value))?
            }
            "bar.strict" => {
                self.bar.strict = value
                    .parse()
                    .with_context(|| format!("Invalid strict flag: {}", value))?
            }
            "bar.format" => {
                self.bar.format = match value {
                    "i3bar" => OutputFormat::I3bar,
                    "plain" => OutputFormat::Plain,
                    other => anyhow::bail!("Unknown output format: {}", other),
                }
            }
            "battery.device" => self.battery.device = value.to_string(),
            "battery.warning" => {
                self.battery.warning = value
                    .parse()
                    .with_context(|| format!("Invalid warning threshold: {}", value))?
            }
            "battery.critical" => {
                self.battery.critical = value
                    .parse()
                    .with_context(|| format!("Invalid critical threshold: {}", value))?
            }
            "battery.power_supply_root" => self.battery.power_supply_root = PathBuf::from(value),
            other => anyhow::bail!("Unknown parameter: {}", other),
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs_path().join("config.toml")
}

fn dirs_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(".config")
        });
    base.join("powerbar")
}

pub fn load_config(path: &std::path::Path) -> Result<BarConfig> {
    if !path.exists() {
        log::info!("Config file not found at {}, generating default", path.display());
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::write(path, DEFAULT_CONFIG) {
            Ok(()) => log::info!("Created default config at {}", path.display()),
            Err(e) => log::warn!("Failed to write default config: {}", e),
        }
        return Ok(BarConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: BarConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(config)
}

const DEFAULT_CONFIG: &str = r#"# powerbar status line
# Configuration file, generated automatically on first run.
# Uncomment and edit values to customise. Defaults are shown.

[bar]
# Seconds between polls
interval = 5
# "i3bar" | "plain"
format = "i3bar"
# Exit on malformed sensor data instead of rendering "n/a"
strict = false

[battery]
# Device directory under power_supply_root
device = "BAT0"
# Thresholds in % of remaining charge
warning  = 20
critical = 10
power_supply_root = "/sys/class/power_supply"

[theme]
# Colours in RRGGBB or RRGGBBAA hex (# prefix optional)
fg_color       = "FFFFFFFF"
critical_color = "ef4444FF"
warning_color  = "fbbf24FF"
# Used for AC and charged
good_color     = "4ade80FF"

# Text placed before the label for the first matching tag
[theme.prefix]
# "AC" = "⚡ "
# "discharging-10" = "▁ "
# "discharging-100" = "█ "
"#;
