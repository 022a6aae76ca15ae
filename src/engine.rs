use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::battery::BatterySensor;
use crate::config::{self, BarConfig, OutputFormat};
use crate::ipc;
use crate::output::{Block, LineWriter};
use crate::sensor::Sensor;

/// Where the configuration comes from, kept so `reload-config` can redo it.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub params: Vec<String>,
    pub interval: Option<u64>,
    pub format: Option<OutputFormat>,
}

impl ConfigSource {
    pub fn load(&self) -> Result<BarConfig> {
        let mut config = config::load_config(&self.path)?;
        for param in &self.params {
            config.apply_param(param)?;
        }
        if let Some(interval) = self.interval {
            config.bar.interval = interval;
        }
        if let Some(format) = self.format {
            config.bar.format = format;
        }
        Ok(config)
    }
}

/// The sensors plus the last rendered line.
pub struct Bar {
    config: BarConfig,
    sensors: Vec<Box<dyn Sensor>>,
    blocks: Vec<Block>,
    last_poll: Option<DateTime<Local>>,
}

impl Bar {
    pub fn new(config: BarConfig) -> Self {
        let sensors = build_sensors(&config);
        Self { config, sensors, blocks: Vec::new(), last_poll: None }
    }

    pub fn config(&self) -> &BarConfig {
        &self.config
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn last_poll(&self) -> Option<DateTime<Local>> {
        self.last_poll
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.bar.interval.max(1))
    }

    /// Replace config and sensors. Readings start over.
    pub fn reload(&mut self, config: BarConfig) {
        self.sensors = build_sensors(&config);
        self.config = config;
        self.blocks.clear();
    }

    /// One poll cycle: poll, label and tag every sensor in order.
    ///
    /// Unreadable telemetry is logged and rendered. Malformed telemetry is
    /// rendered too, unless `strict` is set, in which case it aborts the tick.
    pub fn tick(&mut self) -> Result<&[Block]> {
        let mut blocks = Vec::with_capacity(self.sensors.len());
        for sensor in self.sensors.iter_mut() {
            if let Err(e) = sensor.poll() {
                if e.is_recoverable() {
                    log::warn!("{}: {}", sensor.name(), e);
                } else if self.config.bar.strict {
                    let name = sensor.name().to_string();
                    return Err(anyhow::Error::new(e).context(format!("Sensor {} failed", name)));
                } else {
                    log::error!("{}: {}", sensor.name(), e);
                }
            }
            blocks.push(Block::from_sensor(&**sensor, &self.config.theme));
        }
        self.blocks = blocks;
        self.last_poll = Some(Local::now());
        Ok(&self.blocks)
    }
}

fn build_sensors(config: &BarConfig) -> Vec<Box<dyn Sensor>> {
    let battery: Box<dyn Sensor> = Box::new(BatterySensor::new(&config.battery));
    vec![battery]
}

/// Print a single status line and exit.
pub fn run_once(source: &ConfigSource) -> Result<()> {
    let config = source.load()?;
    let format = config.bar.format;
    let mut bar = Bar::new(config);
    let mut writer = LineWriter::new(io::stdout().lock(), format);
    writer.write_line(bar.tick()?)?;
    Ok(())
}

pub fn run(source: ConfigSource, socket_override: Option<PathBuf>) -> Result<()> {
    let config = source.load()?;

    // Signal handling, installed before the socket is bound
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("Failed to set signal handler")?;
    }

    let socket_path = ipc::socket_path(socket_override.as_ref());
    let socket = ipc::create_listener(&socket_path)?;

    log::info!(
        "Starting powerbar with device={}, interval={}s, format={:?}",
        config.battery.device,
        config.bar.interval,
        config.bar.format
    );

    let format = config.bar.format;
    let mut driver = Driver::new(source, Bar::new(config), socket);
    let mut writer = LineWriter::new(io::stdout().lock(), format);

    // The socket file is removed when the driver drops, on every exit path
    driver.run_loop(&running, &mut writer)
}

struct Driver {
    source: ConfigSource,
    bar: Bar,
    socket: ipc::IpcSocket,
    next_poll: Instant,
    should_quit: bool,
}

impl Driver {
    fn new(source: ConfigSource, bar: Bar, socket: ipc::IpcSocket) -> Self {
        Self { source, bar, socket, next_poll: Instant::now(), should_quit: false }
    }

    fn run_loop<W: Write>(&mut self, running: &AtomicBool, writer: &mut LineWriter<W>) -> Result<()> {
        loop {
            if self.should_quit || !running.load(Ordering::SeqCst) {
                break;
            }

            if Instant::now() >= self.next_poll {
                writer.write_line(self.bar.tick()?)?;
                self.next_poll = Instant::now() + self.bar.interval();
            }

            // Wait for IPC traffic with a short timeout so the timer is checked
            {
                let mut fds = [nix::poll::PollFd::new(self.socket.listener.as_fd(), nix::poll::PollFlags::POLLIN)];
                let _ = nix::poll::poll(&mut fds, nix::poll::PollTimeout::from(100u16));
            }

            self.poll_ipc();
        }
        Ok(())
    }

    fn poll_ipc(&mut self) {
        loop {
            match self.socket.listener.accept() {
                Ok((stream, _)) => {
                    self.handle_ipc_connection(stream);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("IPC accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_ipc_connection(&mut self, mut stream: UnixStream) {
        if let Err(e) = stream.set_nonblocking(false) {
            log::warn!("IPC socket setup error: {}", e);
            return;
        }
        let cmd = match ipc::read_command(&stream) {
            Ok(cmd) => cmd,
            Err(e) => {
                log::warn!("IPC read error: {}", e);
                return;
            }
        };

        let response = self.handle_command(cmd);
        if let Err(e) = ipc::write_response(&mut stream, &response) {
            log::warn!("IPC write error: {}", e);
        }
    }

    fn handle_command(&mut self, cmd: ipc::IpcCommand) -> ipc::IpcResponse {
        match cmd {
            ipc::IpcCommand::GetState => ipc::IpcResponse::state(
                &self.source.path.display().to_string(),
                self.bar.last_poll().map(|t| t.to_rfc3339()),
                self.bar.blocks().to_vec(),
            ),
            ipc::IpcCommand::Refresh => {
                self.next_poll = Instant::now();
                ipc::IpcResponse::ok()
            }
            ipc::IpcCommand::ReloadConfig => match self.source.load() {
                Ok(config) => {
                    if config.bar.format != self.bar.config().bar.format {
                        log::warn!("Output format change takes effect on restart");
                    }
                    self.bar.reload(config);
                    self.next_poll = Instant::now();
                    log::info!("Reloaded config from {}", self.source.path.display());
                    ipc::IpcResponse::ok()
                }
                Err(e) => {
                    log::warn!("Config reload failed: {:#}", e);
                    ipc::IpcResponse::err(format!("{:#}", e))
                }
            },
            ipc::IpcCommand::Quit => {
                self.should_quit = true;
                ipc::IpcResponse::ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Tag;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_battery(root: &Path, device: &str, full: &str, now: &str, status: &str) {
        let dir = root.join(device);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("charge_full"), full).unwrap();
        fs::write(dir.join("charge_now"), now).unwrap();
        fs::write(dir.join("status"), status).unwrap();
    }

    fn config_for(root: &Path) -> BarConfig {
        let mut config = BarConfig::default();
        config.battery.power_supply_root = root.to_path_buf();
        config
    }

    fn source_in(td: &TempDir, params: Vec<String>) -> ConfigSource {
        ConfigSource { path: td.path().join("config.toml"), params, interval: None, format: None }
    }

    #[test]
    fn tick_renders_battery_block() {
        let td = TempDir::new().unwrap();
        write_battery(td.path(), "BAT0", "100", "5", "Discharging");
        let mut bar = Bar::new(config_for(td.path()));

        let blocks = bar.tick().unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "battery:BAT0");
        assert_eq!(blocks[0].full_text, "5%");
        assert_eq!(blocks[0].tags, vec![Tag::Critical, Tag::Discharging(10)]);
        assert!(bar.last_poll().is_some());
    }

    #[test]
    fn tick_without_device_is_ac() {
        let td = TempDir::new().unwrap();
        let mut bar = Bar::new(config_for(td.path()));

        let blocks = bar.tick().unwrap();

        assert_eq!(blocks[0].full_text, "ac");
        assert_eq!(blocks[0].tags, vec![Tag::Ac]);
    }

    #[test]
    fn unreadable_telemetry_still_renders() {
        let td = TempDir::new().unwrap();
        write_battery(td.path(), "BAT0", "100", "5", "Discharging");
        fs::remove_file(td.path().join("BAT0").join("charge_now")).unwrap();
        let mut config = config_for(td.path());
        config.bar.strict = true;
        let mut bar = Bar::new(config);

        let blocks = bar.tick().unwrap();

        assert_eq!(blocks[0].full_text, "n/a");
        assert_eq!(blocks[0].tags, vec![Tag::Critical, Tag::Unknown]);
    }

    #[test]
    fn malformed_telemetry_depends_on_strict() {
        let td = TempDir::new().unwrap();
        write_battery(td.path(), "BAT0", "garbage", "5", "Discharging");

        let mut lenient = Bar::new(config_for(td.path()));
        assert_eq!(lenient.tick().unwrap()[0].full_text, "n/a");

        let mut config = config_for(td.path());
        config.bar.strict = true;
        let mut strict = Bar::new(config);
        let err = strict.tick().unwrap_err();
        assert!(format!("{:#}", err).contains("battery:BAT0"));
    }

    #[test]
    fn reload_switches_device() {
        let td = TempDir::new().unwrap();
        write_battery(td.path(), "BAT1", "100", "98", "Charging");
        let mut bar = Bar::new(config_for(td.path()));
        assert_eq!(bar.tick().unwrap()[0].full_text, "ac");

        let mut config = config_for(td.path());
        config.battery.device = "BAT1".into();
        bar.reload(config);
        assert!(bar.blocks().is_empty());

        let blocks = bar.tick().unwrap();
        assert_eq!(blocks[0].full_text, "98%");
        assert_eq!(blocks[0].tags, vec![Tag::Charged]);
    }

    #[test]
    fn interval_is_at_least_one_second() {
        let mut config = BarConfig::default();
        config.bar.interval = 0;
        assert_eq!(Bar::new(config).interval(), Duration::from_secs(1));
    }

    #[test]
    fn source_applies_params_after_file() {
        let td = TempDir::new().unwrap();
        fs::write(td.path().join("config.toml"), "[battery]\ndevice = \"BAT1\"\n").unwrap();
        let mut source = source_in(&td, vec!["battery.warning=35".into()]);
        source.interval = Some(2);
        source.format = Some(OutputFormat::Plain);

        let config = source.load().unwrap();

        assert_eq!(config.battery.device, "BAT1");
        assert_eq!(config.battery.warning, 35.0);
        assert_eq!(config.bar.interval, 2);
        assert_eq!(config.bar.format, OutputFormat::Plain);
    }

    #[test]
    fn driver_commands() {
        let td = TempDir::new().unwrap();
        let sysfs = td.path().join("sys");
        write_battery(&sysfs, "BAT0", "100", "62", "Discharging");
        let source = source_in(&td, vec![format!("battery.power_supply_root={}", sysfs.display())]);
        let socket = ipc::create_listener(&td.path().join("powerbar.sock")).unwrap();
        let bar = Bar::new(source.load().unwrap());
        let mut driver = Driver::new(source, bar, socket);
        driver.bar.tick().unwrap();

        let state = driver.handle_command(ipc::IpcCommand::GetState);
        assert!(state.ok);
        assert!(state.last_poll.is_some());
        let blocks = state.blocks.unwrap();
        assert_eq!(blocks[0].tags, vec![Tag::Discharging(50)]);

        driver.next_poll = Instant::now() + Duration::from_secs(60);
        assert!(driver.handle_command(ipc::IpcCommand::Refresh).ok);
        assert!(driver.next_poll <= Instant::now());

        fs::write(td.path().join("config.toml"), "[battery]\ndevice = \"BAT9\"\n").unwrap();
        assert!(driver.handle_command(ipc::IpcCommand::ReloadConfig).ok);
        assert_eq!(driver.bar.config().battery.device, "BAT9");
        assert_eq!(driver.bar.config().battery.power_supply_root, sysfs);

        fs::write(td.path().join("config.toml"), "[bar]\ninterval = \"soon\"\n").unwrap();
        let failed = driver.handle_command(ipc::IpcCommand::ReloadConfig);
        assert!(!failed.ok);
        assert_eq!(driver.bar.config().battery.device, "BAT9");

        assert!(driver.handle_command(ipc::IpcCommand::Quit).ok);
        assert!(driver.should_quit);
    }

    #[test]
    fn run_loop_stops_when_signalled() {
        let td = TempDir::new().unwrap();
        let source = source_in(&td, vec![format!("battery.power_supply_root={}", td.path().display())]);
        let socket = ipc::create_listener(&td.path().join("powerbar.sock")).unwrap();
        let mut config = source.load().unwrap();
        config.bar.format = OutputFormat::Plain;
        let mut driver = Driver::new(source, Bar::new(config), socket);
        driver.should_quit = true;

        let running = AtomicBool::new(true);
        let mut writer = LineWriter::new(Vec::new(), OutputFormat::Plain);
        driver.run_loop(&running, &mut writer).unwrap();

        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn strict_failure_still_removes_socket() {
        let td = TempDir::new().unwrap();
        write_battery(td.path(), "BAT0", "garbage", "5", "Discharging");
        let sock = td.path().join("powerbar.sock");
        let source = source_in(&td, vec![
            format!("battery.power_supply_root={}", td.path().display()),
            "bar.strict=true".into(),
        ]);
        let socket = ipc::create_listener(&sock).unwrap();
        let mut driver = Driver::new(source.clone(), Bar::new(source.load().unwrap()), socket);

        let running = AtomicBool::new(true);
        let mut writer = LineWriter::new(Vec::new(), OutputFormat::Plain);
        assert!(driver.run_loop(&running, &mut writer).is_err());
        assert!(sock.exists());

        drop(driver);
        assert!(!sock.exists());
    }
}
