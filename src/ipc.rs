use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use crate::output::Block;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum IpcCommand {
    GetState,
    Refresh,
    ReloadConfig,
    Quit,
}

#[derive(Debug, Serialize)]
pub struct IpcResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    // State fields (only for get-state)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
}

impl IpcResponse {
    pub fn ok() -> Self {
        Self { ok: true, error: None, config_path: None, last_poll: None, blocks: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { ok: false, error: Some(msg.into()), config_path: None, last_poll: None, blocks: None }
    }

    pub fn state(config_path: &str, last_poll: Option<String>, blocks: Vec<Block>) -> Self {
        Self {
            ok: true,
            error: None,
            config_path: Some(config_path.into()),
            last_poll,
            blocks: Some(blocks),
        }
    }
}

pub fn socket_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(p) = override_path {
        return p.clone();
    }
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(dir).join("powerbar.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/powerbar-{}.sock", uid))
    }
}

/// Bound control socket. The socket file is removed when this is dropped.
pub struct IpcSocket {
    pub listener: UnixListener,
    path: PathBuf,
}

impl Drop for IpcSocket {
    fn drop(&mut self) {
        cleanup_socket(&self.path);
    }
}

pub fn create_listener(path: &PathBuf) -> Result<IpcSocket> {
    // Remove stale socket
    if path.exists() {
        if UnixStream::connect(path).is_ok() {
            anyhow::bail!("Another powerbar instance is already running (socket {} is active)", path.display());
        }
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    log::info!("IPC listening on {}", path.display());
    Ok(IpcSocket { listener, path: path.clone() })
}

fn cleanup_socket(path: &PathBuf) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
        log::info!("Removed socket {}", path.display());
    }
}

pub fn read_command(stream: &UnixStream) -> Result<IpcCommand> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let cmd: IpcCommand = serde_json::from_str(line.trim())?;
    Ok(cmd)
}

pub fn write_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    stream.write_all(json.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
