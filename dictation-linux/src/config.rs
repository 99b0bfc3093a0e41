//! Load config from file and environment.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration. File: ~/.config/dictation/config.toml or /etc/dictation/config.toml.
/// Env overrides: DICTATION_PORT, DICTATION_PEER, DICTATION_RECORDINGS_DIR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host listen port (default 45700).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address the companion connects to (default 127.0.0.1:45700).
    #[serde(default = "default_peer")]
    pub peer: SocketAddr,
    /// Directory holding this endpoint's recordings.
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
}

fn default_port() -> u16 {
    45700
}
fn default_peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], default_port()))
}
fn default_recordings_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h).join(".local/share/dictation/recordings"),
        None => PathBuf::from("recordings"),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            peer: default_peer(),
            recordings_dir: default_recordings_dir(),
        }
    }
}

impl Config {
    /// Staging directory for incoming file transfers. Hidden, so never listed as a recording.
    pub fn inbox_dir(&self) -> PathBuf {
        self.recordings_dir.join(".inbox")
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("DICTATION_PORT") {
        match s.parse::<u16>() {
            Ok(p) => c.port = p,
            Err(_) => tracing::warn!(value = %s, "ignoring invalid DICTATION_PORT"),
        }
    }
    if let Some(s) = var("DICTATION_PEER") {
        match s.parse::<SocketAddr>() {
            Ok(a) => c.peer = a,
            Err(_) => tracing::warn!(value = %s, "ignoring invalid DICTATION_PEER"),
        }
    }
    if let Some(s) = var("DICTATION_RECORDINGS_DIR") {
        if !s.is_empty() {
            c.recordings_dir = PathBuf::from(s);
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/dictation/config.toml"));
    }
    out.push(PathBuf::from("/etc/dictation/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => tracing::warn!(path = %p.display(), error = %e, "invalid config file"),
                },
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot read config file"),
            }
            break;
        }
    }
    None
}
