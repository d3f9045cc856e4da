use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use super::sim_config::{CfgCallState, CfgServer, SharedConfig, SimConfig};

/// Build `SharedConfig` from a TOML configuration string
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    let expected_config_version = "0.1";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if let Some(ref server) = root.server {
        if !server.extra.is_empty() {
            return Err(format!("Unrecognized fields in server: {:?}", sorted_keys(&server.extra)).into());
        }
    }
    if let Some(ref cs) = root.call_state {
        if !cs.extra.is_empty() {
            return Err(format!("Unrecognized fields in call_state: {:?}", sorted_keys(&cs.extra)).into());
        }
    }

    let mut cfg = SimConfig {
        debug_log: root.debug_log,
        server: CfgServer::default(),
        call_state: CfgCallState::default(),
        responses: BTreeMap::new(),
    };

    if let Some(server) = root.server {
        apply_server_patch(&mut cfg.server, server);
    }
    if let Some(cs) = root.call_state {
        apply_call_state_patch(&mut cfg.call_state, cs);
    }
    if let Some(responses) = root.responses {
        cfg.responses.extend(responses);
    }

    Ok(SharedConfig::from_config(cfg)?)
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    from_reader(f)
}

fn apply_server_patch(dst: &mut CfgServer, src: ServerDto) {
    if let Some(v) = src.host {
        dst.host = v;
    }
    if let Some(v) = src.port {
        dst.port = v;
    }
}

fn apply_call_state_patch(dst: &mut CfgCallState, src: CallStateDto) {
    if let Some(v) = src.auto_progress {
        dst.auto_progress = v;
    }
    if let Some(v) = src.connecting_pause_ms {
        dst.connecting_pause_ms = v;
    }
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&str> {
    let mut v: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,

    #[serde(default)]
    server: Option<ServerDto>,

    #[serde(default)]
    call_state: Option<CallStateDto>,

    #[serde(default)]
    responses: Option<HashMap<String, String>>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct ServerDto {
    host: Option<String>,
    port: Option<u16>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct CallStateDto {
    auto_progress: Option<bool>,
    connecting_pause_ms: Option<u64>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}
