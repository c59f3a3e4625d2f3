//! # Connection Configuration
//!
//! A flat set of named parameters, in the shape a caller would write as a
//! JSON object: `{ "ashost": "10.0.0.1", "sysnr": "00", "client": "100", ... }`.
//! Names are case-insensitive and stored lowercase; numeric values are kept as
//! their decimal text. Unrecognized names are accepted and ignored.
//!
//! A `dest` parameter names an entry of the local `sapnwrfc.ini` file. The
//! entry's parameters are merged underneath the explicit ones.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::error::Result;

/// Parameter names the library understands.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "ashost", "sysnr", "sysid", "client", "user", "passwd", "saprouter", "mshost", "msserv", "r3name",
    "group", "lang", "dest", "timeout",
];

/// Parameters that stay on the client and are never sent in a logon.
const LOCAL_KEYS: &[&str] = &["dest", "timeout"];

/// The configuration file consulted for `dest` entries.
pub const INI_FILE_NAME: &str = "sapnwrfc.ini";

pub const DEFAULT_ROUTER_PORT: u16 = 3299;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ConnectionConfig {
    #[serde(deserialize_with = "scalar_params")]
    params: BTreeMap<String, String>,
}

fn scalar_params<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v.into_text())).collect())
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ConnectionConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = ConnectionConfig::new();
        for (k, v) in iter {
            config.set(k.as_ref(), v);
        }
        config
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.params {
            if k == "passwd" {
                map.entry(k, &"********");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of parameters.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_ascii_lowercase(), value.into());
    }

    /// Looks up a parameter; blank values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(&key.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn destination(&self) -> Option<&str> {
        self.get("dest")
    }

    /// Fills every parameter this config lacks from `base`.
    pub fn merged_over(&self, base: &ConnectionConfig) -> ConnectionConfig {
        let mut merged = base.clone();
        for (k, v) in &self.params {
            merged.params.insert(k.clone(), v.clone());
        }
        merged
    }

    /// The client-side exchange timeout, if one is configured.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        let Some(raw) = self.get("timeout") else {
            return Ok(None);
        };
        match raw.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
            _ => Err(Error::invalid_parameter(format!("Parameter TIMEOUT has invalid value '{raw}'"))),
        }
    }

    /// The recognized parameters sent with a logon, uppercase as the remote
    /// system expects them.
    pub fn logon_params(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|(k, _)| RECOGNIZED_KEYS.contains(&k.as_str()) && !LOCAL_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.to_ascii_uppercase(), v.clone()))
            .collect()
    }

    /// Checks that the parameters identify a system and a logon. Runs before
    /// any connect attempt.
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;
        self.timeout()?;
        for key in ["client", "user"] {
            if self.get(key).is_none() {
                return Err(missing(key));
            }
        }
        Ok(())
    }

    /// Where the first network hop goes and which system sits behind it.
    pub fn endpoint(&self) -> Result<Endpoint> {
        let router = self.get("saprouter").map(Router::parse).transpose()?;

        let server = if let Some(host) = self.get("ashost") {
            let sysnr = self.get("sysnr").ok_or_else(|| missing("sysnr"))?;
            Server::Application { host: host.to_string(), sysnr: system_number(sysnr)? }
        } else if let Some(host) = self.get("mshost") {
            let system = self
                .get("sysid")
                .or_else(|| self.get("r3name"))
                .ok_or_else(|| Error::invalid_parameter("Parameter SYSID or R3NAME is missing"))?;
            let group = self.get("group").ok_or_else(|| missing("group"))?;
            let sysnr = self.get("sysnr").map(system_number).transpose()?;
            Server::Message {
                host: host.to_string(),
                service: self.get("msserv").map(str::to_string),
                sysnr,
                system: system.to_string(),
                group: group.to_string(),
            }
        } else {
            return Err(Error::invalid_parameter("Parameter ASHOST or MSHOST is missing"));
        };

        Ok(Endpoint { router, server })
    }
}

fn missing(key: &str) -> Error {
    Error::invalid_parameter(format!("Parameter {} is missing", key.to_ascii_uppercase()))
}

fn system_number(raw: &str) -> Result<u8> {
    match raw.parse::<u8>() {
        Ok(n) if n < 100 => Ok(n),
        _ => Err(Error::invalid_parameter(format!("Parameter SYSNR has invalid value '{raw}'"))),
    }
}

// ============================================================================
//  ENDPOINTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub router: Option<Router>,
    pub server: Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Server {
    Application { host: String, sysnr: u8 },
    Message { host: String, service: Option<String>, sysnr: Option<u8>, system: String, group: String },
}

/// The first hop of a router string `/H/host/S/port/H/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    pub host: String,
    pub port: u16,
}

impl Router {
    pub fn parse(route: &str) -> Result<Self> {
        let invalid = || Error::invalid_parameter(format!("Parameter SAPROUTER has invalid value '{route}'"));

        let mut parts = route.split('/').filter(|p| !p.is_empty());
        let mut host = None;
        let mut port = None;
        while let Some(marker) = parts.next() {
            let value = parts.next().ok_or_else(invalid)?;
            match marker.to_ascii_uppercase().as_str() {
                "H" if host.is_none() => host = Some(value.to_string()),
                "H" => break,
                "S" => port = Some(value.parse::<u16>().map_err(|_| invalid())?),
                "W" | "P" => {},
                _ => return Err(invalid()),
            }
        }

        Ok(Router {
            host: host.ok_or_else(invalid)?,
            port: port.unwrap_or(DEFAULT_ROUTER_PORT),
        })
    }
}

impl Endpoint {
    /// The `(host, port)` the first TCP connection goes to.
    pub fn first_hop(&self) -> Result<(String, u16)> {
        if let Some(router) = &self.router {
            return Ok((router.host.clone(), router.port));
        }
        match &self.server {
            Server::Application { host, sysnr } => Ok((host.clone(), 3300 + *sysnr as u16)),
            Server::Message { host, service, sysnr, .. } => {
                let port = match service {
                    Some(s) => s.parse::<u16>().map_err(|_| {
                        Error::invalid_parameter(format!("Parameter MSSERV has invalid value '{s}'"))
                    })?,
                    None => 3600 + sysnr.unwrap_or(0) as u16,
                };
                Ok((host.clone(), port))
            },
        }
    }
}

// ============================================================================
//  SAPNWRFC.INI
// ============================================================================

/// The parsed contents of a `sapnwrfc.ini` file.
///
/// ```text
/// DEST=QAS
/// ASHOST=qas.example.com
/// SYSNR=00
/// ```
///
/// Each `DEST=` line opens an entry; `KEY=VALUE` lines belong to the last
/// opened entry. Lines starting with `#`, `;`, `*` or `/*` are comments.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    destinations: Vec<(String, ConnectionConfig)>,
}

impl IniFile {
    pub fn parse(text: &str) -> Self {
        let mut destinations: Vec<(String, ConnectionConfig)> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(['#', ';', '*']) || line.starts_with("/*") {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.eq_ignore_ascii_case("dest") {
                destinations.push((value.to_string(), ConnectionConfig::new()));
            } else if let Some((_, config)) = destinations.last_mut() {
                config.set(key, value);
            }
        }
        Self { destinations }
    }

    pub fn get(&self, dest: &str) -> Option<&ConnectionConfig> {
        self.destinations.iter().find(|(name, _)| name == dest).map(|(_, c)| c)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.destinations.iter().map(|(name, _)| name.as_str())
    }
}
