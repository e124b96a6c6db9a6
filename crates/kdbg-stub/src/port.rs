//! Debug port specifications.
//!
//! A port is written as `"<kind>: <parameter>"`, e.g. `"pipe: /tmp/cosmos.sock"`,
//! `"serial: /dev/ttyS1"` or `"tcp: 127.0.0.1:4444"`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::StubError;

/// Where the debug stub can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// A local pipe (Unix domain socket) hosted by the emulator.
    Pipe(PathBuf),
    /// A serial device.
    Serial(PathBuf),
    /// A TCP bridge, `host:port`.
    Tcp(String),
}

impl FromStr for PortSpec {
    type Err = StubError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| StubError::InvalidPort {
            spec: spec.to_string(),
            reason,
        };

        let mut parts = spec.split_whitespace();
        let (Some(kind), Some(param)) = (parts.next(), parts.next()) else {
            return Err(invalid("expected '<kind>: <parameter>'".into()));
        };
        if parts.next().is_some() {
            return Err(invalid("unexpected trailing text".into()));
        }

        match kind.to_ascii_lowercase().as_str() {
            "pipe:" => Ok(PortSpec::Pipe(PathBuf::from(param))),
            "serial:" => Ok(PortSpec::Serial(PathBuf::from(param))),
            "tcp:" => {
                let valid = param
                    .rsplit_once(':')
                    .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
                if valid {
                    Ok(PortSpec::Tcp(param.to_string()))
                } else {
                    Err(invalid(format!("tcp address '{param}' is not host:port")))
                }
            }
            other => Err(invalid(format!("unknown port type '{other}'"))),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Pipe(path) => write!(f, "pipe: {}", path.display()),
            PortSpec::Serial(path) => write!(f, "serial: {}", path.display()),
            PortSpec::Tcp(addr) => write!(f, "tcp: {addr}"),
        }
    }
}
