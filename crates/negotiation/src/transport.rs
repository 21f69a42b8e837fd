use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;

/// Directory of the sockets created by [`Transport::ipc`].
pub const IPC_SOCKET_DIR: &str = "/tmp/switchyard";

/// Where a ZeroMQ socket binds or connects.
///
/// Parsed from and printed as a ZeroMQ endpoint, `ipc://<path>` or
/// `tcp://<host>:<port>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket at the given path, for peers on one host.
    Ipc(PathBuf),

    Tcp { host: String, port: u16 },
}

impl Transport {
    /// The socket `name` under [`IPC_SOCKET_DIR`].
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(Path::new(IPC_SOCKET_DIR).join(format!("{name}.sock")))
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{}", path.display()),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Create the socket directory of an IPC transport. No-op for TCP.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Some(parent) = self.ipc_path().and_then(Path::parent) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Remove a socket file left behind by a previous run. No-op for TCP.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        if let Some(path) = self.ipc_path() {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale IPC socket"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn ipc_path(&self) -> Option<&Path> {
        match self {
            Self::Ipc(path) => Some(path),
            Self::Tcp { .. } => None,
        }
    }
}

impl FromStr for Transport {
    type Err = NegotiationError;

    fn from_str(endpoint: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| NegotiationError::Transport(format!("endpoint '{endpoint}' {reason}"));

        if let Some(path) = endpoint.strip_prefix("ipc://") {
            let path = Path::new(path);
            if path.file_name().is_none() {
                return Err(invalid("has no socket file"));
            }
            return Ok(Self::Ipc(path.to_path_buf()));
        }

        if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("has no port"))?;
            if host.is_empty() {
                return Err(invalid("has no host"));
            }
            let port = port.parse::<u16>().map_err(|e| invalid(&format!("has a bad port: {e}")))?;
            return Ok(Self::tcp(host, port));
        }

        Err(invalid("is not ipc:// or tcp://"))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(Transport::ipc("negotiation").endpoint(), "ipc:///tmp/switchyard/negotiation.sock");
        assert_eq!(Transport::tcp("127.0.0.1", 5555).to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parse_keeps_the_ipc_path() {
        let t: Transport = "ipc:///var/run/orders.sock".parse().unwrap();
        assert_eq!(t, Transport::Ipc(PathBuf::from("/var/run/orders.sock")));
        assert_eq!(t.to_string(), "ipc:///var/run/orders.sock");

        let named: Transport = "ipc:///tmp/switchyard/orders.sock".parse().unwrap();
        assert_eq!(named, Transport::ipc("orders"));
    }

    #[test]
    fn parse_tcp() {
        let t: Transport = "tcp://10.0.0.1:5600".parse().unwrap();
        assert_eq!(t, Transport::tcp("10.0.0.1", 5600));
    }

    #[test]
    fn parse_rejects_bad_endpoints() {
        for endpoint in ["tcp://10.0.0.1", "tcp://10.0.0.1:http", "tcp://:5600", "ipc://", "udp://x:1"] {
            let err = endpoint.parse::<Transport>().unwrap_err();
            assert!(matches!(err, NegotiationError::Transport(_)), "{endpoint}");
        }
    }

    #[test]
    fn ipc_dir_is_created_and_stale_socket_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("peer.sock");
        let t = Transport::Ipc(path.clone());

        t.ensure_ipc_dir().unwrap();
        assert!(path.parent().unwrap().is_dir());

        std::fs::write(&path, b"").unwrap();
        t.remove_stale_socket().unwrap();
        assert!(!path.exists());
        // Nothing left to remove.
        t.remove_stale_socket().unwrap();
        Transport::tcp("localhost", 1).remove_stale_socket().unwrap();
    }
}
