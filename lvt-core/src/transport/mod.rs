//! Cross-process transport.
//!
//! The caller owns a uniquely named inbound byte pipe. It starts accepting a
//! connection *before* triggering injection, then waits for the injected
//! module to connect, write one complete payload and close. Every blocking
//! step is bounded by [`TransportTimeouts`].
//!
//! The platform endpoint lives in [`pipe`]; the orchestration in
//! [`collect_payload`] only sees the [`PayloadListener`] trait.

#[cfg(windows)]
pub mod pipe;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::LvtError;

/// Size of one read burst.
pub const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Fully qualified local pipe name, e.g. `\\.\pipe\lvt_xaml_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName(String);

impl EndpointName {
    /// A fresh name for one acquisition.
    pub fn fresh(kind: &str) -> Self {
        Self(format!(
            r"\\.\pipe\lvt_{kind}_{}",
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn from_string(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounds on the two transport waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            read: Duration::from_secs(15),
        }
    }
}

/// Outcome of one bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBurst {
    Data(usize),
    /// The writer closed its end.
    Closed,
    TimedOut,
}

/// Server side of one acquisition's endpoint.
pub trait PayloadListener {
    fn endpoint(&self) -> &EndpointName;

    /// Start accepting a client without blocking.
    fn begin_accept(&mut self) -> Result<(), LvtError>;

    /// Wait for the pending accept. On timeout the accept is cancelled.
    fn wait_connected(&mut self, timeout: Duration) -> Result<(), LvtError>;

    fn read_burst(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadBurst, LvtError>;
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Read until the writer closes. A read timeout ends the message and keeps
/// whatever arrived before it.
pub fn read_until_close(
    listener: &mut dyn PayloadListener,
    timeout: Duration,
) -> Result<Vec<u8>, LvtError> {
    let mut data = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match listener.read_burst(&mut buf, timeout)? {
            ReadBurst::Data(n) => data.extend_from_slice(&buf[..n]),
            ReadBurst::Closed => break,
            ReadBurst::TimedOut => {
                log::warn!(
                    "read on {} timed out after {} bytes",
                    listener.endpoint(),
                    data.len()
                );
                break;
            }
        }
    }
    Ok(data)
}

/// Run one transport exchange.
///
/// `inject` receives the endpoint name once the accept is pending; whatever
/// it returns (typically a sidecar-file guard) is kept alive until the
/// exchange ends, on every path.
pub fn collect_payload<G, F>(
    listener: &mut dyn PayloadListener,
    timeouts: TransportTimeouts,
    inject: F,
) -> Result<Vec<u8>, LvtError>
where
    F: FnOnce(&EndpointName) -> Result<G, LvtError>,
{
    listener.begin_accept()?;
    let endpoint = listener.endpoint().clone();
    let _guard = inject(&endpoint)?;

    listener.wait_connected(timeouts.connect)?;
    log::debug!("instrumentation connected to {endpoint}");

    let data = read_until_close(listener, timeouts.read)?;
    log::debug!("received {} bytes from {endpoint}", data.len());
    if data.is_empty() {
        return Err(LvtError::Transport(format!("no data received on {endpoint}")));
    }
    Ok(data)
}

/// A file holding the endpoint name for code-loading injection. Deleted on
/// drop.
#[derive(Debug)]
pub struct SidecarFile {
    path: PathBuf,
}

impl SidecarFile {
    pub fn create(path: PathBuf, endpoint: &EndpointName) -> Result<Self, LvtError> {
        std::fs::write(&path, endpoint.as_str())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SidecarFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::debug!("could not remove {}: {err}", self.path.display());
        }
    }
}

/// Client side: open the endpoint, write the whole payload and close.
pub fn send_payload(endpoint: &EndpointName, payload: &[u8]) -> Result<(), LvtError> {
    let mut pipe = OpenOptions::new()
        .write(true)
        .open(endpoint.as_str())
        .map_err(|e| LvtError::Transport(format!("cannot open {endpoint}: {e}")))?;
    pipe.write_all(payload)
        .map_err(|e| LvtError::Transport(format!("write to {endpoint} failed: {e}")))?;
    pipe.flush()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Scripted listener: connects (or not) and replays read bursts.
    pub struct ScriptedListener {
        pub endpoint: EndpointName,
        pub connects: bool,
        pub bursts: VecDeque<Vec<u8>>,
        pub stall_at_end: bool,
        pub accepting: bool,
        pub log: Vec<&'static str>,
    }

    impl ScriptedListener {
        pub fn new(connects: bool, bursts: &[&[u8]]) -> Self {
            Self {
                endpoint: EndpointName::fresh("test"),
                connects,
                bursts: bursts.iter().map(|b| b.to_vec()).collect(),
                stall_at_end: false,
                accepting: false,
                log: Vec::new(),
            }
        }
    }

    impl PayloadListener for ScriptedListener {
        fn endpoint(&self) -> &EndpointName {
            &self.endpoint
        }

        fn begin_accept(&mut self) -> Result<(), LvtError> {
            self.accepting = true;
            self.log.push("accept");
            Ok(())
        }

        fn wait_connected(&mut self, timeout: Duration) -> Result<(), LvtError> {
            self.log.push("wait");
            if self.connects {
                Ok(())
            } else {
                std::thread::sleep(timeout);
                Err(LvtError::Timeout(format!("no client on {}", self.endpoint)))
            }
        }

        fn read_burst(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<ReadBurst, LvtError> {
            match self.bursts.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(ReadBurst::Data(chunk.len()))
                }
                None if self.stall_at_end => Ok(ReadBurst::TimedOut),
                None => Ok(ReadBurst::Closed),
            }
        }
    }

    #[test]
    fn test_endpoint_names_are_unique_and_scoped() {
        let a = EndpointName::fresh("xaml");
        let b = EndpointName::fresh("xaml");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(r"\\.\pipe\lvt_xaml_"));
        assert_eq!(a.as_str().len(), r"\\.\pipe\lvt_xaml_".len() + 32);
    }

    #[test]
    fn test_accept_is_pending_before_injection() {
        let mut listener = ScriptedListener::new(true, &[b"[{\"type\":", b"\"A\"}]"]);
        let data = collect_payload(&mut listener, TransportTimeouts::default(), |_| {
            Ok(())
        })
        .unwrap();
        assert_eq!(data, b"[{\"type\":\"A\"}]");
        assert_eq!(listener.log, ["accept", "wait"]);
    }

    #[test]
    fn test_injection_sees_pending_accept() {
        let mut listener = ScriptedListener::new(true, &[b"x"]);
        let endpoint = listener.endpoint.clone();
        let mut seen = None;
        collect_payload(&mut listener, TransportTimeouts::default(), |name| {
            seen = Some(name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, Some(endpoint));
    }

    #[test]
    fn test_connect_timeout_is_bounded() {
        let mut listener = ScriptedListener::new(false, &[]);
        let timeouts = TransportTimeouts {
            connect: Duration::from_millis(50),
            read: Duration::from_millis(50),
        };
        let started = Instant::now();
        let err = collect_payload(&mut listener, timeouts, |_| Ok(())).unwrap_err();
        assert!(matches!(err, LvtError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_empty_stream_is_transport_error() {
        let mut listener = ScriptedListener::new(true, &[]);
        let err = collect_payload(&mut listener, TransportTimeouts::default(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, LvtError::Transport(_)));
    }

    #[test]
    fn test_read_timeout_keeps_partial_data() {
        let mut listener = ScriptedListener::new(true, &[b"abc"]);
        listener.stall_at_end = true;
        let data = read_until_close(&mut listener, Duration::from_millis(1)).unwrap();
        assert_eq!(data, b"abc");
    }

    #[test]
    fn test_injection_failure_skips_wait() {
        let mut listener = ScriptedListener::new(true, &[b"x"]);
        let err = collect_payload::<(), _>(&mut listener, TransportTimeouts::default(), |_| {
            Err(LvtError::Injection("exit code 0".into()))
        })
        .unwrap_err();
        assert!(matches!(err, LvtError::Injection(_)));
        assert_eq!(listener.log, ["accept"]);
    }

    #[test]
    fn test_sidecar_removed_on_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lvt_wpf_pipe_42.txt");
        let endpoint = EndpointName::fresh("wpf");

        let mut listener = ScriptedListener::new(false, &[]);
        let timeouts = TransportTimeouts {
            connect: Duration::from_millis(1),
            read: Duration::from_millis(1),
        };
        let result = collect_payload(&mut listener, timeouts, |_| {
            let sidecar = SidecarFile::create(path.clone(), &endpoint)?;
            assert_eq!(std::fs::read_to_string(sidecar.path()).unwrap(), endpoint.as_str());
            Ok(sidecar)
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
