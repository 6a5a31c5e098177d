// Active socket listing from /proc/net, with owner pid and process name.

use super::linux::{self, ProcSocket};
use super::{ConnectionSource, RawConnection, SamplerError};
use crate::models::Protocol;
use std::io::ErrorKind;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::instrument;

const TABLES: [(&str, Protocol); 4] = [
    ("/proc/net/tcp", Protocol::Tcp),
    ("/proc/net/tcp6", Protocol::Tcp),
    ("/proc/net/udp", Protocol::Udp),
    ("/proc/net/udp6", Protocol::Udp),
];

pub struct ProcNetConnections {
    sys: System,
}

impl Default for ProcNetConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcNetConnections {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    fn read_tables(&self) -> Result<Vec<(Protocol, ProcSocket)>, SamplerError> {
        let mut sockets = Vec::new();
        for (path, protocol) in TABLES {
            match std::fs::read_to_string(path) {
                Ok(content) => sockets.extend(
                    linux::parse_proc_net(&content)
                        .into_iter()
                        .map(|s| (protocol, s)),
                ),
                // tcp6/udp6 are absent when IPv6 is disabled
                Err(e) if e.kind() == ErrorKind::NotFound && path.ends_with('6') => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(SamplerError::Unavailable(format!("{} missing", path)));
                }
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    return Err(SamplerError::PermissionDenied(path.to_string()));
                }
                Err(e) => return Err(SamplerError::Io(e)),
            }
        }
        Ok(sockets)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.sys
            .process(Pid::from_u32(pid))
            .map(|p| p.name().to_string_lossy().into_owned())
    }
}

impl ConnectionSource for ProcNetConnections {
    #[instrument(skip(self), fields(sampler = "connections", operation = "list"))]
    fn list(&mut self) -> Result<Vec<RawConnection>, SamplerError> {
        if !cfg!(target_os = "linux") {
            return Err(SamplerError::Unavailable(
                "connection listing requires /proc (Linux)".into(),
            ));
        }

        let sockets = self.read_tables()?;
        let owners = linux::socket_owners();

        let mut pids: Vec<Pid> = owners.values().copied().map(Pid::from_u32).collect();
        pids.sort_unstable();
        pids.dedup();
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&pids), true);

        Ok(sockets
            .into_iter()
            .map(|(protocol, socket)| {
                let pid = owners.get(&socket.inode).copied();
                let state = match protocol {
                    Protocol::Tcp => linux::tcp_state_name(socket.state_code),
                    Protocol::Udp => "NONE",
                };
                RawConnection {
                    protocol,
                    local: socket.local,
                    remote: socket.remote,
                    state: state.to_string(),
                    pid,
                    process_name: pid.and_then(|p| self.process_name(p)),
                }
            })
            .collect())
    }
}
