// Linux-specific helpers: /proc/net socket tables and /proc/<pid>/fd ownership.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// One row of /proc/net/{tcp,tcp6,udp,udp6}.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ProcSocket {
    pub(super) local: SocketAddr,
    pub(super) remote: Option<SocketAddr>,
    pub(super) state_code: u8,
    pub(super) inode: u64,
}

/// Parse a /proc/net socket table. The header and malformed rows are skipped.
pub(super) fn parse_proc_net(content: &str) -> Vec<ProcSocket> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let local = parse_endpoint(fields[1])?;
            let remote = parse_endpoint(fields[2])
                .filter(|addr| !(addr.ip().is_unspecified() && addr.port() == 0));
            let state_code = u8::from_str_radix(fields[3], 16).ok()?;
            let inode = fields[9].parse::<u64>().ok()?;
            Some(ProcSocket {
                local,
                remote,
                state_code,
                inode,
            })
        })
        .collect()
}

/// `0100007F:0050` (IPv4) or 32 hex digits + port (IPv6). Words are in host byte order.
pub(super) fn parse_endpoint(s: &str) -> Option<SocketAddr> {
    let (ip_hex, port_hex) = s.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let ip = match ip_hex.len() {
        8 => {
            let word = u32::from_str_radix(ip_hex, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
        }
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
                let word = u32::from_str_radix(ip_hex.get(i * 8..i * 8 + 8)?, 16).ok()?;
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            let v6 = Ipv6Addr::from(octets);
            // Report v4-mapped sockets as plain IPv4.
            match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            }
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// Kernel TCP state names (include/net/tcp_states.h).
pub(super) fn tcp_state_name(code: u8) -> &'static str {
    match code {
        0x01 => "ESTABLISHED",
        0x02 => "SYN_SENT",
        0x03 => "SYN_RECV",
        0x04 => "FIN_WAIT1",
        0x05 => "FIN_WAIT2",
        0x06 => "TIME_WAIT",
        0x07 => "CLOSE",
        0x08 => "CLOSE_WAIT",
        0x09 => "LAST_ACK",
        0x0A => "LISTEN",
        0x0B => "CLOSING",
        0x0C => "NEW_SYN_RECV",
        _ => "UNKNOWN",
    }
}

/// Extract the inode from a `socket:[12345]` fd link target.
pub(super) fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Map socket inode -> owning pid by walking /proc/<pid>/fd.
/// Processes whose fd table is unreadable (other users without privilege) are skipped.
pub(super) fn socket_owners() -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    #[cfg(target_os = "linux")]
    {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return owners;
        };
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            for fd in fds.flatten() {
                if let Ok(target) = std::fs::read_link(fd.path())
                    && let Some(inode) = target.to_str().and_then(socket_inode)
                {
                    owners.entry(inode).or_insert(pid);
                }
            }
        }
    }
    owners
}
