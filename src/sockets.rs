use crate::models::{Family, Protocol, SocketKind, SocketRecord, SocketState};
use anyhow::Context;
use procfs::net::{TcpNetEntry, TcpState, UdpNetEntry};
use procfs::process::FDTarget;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::warn;

/// Enumerates every socket the kernel currently knows about across
/// tcp/udp x v4/v6, unfiltered. State filtering is the reconciler's job so
/// the boundary stays explicit and testable.
///
/// The IPv4 tables are required reading; a host without an IPv6 stack has no
/// `/proc/net/tcp6`, so the v6 tables degrade to empty instead of failing the
/// run.
pub fn collect_sockets() -> anyhow::Result<Vec<SocketRecord>> {
    let owners = socket_owners();
    let mut records = Vec::new();

    let tcp = procfs::net::tcp().context("reading /proc/net/tcp")?;
    for entry in tcp {
        records.push(tcp_record(&entry, Family::V4, &owners));
    }
    match procfs::net::tcp6() {
        Ok(entries) => {
            for entry in entries {
                records.push(tcp_record(&entry, Family::V6, &owners));
            }
        }
        Err(err) => warn!(?err, "tcp6 socket table unavailable, skipping"),
    }

    let udp = procfs::net::udp().context("reading /proc/net/udp")?;
    for entry in udp {
        records.push(udp_record(&entry, Family::V4, &owners));
    }
    match procfs::net::udp6() {
        Ok(entries) => {
            for entry in entries {
                records.push(udp_record(&entry, Family::V6, &owners));
            }
        }
        Err(err) => warn!(?err, "udp6 socket table unavailable, skipping"),
    }

    Ok(records)
}

fn tcp_record(entry: &TcpNetEntry, family: Family, owners: &HashMap<u64, i32>) -> SocketRecord {
    SocketRecord {
        protocol: Protocol::from_parts(family, SocketKind::Stream),
        local_address: address_text(&entry.local_address),
        local_port: entry.local_address.port(),
        state: tcp_socket_state(&entry.state),
        owner_pid: owner_for_inode(entry.inode, owners),
    }
}

fn udp_record(entry: &UdpNetEntry, family: Family, owners: &HashMap<u64, i32>) -> SocketRecord {
    SocketRecord {
        protocol: Protocol::from_parts(family, SocketKind::Datagram),
        local_address: address_text(&entry.local_address),
        local_port: entry.local_address.port(),
        // Datagram sockets carry no connection state.
        state: SocketState::NoState,
        owner_pid: owner_for_inode(entry.inode, owners),
    }
}

fn address_text(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

fn owner_for_inode(inode: u64, owners: &HashMap<u64, i32>) -> Option<i32> {
    if inode == 0 {
        // The kernel reports inode 0 for sockets it owns itself.
        return None;
    }
    owners.get(&inode).copied()
}

fn tcp_socket_state(state: &TcpState) -> SocketState {
    match state {
        TcpState::Listen => SocketState::Listen,
        other => SocketState::Other(tcp_state_name(other)),
    }
}

fn tcp_state_name(state: &TcpState) -> &'static str {
    match state {
        TcpState::Established => "ESTABLISHED",
        TcpState::SynSent => "SYN_SENT",
        TcpState::SynRecv => "SYN_RECV",
        TcpState::FinWait1 => "FIN_WAIT1",
        TcpState::FinWait2 => "FIN_WAIT2",
        TcpState::TimeWait => "TIME_WAIT",
        TcpState::Close => "CLOSE",
        TcpState::CloseWait => "CLOSE_WAIT",
        TcpState::LastAck => "LAST_ACK",
        TcpState::Listen => "LISTEN",
        TcpState::Closing => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Maps socket inodes to the pid holding an fd for them. A socket may be
/// shared by several processes; the first visible holder wins. Processes we
/// cannot inspect (exited mid-walk, other users' fds without privilege) are
/// skipped, never fatal.
fn socket_owners() -> HashMap<u64, i32> {
    let mut owners: HashMap<u64, i32> = HashMap::new();
    let all = match procfs::process::all_processes() {
        Ok(all) => all,
        Err(err) => {
            warn!(?err, "unable to walk /proc for socket owners");
            return owners;
        }
    };

    for process in all {
        let process = match process {
            Ok(process) => process,
            Err(_) => continue,
        };
        let pid = process.pid();
        let fds = match process.fd() {
            Ok(fds) => fds,
            Err(_) => continue,
        };

        for fd in fds.flatten() {
            if let FDTarget::Socket(inode) = fd.target {
                owners.entry(inode).or_insert(pid);
            }
        }
    }

    owners
}
