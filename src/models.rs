/// Address family of a socket as reported by the kernel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Family {
    V4,
    V6,
}

/// Socket type: connection-oriented stream or connectionless datagram.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

/// The four reportable protocols. Constructed only through [`Protocol::from_parts`],
/// so the (family, kind) table is closed and exhaustively matched.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl Protocol {
    pub fn from_parts(family: Family, kind: SocketKind) -> Protocol {
        match (family, kind) {
            (Family::V4, SocketKind::Stream) => Protocol::Tcp,
            (Family::V6, SocketKind::Stream) => Protocol::Tcp6,
            (Family::V4, SocketKind::Datagram) => Protocol::Udp,
            (Family::V6, SocketKind::Datagram) => Protocol::Udp6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp6 => "udp6",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Connection state of an enumerated socket.
///
/// `NoState` is the sentinel for datagram sockets, which carry no connection
/// state. `Other` keeps the kernel's state name so a dropped socket is still
/// diagnosable, but such rows never reach the report.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SocketState {
    Listen,
    NoState,
    Other(&'static str),
}

impl SocketState {
    /// Only listening and connectionless-bound sockets are reportable.
    pub fn is_reportable(&self) -> bool {
        matches!(self, SocketState::Listen | SocketState::NoState)
    }
}

/// One socket as read from the kernel's socket tables.
///
/// `owner_pid == None` means the kernel itself owns the socket: either the
/// table row carried inode 0, or no visible process holds an fd for it.
#[derive(Debug, Clone)]
pub struct SocketRecord {
    pub protocol: Protocol,
    pub local_address: String,
    pub local_port: u16,
    pub state: SocketState,
    pub owner_pid: Option<i32>,
}

/// Snapshot of one visible process, taken fresh on every run.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: i32,
    pub name: String,
    pub cmdline: Vec<String>,
}

/// One rendered line of the final report.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    pub pid: Option<i32>,
    pub owner: String,
}
