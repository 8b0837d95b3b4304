use crate::models::{ReportRow, SocketRecord};
use crate::rpc::RpcResolver;
use std::collections::HashMap;
use std::fmt::Write;

const PID_PLACEHOLDER: &str = "-";
const UNKNOWN_OWNER: &str = "?";

/// Joins the socket table against the process directory, consulting the RPC
/// resolver for kernel-owned sockets. Non-reportable states are dropped here,
/// not in the enumerator. Rows come back sorted by owner label so a process's
/// sockets group together; ties keep enumeration order.
pub fn reconcile(
    sockets: &[SocketRecord],
    directory: &HashMap<i32, String>,
    rpc: &mut RpcResolver,
) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = sockets
        .iter()
        .filter(|socket| socket.state.is_reportable())
        .map(|socket| {
            let owner = match socket.owner_pid {
                // The process may have exited between the socket and process
                // snapshots; degrade to "?" rather than fail.
                Some(pid) => directory
                    .get(&pid)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_OWNER.to_string()),
                None => rpc.resolve(
                    socket.protocol,
                    &format!("{}:{}", socket.local_address, socket.local_port),
                ),
            };
            ReportRow {
                protocol: socket.protocol,
                address: socket.local_address.clone(),
                port: socket.local_port,
                pid: socket.owner_pid,
                owner,
            }
        })
        .collect();

    rows.sort_by(|a, b| a.owner.cmp(&b.owner));
    rows
}

/// Renders the fixed-width report. The column layout is the program's only
/// compatibility contract; the header prints even for an empty row set.
pub fn render(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:>40}:{:<10} {:<6} {}",
        "Proto", "Local address", "Port", "PID", "Program name"
    );
    for row in rows {
        let pid = match row.pid {
            Some(pid) => pid.to_string(),
            None => PID_PLACEHOLDER.to_string(),
        };
        let _ = writeln!(
            out,
            "{:<5} {:>40}:{:<10} {:<6} {}",
            row.protocol.label(),
            row.address,
            row.port,
            pid,
            row.owner
        );
    }
    out
}

pub fn print_report(rows: &[ReportRow]) {
    print!("{}", render(rows));
}

#[cfg(test)]
mod tests {
    use super::{reconcile, render};
    use crate::models::{Protocol, SocketRecord, SocketState};
    use crate::rpc::{RegistryProbe, RpcResolver};
    use std::collections::HashMap;

    struct FixedProbe(Option<&'static str>);

    impl RegistryProbe for FixedProbe {
        fn query(&mut self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn resolver(output: Option<&'static str>) -> RpcResolver {
        RpcResolver::with_probe(Box::new(FixedProbe(output)))
    }

    fn socket(
        protocol: Protocol,
        address: &str,
        port: u16,
        state: SocketState,
        pid: Option<i32>,
    ) -> SocketRecord {
        SocketRecord {
            protocol,
            local_address: address.to_string(),
            local_port: port,
            state,
            owner_pid: pid,
        }
    }

    #[test]
    fn established_sockets_never_reach_the_report() {
        let sockets = vec![
            socket(
                Protocol::Tcp,
                "10.0.0.5",
                22,
                SocketState::Other("ESTABLISHED"),
                Some(1),
            ),
            socket(Protocol::Tcp, "0.0.0.0", 22, SocketState::Listen, Some(1)),
        ];
        let directory = HashMap::from([(1, "sshd".to_string())]);

        let rows = reconcile(&sockets, &directory, &mut resolver(None));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].port, 22);
        assert_eq!(rows[0].address, "0.0.0.0");
    }

    #[test]
    fn owner_label_comes_from_the_directory_verbatim() {
        let sockets = vec![socket(
            Protocol::Tcp,
            "127.0.0.1",
            8000,
            SocketState::Listen,
            Some(4242),
        )];
        let directory = HashMap::from([(4242, "python3 server.py".to_string())]);

        let rows = reconcile(&sockets, &directory, &mut resolver(None));
        assert_eq!(rows[0].owner, "python3 server.py");
        assert_eq!(rows[0].pid, Some(4242));
    }

    #[test]
    fn exited_pid_degrades_to_placeholder_owner() {
        let sockets = vec![socket(
            Protocol::Tcp,
            "0.0.0.0",
            9999,
            SocketState::Listen,
            Some(31337),
        )];

        let rows = reconcile(&sockets, &HashMap::new(), &mut resolver(None));
        assert_eq!(rows[0].owner, "?");
    }

    #[test]
    fn kernel_owned_socket_consults_the_rpc_resolver() {
        let registry = "    100000    3    udp       0.0.0.0.0.111          portmapper superuser\n";
        let sockets = vec![socket(
            Protocol::Udp,
            "0.0.0.0",
            111,
            SocketState::NoState,
            None,
        )];

        let rows = reconcile(&sockets, &HashMap::new(), &mut resolver(Some(registry)));
        assert_eq!(rows[0].owner, "rpc.portmapper");
        assert_eq!(rows[0].pid, None);
    }

    #[test]
    fn kernel_owned_socket_without_registry_tool_is_unknown() {
        let sockets = vec![socket(
            Protocol::Udp,
            "0.0.0.0",
            111,
            SocketState::NoState,
            None,
        )];

        let rows = reconcile(&sockets, &HashMap::new(), &mut resolver(None));
        assert_eq!(rows[0].owner, "?");
    }

    #[test]
    fn rows_sort_by_owner_label_with_enumeration_order_ties() {
        let sockets = vec![
            socket(Protocol::Tcp, "0.0.0.0", 80, SocketState::Listen, Some(3)),
            socket(Protocol::Tcp, "0.0.0.0", 22, SocketState::Listen, Some(1)),
            socket(Protocol::Tcp6, "::", 80, SocketState::Listen, Some(3)),
            socket(Protocol::Udp, "0.0.0.0", 68, SocketState::NoState, Some(2)),
        ];
        let directory = HashMap::from([
            (1, "sshd".to_string()),
            (2, "dhclient".to_string()),
            (3, "nginx".to_string()),
        ]);

        let rows = reconcile(&sockets, &directory, &mut resolver(None));
        let owners: Vec<&str> = rows.iter().map(|row| row.owner.as_str()).collect();
        assert_eq!(owners, vec!["dhclient", "nginx", "nginx", "sshd"]);
        // Stable sort: nginx's v4 socket was enumerated before its v6 one.
        assert_eq!(rows[1].protocol, Protocol::Tcp);
        assert_eq!(rows[2].protocol, Protocol::Tcp6);
    }

    #[test]
    fn idempotent_for_an_unchanged_snapshot() {
        let sockets = vec![
            socket(Protocol::Tcp, "0.0.0.0", 22, SocketState::Listen, Some(1)),
            socket(Protocol::Udp, "0.0.0.0", 111, SocketState::NoState, None),
        ];
        let directory = HashMap::from([(1, "sshd".to_string())]);

        let first = reconcile(&sockets, &directory, &mut resolver(None));
        let second = reconcile(&sockets, &directory, &mut resolver(None));
        assert_eq!(render(&first), render(&second));
    }

    #[test]
    fn render_prints_header_even_with_no_rows() {
        let text = render(&[]);
        let mut lines = text.lines();
        let header = lines.next().expect("header line");
        assert!(header.starts_with("Proto"));
        assert!(header.ends_with("Program name"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn render_uses_fixed_width_columns_and_pid_placeholder() {
        let rows = reconcile(
            &[socket(
                Protocol::Udp,
                "0.0.0.0",
                111,
                SocketState::NoState,
                None,
            )],
            &HashMap::new(),
            &mut resolver(None),
        );
        let text = render(&rows);
        let row_line = text.lines().nth(1).expect("data row");

        assert!(row_line.starts_with("udp  "));
        assert!(row_line.contains(&format!("{:>40}:{:<10}", "0.0.0.0", 111)));
        assert!(row_line.contains(&format!("{:<6}", "-")));
    }
}
