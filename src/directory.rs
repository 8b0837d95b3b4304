use crate::docker::ContainerLookup;
use crate::models::ProcessRecord;
use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

/// Script interpreters whose listening sockets are more usefully labelled by
/// the script they run than by the interpreter binary. Matched by prefix, so
/// "python3" and "python3.12" both qualify.
const INTERPRETER_PREFIXES: &[&str] = &["python", "perl", "ruby"];

/// Host-side helper that forwards ports into a container's network namespace.
const CONTAINER_PROXY: &str = "docker-proxy";
const CONTAINER_IP_FLAG: &str = "-container-ip";

const UNKNOWN: &str = "?";

/// Snapshots every process currently visible in /proc.
///
/// A single process that exits mid-walk or denies access is skipped with its
/// best-available fields; only total enumeration failure is fatal.
pub fn collect_process_records() -> anyhow::Result<Vec<ProcessRecord>> {
    let all = procfs::process::all_processes().context("enumerating /proc")?;
    let mut records = Vec::new();

    for process in all {
        let process = match process {
            Ok(process) => process,
            Err(_) => continue,
        };
        let stat = match process.stat() {
            Ok(stat) => stat,
            Err(_) => continue,
        };
        // Redacted or unreadable cmdlines degrade to empty, not to a skip:
        // the base label alone is still worth reporting.
        let cmdline = process.cmdline().unwrap_or_default();

        records.push(ProcessRecord {
            pid: stat.pid,
            name: stat.comm,
            cmdline,
        });
    }

    Ok(records)
}

/// Builds the pid -> display label directory, one entry per visible process.
pub fn build_directory(
    records: &[ProcessRecord],
    containers: &mut dyn ContainerLookup,
) -> HashMap<i32, String> {
    let mut directory = HashMap::with_capacity(records.len());
    for record in records {
        directory.insert(record.pid, display_label(record, containers));
    }
    directory
}

fn display_label(record: &ProcessRecord, containers: &mut dyn ContainerLookup) -> String {
    if is_interpreter(&record.name) {
        return interpreter_label(record);
    }
    if record.name == CONTAINER_PROXY {
        return proxy_label(record, containers);
    }
    record.name.clone()
}

fn is_interpreter(name: &str) -> bool {
    INTERPRETER_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// "python3 /opt/app/server.py" -> "python3 server.py". An interpreter started
/// without a script argument keeps its base name.
fn interpreter_label(record: &ProcessRecord) -> String {
    match record.cmdline.get(1).and_then(|arg| script_basename(arg)) {
        Some(script) => format!("{} {}", record.name, script),
        None => record.name.clone(),
    }
}

fn script_basename(arg: &str) -> Option<String> {
    Path::new(arg)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Labels a container network proxy with the container it forwards to, by
/// matching the proxy's configured target address against the runtime
/// inventory. Any gap in that chain degrades to "?".
fn proxy_label(record: &ProcessRecord, containers: &mut dyn ContainerLookup) -> String {
    let container = proxy_target_ip(&record.cmdline)
        .and_then(|ip| containers.name_for_ip(ip))
        .unwrap_or_else(|| UNKNOWN.to_string());
    format!("{} {}", record.name, container)
}

fn proxy_target_ip(cmdline: &[String]) -> Option<&str> {
    let flag_at = cmdline.iter().position(|arg| arg == CONTAINER_IP_FLAG)?;
    cmdline.get(flag_at + 1).map(String::as_str)
}
