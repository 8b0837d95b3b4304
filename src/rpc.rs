use crate::models::Protocol;
use std::collections::HashMap;
use std::process::Command;
use tracing::{debug, warn};

const FALLBACK: &str = "?";

/// One registration parsed from the kernel RPC port registry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RpcRegistration {
    pub protocol: String,
    pub address: String,
    pub service: String,
}

/// Seam for the external registry introspection tool, so the resolver's
/// call-at-most-once contract is testable without spawning anything.
pub trait RegistryProbe {
    fn query(&mut self) -> Option<String>;
}

/// Probes the registry by running `rpcinfo`. A host without the tool is a
/// normal condition, reported as `None`.
pub struct RpcinfoCommand;

impl RegistryProbe for RpcinfoCommand {
    fn query(&mut self) -> Option<String> {
        let output = match Command::new("rpcinfo").output() {
            Ok(output) => output,
            Err(err) => {
                debug!(?err, "rpcinfo not runnable");
                return None;
            }
        };
        if !output.status.success() {
            warn!(status = %output.status, "rpcinfo exited with an error");
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Fallback owner lookup for sockets the kernel holds without a pid.
///
/// The external tool is invoked lazily and at most once per run; both the
/// parsed registration list and every (protocol, address) answer are memoized
/// for the remainder of the run.
pub struct RpcResolver {
    probe: Box<dyn RegistryProbe>,
    registrations: Option<Vec<RpcRegistration>>,
    answers: HashMap<(Protocol, String), String>,
}

impl RpcResolver {
    pub fn new() -> Self {
        Self::with_probe(Box::new(RpcinfoCommand))
    }

    pub fn with_probe(probe: Box<dyn RegistryProbe>) -> Self {
        Self {
            probe,
            registrations: None,
            answers: HashMap::new(),
        }
    }

    /// Resolves a kernel-owned socket to "rpc.<service>" when the registry
    /// confirms a registration for exactly this (protocol, "ip:port") pair.
    /// Anything else, including an absent registry tool, answers "?" — never
    /// an error.
    pub fn resolve(&mut self, protocol: Protocol, address: &str) -> String {
        let key = (protocol, address.to_string());
        if let Some(answer) = self.answers.get(&key) {
            return answer.clone();
        }

        let answer = self
            .registrations()
            .iter()
            // Registrations are not expected to collide; first listed wins.
            .find(|reg| reg.protocol == protocol.label() && reg.address == address)
            .map(|reg| format!("rpc.{}", reg.service))
            .unwrap_or_else(|| FALLBACK.to_string());

        self.answers.insert(key, answer.clone());
        answer
    }

    fn registrations(&mut self) -> &[RpcRegistration] {
        if self.registrations.is_none() {
            let parsed = match self.probe.query() {
                Some(output) => parse_registrations(&output),
                None => {
                    warn!("RPC registry tool unavailable, kernel sockets resolve to ?");
                    Vec::new()
                }
            };
            self.registrations = Some(parsed);
        }
        self.registrations.as_deref().unwrap_or_default()
    }
}

impl Default for RpcResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `rpcinfo` registry output. Expected data lines are
/// `program version netid address service [owner]` with the address in the
/// portable `<base>.<hi>.<lo>` form (port = 256*hi + lo). Header, trailer and
/// malformed lines simply do not match and are skipped.
fn parse_registrations(output: &str) -> Vec<RpcRegistration> {
    output
        .lines()
        .filter_map(parse_registration_line)
        .collect()
}

fn parse_registration_line(line: &str) -> Option<RpcRegistration> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 5 {
        return None;
    }
    // Numeric program and version columns distinguish data from the header.
    cols[0].parse::<u32>().ok()?;
    cols[1].parse::<u32>().ok()?;

    let address = universal_address(cols[3])?;
    Some(RpcRegistration {
        protocol: cols[2].to_string(),
        address,
        service: cols[4].to_string(),
    })
}

/// "0.0.0.0.0.111" -> "0.0.0.0:111", "::.0.111" -> ":::111".
fn universal_address(raw: &str) -> Option<String> {
    let mut parts = raw.rsplitn(3, '.');
    let low: u16 = parts.next()?.parse::<u8>().ok()?.into();
    let high: u16 = parts.next()?.parse::<u8>().ok()?.into();
    let base = parts.next()?;
    if base.is_empty() {
        return None;
    }
    Some(format!("{}:{}", base, high * 256 + low))
}
