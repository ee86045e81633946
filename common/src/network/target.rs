//! # Scan Target Model
//!
//! Parses and expands the raw inputs of a run. An input can be:
//! * A hostname or URL (`example.com`, `https://example.com/`).
//! * A single IP address.
//! * An IPv4 range (`192.168.1.1-50`).
//! * A CIDR block (`192.168.1.0/24`).
//! * A comma-separated list of any of the above.
//!
//! Expansion turns inputs into deduplicated atomic [`Target`]s and
//! records unusable inputs as warnings instead of failing the run.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use tracing::debug;

use crate::config::RunConfig;
use crate::error::TargetError;
use crate::module::caps;
use crate::network::range::{self, Ipv4Range};

/// A raw target expression as the user wrote it.
#[derive(Clone, Debug)]
pub enum TargetSpec {
    /// A single host by address.
    Addr { target_addr: IpAddr },
    /// A named host, unresolved until a module resolves it.
    Host { hostname: String },
    /// A contiguous IPv4 block in CIDR notation.
    Cidr { network: Ipv4Addr, prefix: u8 },
    /// A contiguous IPv4 block given as start-end.
    Range { ipv4_range: Ipv4Range },
    /// Holds a list of different specs.
    Multi { specs: Vec<TargetSpec> },
}

impl FromStr for TargetSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty target".into());
        }

        if s.contains(',') {
            return parse_commas(s);
        }

        if let Some(spec) = parse_addr(s) {
            return Ok(spec);
        }

        if let Some(spec) = parse_cidr(s)? {
            return Ok(spec);
        }

        if let Some(spec) = parse_ip_range(s)? {
            return Ok(spec);
        }

        if let Some(spec) = parse_hostname(s) {
            return Ok(spec);
        }

        Err(format!("invalid target: {s}"))
    }
}

/// Parses a comma-separated list (e.g., "example.com, 10.0.0.0/24").
fn parse_commas(s: &str) -> Result<TargetSpec, String> {
    let mut specs = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        specs.push(TargetSpec::from_str(part)?);
    }

    if specs.is_empty() {
        return Err("empty target list".into());
    }
    Ok(TargetSpec::Multi { specs })
}

/// Parses a single IP address.
fn parse_addr(s: &str) -> Option<TargetSpec> {
    s.parse::<IpAddr>()
        .ok()
        .map(|target_addr| TargetSpec::Addr { target_addr })
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr(s: &str) -> Result<Option<TargetSpec>, String> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let network = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid IP in CIDR '{ip_str}': {e}"))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| format!("Invalid prefix in CIDR '{prefix_str}': {e}"))?;

    if prefix > 32 {
        return Err(format!("Invalid prefix in CIDR '{prefix_str}': above /32"));
    }

    Ok(Some(TargetSpec::Cidr { network, prefix }))
}

/// Parses "1.1.1.1-2.2.2.2" or the last-octet shorthand "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<TargetSpec>, String> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    // Hostnames may contain '-'; only treat this as a range when the
    // left side is an address.
    let Ok(start_addr) = start_str.parse::<Ipv4Addr>() else {
        return Ok(None);
    };

    let end_addr = if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        full_addr
    } else {
        let last_octet = end_str
            .parse::<u8>()
            .map_err(|e| format!("Invalid end of range '{end_str}': {e}"))?;
        let mut octets = start_addr.octets();
        octets[3] = last_octet;
        Ipv4Addr::from(octets)
    };

    if u32::from(end_addr) < u32::from(start_addr) {
        return Err(format!("Range '{s}' ends before it starts"));
    }

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(TargetSpec::Range { ipv4_range }))
}

/// Parses a hostname, accepting URL-ish forms.
fn parse_hostname(s: &str) -> Option<TargetSpec> {
    let hostname = normalize_hostname(s);
    if is_valid_hostname(&hostname) {
        Some(TargetSpec::Host { hostname })
    } else {
        None
    }
}

/// Strips scheme, path, port and case from a hostname-ish input.
pub fn normalize_hostname(s: &str) -> String {
    let mut host = s.trim();
    for scheme in ["http://", "https://"] {
        if host.len() >= scheme.len() && host[..scheme.len()].eq_ignore_ascii_case(scheme) {
            host = &host[scheme.len()..];
            break;
        }
    }
    if let Some((bare, _path)) = host.split_once('/') {
        host = bare;
    }
    if let Some((bare, port)) = host.rsplit_once(':')
        && port.chars().all(|c| c.is_ascii_digit())
    {
        host = bare;
    }
    host.to_ascii_lowercase()
}

/// Hostname shape check: dot-separated alphanumeric/hyphen labels with
/// an alphabetic top-level label of at least two characters.
fn is_valid_hostname(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let shape_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    shape_ok && tld_ok
}

/// An atomic scan unit. Immutable once created; everything a run learns
/// about it lives in its record, not here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// Normalized identity, unique within a run.
    pub identity: String,
    /// Address, for targets given as IP literals.
    pub addr: Option<IpAddr>,
    /// Name, for targets given as hostnames.
    pub host: Option<String>,
}

impl Target {
    pub fn from_addr(addr: IpAddr) -> Self {
        Self {
            identity: addr.to_string(),
            addr: Some(addr),
            host: None,
        }
    }

    pub fn from_hostname(hostname: String) -> Self {
        Self {
            identity: hostname.clone(),
            addr: None,
            host: Some(hostname),
        }
    }

    /// Capabilities the target has before any module ran.
    pub fn seed_capabilities(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        if self.addr.is_some() {
            set.insert(caps::ADDR.to_string());
        }
        if self.host.is_some() {
            set.insert(caps::HOSTNAME.to_string());
        }
        set
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

/// Everything `expand` produced: the deduplicated target list plus the
/// inputs that had to be skipped.
#[derive(Debug, Default)]
pub struct Expansion {
    pub targets: Vec<Target>,
    pub warnings: Vec<TargetError>,
}

/// Expands raw inputs into atomic targets.
///
/// Unparseable inputs and oversized ranges become warnings; the rest of
/// the set still expands. Duplicates collapse on their normalized
/// identity, first occurrence wins.
pub fn expand(raw_inputs: &[String], cfg: &RunConfig) -> Expansion {
    let mut expansion = Expansion::default();
    let mut seen: HashSet<String> = HashSet::new();

    for raw in raw_inputs {
        match TargetSpec::from_str(raw) {
            Ok(spec) => collect(raw, spec, cfg, &mut seen, &mut expansion),
            Err(reason) => expansion.warnings.push(TargetError::Invalid {
                input: raw.clone(),
                reason,
            }),
        }
    }

    expansion
}

fn collect(
    raw: &str,
    spec: TargetSpec,
    cfg: &RunConfig,
    seen: &mut HashSet<String>,
    out: &mut Expansion,
) {
    match spec {
        TargetSpec::Addr { target_addr } => {
            push_unique(Target::from_addr(target_addr), seen, out);
        }
        TargetSpec::Host { hostname } => {
            push_unique(Target::from_hostname(hostname), seen, out);
        }
        TargetSpec::Cidr { network, prefix } => {
            let ipv4_range = match range::cidr_range(network, prefix) {
                Ok(r) => r,
                Err(e) => {
                    out.warnings.push(TargetError::Invalid {
                        input: raw.to_string(),
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            let ipv4_range = if cfg.strip_network_edges && prefix < 31 {
                ipv4_range.without_edges()
            } else {
                ipv4_range
            };
            collect_range(raw, ipv4_range, cfg, seen, out);
        }
        TargetSpec::Range { ipv4_range } => {
            collect_range(raw, ipv4_range, cfg, seen, out);
        }
        TargetSpec::Multi { specs } => {
            for spec in specs {
                collect(raw, spec, cfg, seen, out);
            }
        }
    }
}

fn collect_range(
    raw: &str,
    ipv4_range: Ipv4Range,
    cfg: &RunConfig,
    seen: &mut HashSet<String>,
    out: &mut Expansion,
) {
    let hosts = ipv4_range.host_count();
    if hosts > cfg.range_ceiling {
        out.warnings.push(TargetError::RangeTooLarge {
            input: raw.to_string(),
            hosts,
            ceiling: cfg.range_ceiling,
        });
        return;
    }
    for addr in ipv4_range.to_iter() {
        push_unique(Target::from_addr(addr), seen, out);
    }
}

fn push_unique(target: Target, seen: &mut HashSet<String>, out: &mut Expansion) {
    if seen.insert(target.identity.clone()) {
        out.targets.push(target);
    } else {
        debug!("dropping duplicate target {}", target.identity);
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
