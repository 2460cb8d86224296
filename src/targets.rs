use anyhow::{bail, Context, Result};
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::types::HostTarget;

/// Largest CIDR block a single host-file line may expand to.
const MAX_CIDR_HOSTS: u64 = 1 << 16;

/// Parse host-list content into a deduplicated, order-preserving list of hosts.
///
/// Supported formats per line:
/// - an IP address or hostname: `10.0.0.5`, `bms.example.net`
/// - an IPv4 CIDR block: `10.0.0.0/30` (expands to its host addresses)
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_hosts_str(s: &str) -> Result<Vec<HostTarget>> {
    let mut out: Vec<HostTarget> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        // Strip comments and trim
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        if line.contains('/') {
            let net: IpNet = line
                .parse()
                .with_context(|| format!("line {line_no}: invalid CIDR block: {line}"))?;
            let IpNet::V4(v4) = net else {
                bail!("line {line_no}: IPv6 CIDR blocks are not supported: {line}");
            };
            for ip in expand_ipv4net_hosts(v4)
                .with_context(|| format!("line {line_no}: cannot expand {line}"))?
            {
                let host = ip.to_string();
                if seen.insert(host.clone()) {
                    out.push(host);
                }
            }
            continue;
        }

        if seen.insert(line.to_string()) {
            out.push(line.to_string());
        }
    }

    Ok(out)
}

/// Load a host list from a file path. Errors if the file cannot be read or parsed.
pub fn load_hosts_from_path(path: impl AsRef<Path>) -> Result<Vec<HostTarget>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read host file: {}", path.as_ref().display()))?;
    parse_hosts_str(&content)
}

/// Order-preserving deduplication for host lists that did not come from a file.
pub fn dedup_hosts<I, S>(hosts: I) -> Vec<HostTarget>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    hosts
        .into_iter()
        .map(|h| h.as_ref().trim().to_string())
        .filter(|h| !h.is_empty() && seen.insert(h.clone()))
        .collect()
}

/// Host addresses of an IPv4 network, excluding network and broadcast addresses.
/// A /31 or /32 yields its addresses as-is.
fn expand_ipv4net_hosts(net: Ipv4Net) -> Result<Vec<Ipv4Addr>> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if u64::from(end - start) + 1 > MAX_CIDR_HOSTS {
        bail!("block holds more than {MAX_CIDR_HOSTS} addresses");
    }
    if end <= start + 1 {
        return Ok((start..=end).map(Ipv4Addr::from).collect());
    }
    Ok((start + 1..end).map(Ipv4Addr::from).collect())
}
