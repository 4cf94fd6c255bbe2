//! The resolved configuration as seen from the workstation.
//!
//! Endpoint values point at `localhost:<forwarded port>` instead of in-cluster
//! DNS names, and public endpoints get a URL on the machine's LAN address.

use crate::config::ResolvedConfiguration;
use crate::port::PortMapping;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::{IpAddr, UdpSocket};

/// Rewrites forwarded endpoints, and every string that embeds their cluster
/// address, to the local side of the forward.
pub fn build_host_view(
    config: &ResolvedConfiguration,
    mapping: &PortMapping,
    lan: Option<IpAddr>,
) -> ResolvedConfiguration {
    let mut view = config.clone();
    let mut replacements = BTreeMap::new();

    for forward in &mapping.forwards {
        let Some(endpoint) = view.endpoint_mut(&forward.endpoint) else {
            continue;
        };
        let local = format!("localhost:{}", forward.local_port);
        if let Some(cluster) = endpoint.value.replace(local.clone()) {
            if cluster != local {
                replacements.insert(cluster, local);
            }
        }
        if endpoint.public_access {
            endpoint.public_url = lan.map(|ip| {
                format!("{}://{}:{}", endpoint.url_scheme(), ip, forward.local_port)
            });
        }
    }

    if let Some(rewriter) = AddressRewriter::new(replacements) {
        for component in view.components.values_mut() {
            rewriter.env(&mut component.env);
            rewriter.map(&mut component.app_config);
            for mw in component.middleware_dependencies.values_mut() {
                rewriter.env(&mut mw.env);
                rewriter.map(&mut mw.config);
            }
            for service in component.external_services.values_mut() {
                rewriter.map(&mut service.config);
            }
        }
    }
    view
}

/// Recomputes public URLs of forwarded endpoints for a new LAN address.
/// Returns how many endpoints changed.
pub fn refresh_public_urls(view: &mut ResolvedConfiguration, lan: Option<IpAddr>) -> usize {
    let mut changed = 0;
    for component in view.components.values_mut() {
        let endpoints = component.endpoints.values_mut().chain(
            component
                .middleware_dependencies
                .values_mut()
                .flat_map(|mw| mw.endpoints.values_mut()),
        );
        for endpoint in endpoints {
            if !endpoint.public_access {
                continue;
            }
            let Some(port) = endpoint
                .value
                .as_deref()
                .and_then(|v| v.strip_prefix("localhost:"))
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            let url = lan.map(|ip| format!("{}://{}:{}", endpoint.url_scheme(), ip, port));
            if endpoint.public_url != url {
                endpoint.public_url = url;
                changed += 1;
            }
        }
    }
    changed
}

/// Primary non-loopback IPv4 address of this machine.
///
/// Connecting a UDP socket sends nothing; it only selects the outbound interface.
pub fn detect_lan_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("192.0.2.1", 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

/// Swaps whole cluster addresses for their local side in one pass.
///
/// An address only matches at the start of a string or after a character that
/// cannot be part of a DNS name, so `a-db.ns…` never matches inside
/// `z-a-db.ns…`. Longer addresses are tried first.
struct AddressRewriter {
    pattern: Regex,
    replacements: BTreeMap<String, String>,
}

impl AddressRewriter {
    fn new(replacements: BTreeMap<String, String>) -> Option<Self> {
        if replacements.is_empty() {
            return None;
        }
        let mut addresses: Vec<&str> = replacements.keys().map(String::as_str).collect();
        addresses.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = addresses
            .iter()
            .map(|a| regex::escape(a))
            .collect::<Vec<_>>()
            .join("|");
        match Regex::new(&format!(r"(^|[^A-Za-z0-9.\-])({})", alternation)) {
            Ok(pattern) => Some(Self {
                pattern,
                replacements,
            }),
            Err(e) => {
                tracing::warn!("Host view keeps cluster addresses: {}", e);
                None
            }
        }
    }

    fn rewrite(&self, value: &mut String) {
        if !self.pattern.is_match(value) {
            return;
        }
        let rewritten = self.pattern.replace_all(value, |caps: &Captures| {
            let address = &caps[2];
            let local = self
                .replacements
                .get(address)
                .map(String::as_str)
                .unwrap_or(address);
            format!("{}{}", &caps[1], local)
        });
        *value = rewritten.into_owned();
    }

    fn env(&self, env: &mut BTreeMap<String, String>) {
        for value in env.values_mut() {
            self.rewrite(value);
        }
    }

    fn map(&self, map: &mut Map<String, Value>) {
        for value in map.values_mut() {
            self.value(value);
        }
    }

    fn value(&self, value: &mut Value) {
        match value {
            Value::String(s) => self.rewrite(s),
            Value::Array(items) => items.iter_mut().for_each(|v| self.value(v)),
            Value::Object(map) => self.map(map),
            _ => {}
        }
    }
}
