//! Helpers shared by the strategies.

use super::{
    ContainerPort, ContainerSpec, EndpointDefinition, EnvContext, ResourceQuantities,
    ResourceRequirements,
};
use crate::config::Provider;
use std::collections::BTreeMap;

/// Image used for TCP wait loops and file copies in init containers.
pub const UTILITY_IMAGE: &str = "busybox:1.36";

/// Seconds between probes in generated wait loops.
pub const WAIT_INTERVAL_SECS: u32 = 2;

pub fn default_resources(provider: Provider) -> ResourceRequirements {
    if provider.is_local() {
        ResourceRequirements {
            requests: ResourceQuantities::new("100m", "128Mi"),
            limits: ResourceQuantities::new("500m", "512Mi"),
        }
    } else {
        ResourceRequirements {
            requests: ResourceQuantities::new("250m", "256Mi"),
            limits: ResourceQuantities::new("1", "1Gi"),
        }
    }
}

/// Sized resources: `local` uses the first pair, cloud providers the second.
pub fn sized_resources(
    provider: Provider,
    local: (&str, &str, &str, &str),
    cloud: (&str, &str, &str, &str),
) -> ResourceRequirements {
    let (req_cpu, req_mem, lim_cpu, lim_mem) = if provider.is_local() { local } else { cloud };
    ResourceRequirements {
        requests: ResourceQuantities::new(req_cpu, req_mem),
        limits: ResourceQuantities::new(lim_cpu, lim_mem),
    }
}

/// Environment variables for the config fields that are present.
///
/// `mapping` pairs a config key with the variable it feeds.
pub fn env_from_config(ctx: &EnvContext<'_>, mapping: &[(&str, &str)]) -> BTreeMap<String, String> {
    mapping
        .iter()
        .filter_map(|(key, var)| ctx.config_str(key).map(|v| (var.to_string(), v)))
        .collect()
}

/// Init container that blocks until `host:port` accepts TCP connections.
pub fn wait_for_tcp(name: &str, host: &str, port: u16) -> ContainerSpec {
    ContainerSpec::new(name, UTILITY_IMAGE).shell(format!(
        "until nc -z {host} {port}; do echo waiting for {host}:{port}; sleep {interval}; done",
        host = host,
        port = port,
        interval = WAIT_INTERVAL_SECS
    ))
}

pub fn container_ports(endpoints: &[EndpointDefinition]) -> Vec<ContainerPort> {
    endpoints
        .iter()
        .map(|ep| ContainerPort {
            name: ep.name.clone(),
            port: ep.port,
        })
        .collect()
}

/// Splits `host:port`, falling back to `default_port` when no port is present.
pub fn split_host_port(address: &str, default_port: u16) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), default_port),
        },
        None => (address.to_string(), default_port),
    }
}

/// `maxConnections` -> `MAX_CONNECTIONS`
pub fn to_env_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_loop_polls_every_two_seconds() {
        let spec = wait_for_tcp("wait-for-db", "db.ns.svc.cluster.local", 5432);
        assert_eq!(spec.command, vec!["sh", "-c"]);
        assert!(spec.args[0].contains("nc -z db.ns.svc.cluster.local 5432"));
        assert!(spec.args[0].contains("sleep 2"));
    }

    #[test]
    fn splits_addresses() {
        assert_eq!(split_host_port("db:5433", 5432), ("db".to_string(), 5433));
        assert_eq!(split_host_port("db", 5432), ("db".to_string(), 5432));
    }

    #[test]
    fn env_names() {
        assert_eq!(to_env_name("maxConnections"), "MAX_CONNECTIONS");
        assert_eq!(to_env_name("log-level"), "LOG_LEVEL");
        assert_eq!(to_env_name("port"), "PORT");
    }

    #[test]
    fn local_resources_are_smaller() {
        let local = default_resources(Provider::Local);
        let cloud = default_resources(Provider::Aws);
        assert_eq!(local.limits.memory, "512Mi");
        assert_eq!(cloud.limits.memory, "1Gi");
    }
}
