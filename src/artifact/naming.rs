//! Deterministic names for cluster objects and Terraform modules.

/// Lowercase RFC 1123 label: `mainDb` -> `main-db`.
pub fn sanitize_dns(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('-');
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
    }
    let trimmed = out.trim_matches('-');
    let mut name: String = trimmed.chars().take(63).collect();
    while name.ends_with('-') {
        name.pop();
    }
    name
}

/// Base name of every workload belonging to one middleware entry.
pub fn service_name(component: &str, middleware: &str) -> String {
    sanitize_dns(&format!("{}-{}", component, middleware))
}

/// Service exposing one endpoint. The `main` endpoint keeps the base name.
pub fn endpoint_service_name(base: &str, endpoint: &str) -> String {
    if endpoint == "main" {
        base.to_string()
    } else {
        format!("{}-{}", base, sanitize_dns(endpoint))
    }
}

pub fn role_service_name(base: &str, role: &str) -> String {
    format!("{}-{}", base, sanitize_dns(role))
}

/// Terraform module identifier built from name parts.
pub fn module_name(parts: &[&str]) -> String {
    sanitize_dns(&parts.join("-")).replace('-', "_")
}

pub fn cloud_module_name(component: &str, middleware: &str) -> String {
    module_name(&[component, middleware, "cloud"])
}

pub fn cluster_address(service: &str, namespace: &str, port: u16) -> String {
    format!("{}.{}.svc.cluster.local:{}", service, namespace, port)
}

/// `module.<name>`, as used in `depends_on` and `-target`.
pub fn module_address(module: &str) -> String {
    format!("module.{}", module)
}
