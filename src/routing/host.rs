//! Host header classification.

use crate::types::BranchName;

/// Where a request should go, judged by its host alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRoute {
    /// `webhook.<base>`: handled as a webhook delivery.
    Webhook,
    /// `main.<base>`: redirected to the bare base domain.
    RedirectToBase,
    /// Serve the given branch's published output.
    Branch(BranchName),
    /// The host names something that cannot be a branch.
    NotFound,
}

/// Lowercases a `Host` header value and strips any port.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        // IPv6 literal: keep the brackets, drop what follows them.
        match rest.find(']') {
            Some(end) => &raw[..end + 2],
            None => raw,
        }
    } else {
        raw.rsplit_once(':')
            .filter(|(_, port)| port.bytes().all(|b| b.is_ascii_digit()))
            .map_or(raw, |(host, _)| host)
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Classifies a normalized host against the base domain.
///
/// The base itself maps to `main`. Below the base, the leading label names
/// the branch, so `a.b.<base>` serves `a`. Hosts outside the base fall back
/// to label counting: more than two labels selects the leading label,
/// otherwise `main`.
pub fn route_host(host: &str, base_domain: &str) -> HostRoute {
    if host == base_domain {
        return HostRoute::Branch(BranchName::main());
    }

    if let Some(prefix) = host
        .strip_suffix(base_domain)
        .and_then(|prefix| prefix.strip_suffix('.'))
    {
        return match prefix {
            "webhook" => HostRoute::Webhook,
            "main" => HostRoute::RedirectToBase,
            prefix => branch_for_label(leading_label(prefix)),
        };
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 {
        branch_for_label(labels[0])
    } else {
        HostRoute::Branch(BranchName::main())
    }
}

fn leading_label(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

fn branch_for_label(label: &str) -> HostRoute {
    BranchName::parse(label).map_or(HostRoute::NotFound, HostRoute::Branch)
}
