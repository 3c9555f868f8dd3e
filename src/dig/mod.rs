//! Name digging module
//!
//! Turns the networks attached to a container into the set of DNS names that
//! should be resolvable from inside it, resolves them, and streams the
//! findings.

use std::collections::BTreeSet;

use serde::Serialize;

pub mod digger;
pub mod resultmap;

pub use digger::Digger;
pub use resultmap::{NamedAddressSet, ResultMap};

/// A single virtual network in terms of its name plus the DNS labels of the
/// attached containers and their service aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDescriptor {
    /// Network name, used like a DNS "TLD" label.
    pub label: String,
    /// Container and service/alias names on the network.
    pub labels: Vec<String>,
}

/// The names addressable from a container attached to the given networks:
/// every `<label>.<network>.` pair, plus each label once more as a bare
/// `<label>.` short name shared across networks. The qualified names come in
/// input order, the deduplicated short names sorted.
pub fn all_fqdns_on_networks(nets: &[NetworkDescriptor]) -> Vec<String> {
    let mut names = Vec::new();
    let mut shorts = BTreeSet::new();
    for net in nets {
        for label in &net.labels {
            names.push(format!("{}.{}.", label, net.label));
            shorts.insert(label.as_str());
        }
    }
    names.extend(shorts.into_iter().map(|label| format!("{label}.")));
    names
}

/// Appends the trailing dot if `name` is not already fully qualified.
pub fn ensure_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}
