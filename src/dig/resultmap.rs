//! Aggregation of named-address news into a displayable state
//!
//! The map consumes the pipeline's event stream, which sends updates as names
//! are discovered, resolved into addresses, and finally (in)validated, and
//! merges them into the most recent view per name.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{NamedAddress, QualifiedAddress};

/// A DNS name together with its resolved, qualified addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedAddressSet {
    pub fqdn: String,
    pub addresses: Vec<QualifiedAddress>,
}

/// Concurrency-safe map from FQDNs to their qualified address lists. Two
/// pipeline writers and any number of rendering readers share it; with the
/// small record counts of a single scan one mutex is all it takes.
#[derive(Debug, Default)]
pub struct ResultMap {
    inner: Mutex<HashMap<String, Vec<QualifiedAddress>>>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one update. New addresses are appended; a known address only
    /// changes when the update's quality ranks strictly higher than what is
    /// recorded, so stale updates are dropped and the first terminal verdict
    /// for an address sticks. A placeholder registers its FQDN with an empty
    /// address list.
    pub fn update(&self, record: &NamedAddress) {
        if record.fqdn.is_empty() {
            return;
        }
        let mut map = self.inner.lock().unwrap();
        match map.entry(record.fqdn.clone()) {
            Entry::Occupied(entry) => {
                if record.is_placeholder() {
                    return;
                }
                let addrs = entry.into_mut();
                if let Some(known) = addrs
                    .iter_mut()
                    .find(|qa| qa.address == record.address.address)
                {
                    if record.address.quality.rank() > known.quality.rank() {
                        *known = record.address.clone();
                    }
                    return;
                }
                addrs.push(record.address.clone());
            }
            Entry::Vacant(entry) => {
                let addrs = if record.is_placeholder() {
                    Vec::new()
                } else {
                    vec![record.address.clone()]
                };
                entry.insert(addrs);
            }
        }
    }

    /// Returns a defensive copy of the current state for rendering.
    pub fn snapshot(&self) -> Vec<NamedAddressSet> {
        let map = self.inner.lock().unwrap();
        map.iter()
            .map(|(fqdn, addrs)| NamedAddressSet {
                fqdn: fqdn.clone(),
                addresses: addrs.clone(),
            })
            .collect()
    }

    /// Consumes updates from the news channel until it closes or the scan is
    /// cancelled.
    pub async fn track(&self, mut news: mpsc::Receiver<NamedAddress>, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                record = news.recv() => match record {
                    Some(record) => self.update(&record),
                    None => return,
                },
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::Quality;

    fn at(map: &ResultMap, fqdn: &str) -> Vec<QualifiedAddress> {
        map.snapshot()
            .into_iter()
            .find(|set| set.fqdn == fqdn)
            .map(|set| set.addresses)
            .unwrap_or_else(|| panic!("no entry for {fqdn}"))
    }

    #[test]
    fn placeholder_registers_an_empty_list() {
        let map = ResultMap::new();
        map.update(&NamedAddress::placeholder("ghost.net_a."));
        assert_eq!(at(&map, "ghost.net_a."), vec![]);
    }

    #[test]
    fn empty_names_are_ignored() {
        let map = ResultMap::new();
        map.update(&NamedAddress::new("", "10.0.0.2"));
        assert!(map.snapshot().is_empty());
    }

    #[test]
    fn addresses_accumulate_without_duplicates() {
        let map = ResultMap::new();
        map.update(&NamedAddress::placeholder("db.net_a."));
        map.update(&NamedAddress::new("db.net_a.", "10.0.0.2"));
        map.update(&NamedAddress::new("db.net_a.", "fd00::2"));
        map.update(&NamedAddress::new("db.net_a.", "10.0.0.2"));
        let addrs = at(&map, "db.net_a.");
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].address, "10.0.0.2");
        assert_eq!(addrs[1].address, "fd00::2");
    }

    #[test]
    fn quality_only_advances() {
        let map = ResultMap::new();
        let unverified = NamedAddress::new("db.net_a.", "10.0.0.2");
        map.update(&unverified);
        map.update(&unverified.with_quality(Quality::Verifying, None));
        // stale update must not regress the recorded quality
        map.update(&unverified);
        assert_eq!(at(&map, "db.net_a.")[0].quality, Quality::Verifying);

        map.update(&unverified.with_quality(Quality::Verified, None));
        assert_eq!(at(&map, "db.net_a.")[0].quality, Quality::Verified);
    }

    #[test]
    fn first_terminal_verdict_wins() {
        let map = ResultMap::new();
        let addr = NamedAddress::new("db.net_a.", "10.0.0.2");
        map.update(&addr.with_quality(Quality::Invalid, Some("no replies".into())));
        map.update(&addr.with_quality(Quality::Verified, None));
        let recorded = &at(&map, "db.net_a.")[0];
        assert_eq!(recorded.quality, Quality::Invalid);
        assert_eq!(recorded.error.as_deref(), Some("no replies"));
    }

    #[test]
    fn late_placeholder_does_not_erase_addresses() {
        let map = ResultMap::new();
        map.update(&NamedAddress::new("db.net_a.", "10.0.0.2"));
        map.update(&NamedAddress::placeholder("db.net_a."));
        assert_eq!(at(&map, "db.net_a.").len(), 1);
    }

    #[tokio::test]
    async fn track_consumes_until_close() {
        let map = ResultMap::new();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        tx.send(NamedAddress::placeholder("foo.net_a.")).await.unwrap();
        tx.send(NamedAddress::new("foo.net_a.", "10.0.0.2"))
            .await
            .unwrap();
        drop(tx);

        map.track(rx, &cancel).await;
        assert_eq!(at(&map, "foo.net_a.").len(), 1);
    }

    #[tokio::test]
    async fn track_returns_on_cancellation() {
        let map = ResultMap::new();
        let (_tx, rx) = mpsc::channel::<NamedAddress>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        // must return even though the channel stays open
        map.track(rx, &cancel).await;
    }
}
