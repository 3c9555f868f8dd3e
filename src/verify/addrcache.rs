//! Address cache with verdict fan-out
//!
//! The same IP address is usually reachable under many names: service
//! aliases, network-scoped names, short names. The cache makes sure each
//! address gets probed exactly once while every name sharing the address
//! still receives the pending notices and the terminal verdict.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::types::{NamedAddress, Quality};

/// Per-address state: the most recent quality, its optional diagnostic, and
/// the names waiting for (or already told about) a quality update.
#[derive(Debug)]
struct QualityConsumers {
    quality: Quality,
    error: Option<String>,
    consumers: Vec<String>,
}

/// Cache of qualified addresses keyed by address literal.
///
/// The mutex is held across the news emissions so that, per address, pending
/// notices and terminal verdicts leave in the order the transitions happened.
#[derive(Debug, Default)]
pub struct AddressCache {
    inner: Mutex<HashMap<String, QualityConsumers>>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one named-address update into the cache and emits the resulting
    /// news. Returns true iff the address is new to the cache, which tells
    /// the caller to schedule the one and only probe for it.
    ///
    /// A stale update for a yet-unknown name is answered right away with a
    /// synthetic update carrying the cached quality; that is also how names
    /// arriving after a terminal verdict get served, since the verdict clears
    /// the consumer list. Each emission races cancellation, and cancellation
    /// abandons whatever emissions remain for this update.
    pub async fn update(
        &self,
        record: &NamedAddress,
        news: &mpsc::Sender<NamedAddress>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut cache = self.inner.lock().await;
        let addr = record.address.address.clone();

        let qc = match cache.entry(addr) {
            Entry::Vacant(entry) => {
                // first sight; new addresses always enter unverified or
                // verifying, so a later quality update is guaranteed
                entry.insert(QualityConsumers {
                    quality: record.address.quality,
                    error: record.address.error.clone(),
                    consumers: vec![record.fqdn.clone()],
                });
                send_update(news, record.clone(), cancel).await;
                return true;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        let known_consumer = qc.consumers.iter().any(|c| c == &record.fqdn);
        if record.address.quality.rank() <= qc.quality.rank() {
            // stale: answer this one name with the fresher cached quality,
            // nobody else is affected
            if !known_consumer {
                qc.consumers.push(record.fqdn.clone());
                let synthetic = record.with_quality(qc.quality, qc.error.clone());
                send_update(news, synthetic, cancel).await;
            }
            return false;
        }

        qc.quality = record.address.quality;
        qc.error = record.address.error.clone();
        let consumers = if qc.quality.is_pending() {
            if !known_consumer {
                qc.consumers.push(record.fqdn.clone());
            }
            qc.consumers.clone()
        } else {
            // terminal verdict: notify everyone and clear the registrations,
            // any later arrival gets served straight from the cache
            std::mem::take(&mut qc.consumers)
        };
        let quality = qc.quality;
        let error = qc.error.clone();
        for fqdn in consumers {
            let update = NamedAddress {
                fqdn,
                address: record.address.with_quality(quality, error.clone()),
            };
            if !send_update(news, update, cancel).await {
                return false;
            }
        }
        false
    }
}

/// Sends one update unless cancellation wins the race; false on cancellation.
async fn send_update(
    news: &mpsc::Sender<NamedAddress>,
    update: NamedAddress,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        sent = news.send(update) => sent.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(fqdn: &str, addr: &str, quality: Quality) -> NamedAddress {
        NamedAddress::new(fqdn, addr).with_quality(quality, None)
    }

    async fn drain(rx: &mut mpsc::Receiver<NamedAddress>) -> Vec<NamedAddress> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    #[tokio::test]
    async fn first_sight_schedules_a_probe() {
        let cache = AddressCache::new();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let rec = named("foo.net_a.", "10.0.0.2", Quality::Unverified);
        assert!(cache.update(&rec, &tx, &cancel).await);
        // every subsequent sight of the same address must not reprobe
        assert!(!cache.update(&rec, &tx, &cancel).await);
        assert!(
            !cache
                .update(&named("foo.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
                .await
        );

        let emitted = drain(&mut rx).await;
        // original pass-through plus the synthetic answer for "foo."
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].fqdn, "foo.net_a.");
        assert_eq!(emitted[1].fqdn, "foo.");
        assert_eq!(emitted[1].address.quality, Quality::Unverified);
    }

    #[tokio::test]
    async fn pending_promotion_fans_out_to_all_consumers() {
        let cache = AddressCache::new();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        cache
            .update(&named("foo.net_a.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
            .await;
        cache
            .update(&named("foo.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
            .await;
        drain(&mut rx).await;

        cache
            .update(&named("foo.net_a.", "10.0.0.2", Quality::Verifying), &tx, &cancel)
            .await;
        let emitted = drain(&mut rx).await;
        let mut fqdns: Vec<_> = emitted.iter().map(|na| na.fqdn.clone()).collect();
        fqdns.sort();
        assert_eq!(fqdns, vec!["foo.", "foo.net_a."]);
        assert!(emitted
            .iter()
            .all(|na| na.address.quality == Quality::Verifying));
    }

    #[tokio::test]
    async fn terminal_verdict_clears_the_consumer_list() {
        let cache = AddressCache::new();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        cache
            .update(&named("foo.net_a.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
            .await;
        cache
            .update(&named("foo.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
            .await;
        drain(&mut rx).await;

        cache
            .update(&named("foo.net_a.", "10.0.0.2", Quality::Verified), &tx, &cancel)
            .await;
        let verdicts = drain(&mut rx).await;
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts
            .iter()
            .all(|na| na.address.quality == Quality::Verified));

        // late arrival: served immediately from the cache, no new fan-out
        assert!(
            !cache
                .update(
                    &named("late.net_b.", "10.0.0.2", Quality::Unverified),
                    &tx,
                    &cancel
                )
                .await
        );
        let served = drain(&mut rx).await;
        assert_eq!(served.len(), 1);
        assert_eq!(served[0].fqdn, "late.net_b.");
        assert_eq!(served[0].address.quality, Quality::Verified);
    }

    #[tokio::test]
    async fn invalid_verdicts_carry_their_diagnostic() {
        let cache = AddressCache::new();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        cache
            .update(&named("bad.net_a.", "10.0.0.99", Quality::Unverified), &tx, &cancel)
            .await;
        drain(&mut rx).await;

        let verdict = NamedAddress::new("bad.net_a.", "10.0.0.99")
            .with_quality(Quality::Invalid, Some("no replies or too many losses".into()));
        cache.update(&verdict, &tx, &cancel).await;
        let emitted = drain(&mut rx).await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].address.quality, Quality::Invalid);
        assert_eq!(
            emitted[0].address.error.as_deref(),
            Some("no replies or too many losses")
        );

        // a name showing up afterwards sees the cached diagnostic too
        cache
            .update(&named("bad.", "10.0.0.99", Quality::Unverified), &tx, &cancel)
            .await;
        let served = drain(&mut rx).await;
        assert_eq!(served[0].address.error.as_deref(), Some("no replies or too many losses"));
    }

    #[tokio::test]
    async fn known_consumer_stale_update_is_a_no_op() {
        let cache = AddressCache::new();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let rec = named("foo.net_a.", "10.0.0.2", Quality::Unverified);
        cache.update(&rec, &tx, &cancel).await;
        drain(&mut rx).await;

        cache.update(&rec, &tx, &cancel).await;
        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_abandons_remaining_emissions() {
        let cache = AddressCache::new();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        cache
            .update(&named("foo.net_a.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
            .await;
        cache
            .update(&named("foo.", "10.0.0.2", Quality::Unverified), &tx, &cancel)
            .await;
        drain(&mut rx).await;

        // with the channel full and nobody reading, the fan-out would block;
        // cancellation must let it bail out instead
        for _ in 0..4 {
            tx.send(NamedAddress::placeholder("filler.")).await.unwrap();
        }
        cancel.cancel();
        cache
            .update(&named("foo.net_a.", "10.0.0.2", Quality::Verified), &tx, &cancel)
            .await;

        // only the fillers made it out
        let leftovers = drain(&mut rx).await;
        assert!(leftovers.iter().all(|na| na.fqdn == "filler."));
    }
}
