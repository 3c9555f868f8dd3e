//! Stream verification module
//!
//! Stage two of the pipeline: consumes the digger's named-address stream,
//! schedules each unique address for probing exactly once, and folds the
//! probe verdicts back onto the user-visible news stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::netns::NetnsRef;
use crate::probe::{IcmpProberPool, Prober};
use crate::types::{AddressRecord, NamedAddress};

pub mod addrcache;

pub use addrcache::AddressCache;

/// Verifies a stream of named addresses, caching verification results so
/// duplicate probes are avoided while every name still learns its address's
/// verdict.
pub struct Verifier<P: Prober> {
    news: mpsc::Sender<NamedAddress>,
    prober: P,
    verdicts: mpsc::Receiver<AddressRecord>,
    cancel: CancellationToken,
}

impl Verifier<IcmpProberPool> {
    /// Creates a verifier probing with at most `size` parallel workers from
    /// inside the given network namespace, along with its news channel.
    pub fn new(
        size: usize,
        netns: Option<NetnsRef>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<NamedAddress>) {
        let (mut prober, verdicts) = IcmpProberPool::new(size, cancel.clone());
        if let Some(netns) = netns {
            prober = prober.in_network_namespace(netns);
        }
        Self::with_prober(prober, verdicts, size, cancel)
    }
}

impl<P: Prober> Verifier<P> {
    /// Creates a verifier on top of an arbitrary prober and its verdict
    /// channel.
    pub fn with_prober(
        prober: P,
        verdicts: mpsc::Receiver<AddressRecord>,
        news_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<NamedAddress>) {
        let (news, news_rx) = mpsc::channel(news_capacity.max(1));
        (
            Self {
                news,
                prober,
                verdicts,
                cancel,
            },
            news_rx,
        )
    }

    /// Verifies the incoming stream of named addresses until it closes, then
    /// waits for the enqueued probes to conclude and closes the news channel.
    /// On cancellation the news channel is closed promptly instead, dropping
    /// whatever verdicts are still trailing in.
    pub async fn verify(self, mut input: mpsc::Receiver<NamedAddress>) {
        let Self {
            news,
            prober,
            mut verdicts,
            cancel,
        } = self;
        let cache = Arc::new(AddressCache::new());

        // fold finished verdicts back through the cache onto the news stream
        // as they trickle in
        let verdict_loop = tokio::spawn({
            let cache = Arc::clone(&cache);
            let news = news.clone();
            let cancel = cancel.clone();
            async move {
                loop {
                    tokio::select! {
                        verdict = verdicts.recv() => match verdict {
                            Some(verdict) => {
                                if let Some(named) = verdict.as_named() {
                                    cache.update(named, &news, &cancel).await;
                                }
                            }
                            None => return,
                        },
                        _ = cancel.cancelled() => return,
                    }
                }
            }
        });

        loop {
            tokio::select! {
                record = input.recv() => match record {
                    Some(record) => {
                        if record.is_placeholder() {
                            // pass yet-undug names straight through
                            tokio::select! {
                                _ = news.send(record) => {}
                                _ = cancel.cancelled() => break,
                            }
                            continue;
                        }
                        if cache.update(&record, &news, &cancel).await {
                            // first sight of this address, the one probe
                            prober.probe(AddressRecord::Named(record)).await;
                        }
                    }
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }

        // drain the in-flight probes; their verdicts flow through the verdict
        // loop into the cache and out the news channel
        prober.stop_wait().await;
        let _ = verdict_loop.await;
        // dropping the last news sender closes the user-visible channel
        drop(news);
    }
}
