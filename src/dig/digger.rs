//! Digging names into addresses
//!
//! Stage one of the pipeline: announce every name with a placeholder record,
//! then stream one unverified record per resolved address.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dig::{all_fqdns_on_networks, ensure_fqdn, NetworkDescriptor};
use crate::dns::{NameResolver, ResolverPool, DOCKER_EMBEDDED_RESOLVER};
use crate::error::ResolveError;
use crate::netns::NetnsRef;
use crate::types::NamedAddress;

/// Digs the IPv4 and IPv6 addresses of FQDNs and streams its findings over
/// the news channel returned by the constructor. Feeding its news into a
/// verifier gets the reachability of the dug addresses checked as well.
pub struct Digger<R: NameResolver> {
    resolver: R,
    news: mpsc::Sender<NamedAddress>,
    cancel: CancellationToken,
}

impl Digger<ResolverPool> {
    /// Creates a digger whose resolver pool of `size` connections talks to
    /// Docker's embedded resolver from inside the given network namespace.
    pub async fn new(
        size: usize,
        netns: Option<&NetnsRef>,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<NamedAddress>), ResolveError> {
        let pool =
            ResolverPool::new(size, DOCKER_EMBEDDED_RESOLVER, netns, cancel.clone()).await?;
        Ok(Self::with_resolver(pool, size, cancel))
    }
}

impl<R: NameResolver> Digger<R> {
    /// Creates a digger on top of an arbitrary resolver.
    pub fn with_resolver(
        resolver: R,
        news_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<NamedAddress>) {
        let (news, news_rx) = mpsc::channel(news_capacity.max(1));
        (
            Self {
                resolver,
                news,
                cancel,
            },
            news_rx,
        )
    }

    /// Digs all names visible on the given set of networks.
    pub async fn dig_networks(&self, nets: &[NetworkDescriptor]) {
        self.dig_fqdns(all_fqdns_on_networks(nets)).await;
    }

    /// Digs the given list of names. For each name a placeholder record is
    /// emitted before its resolution is enqueued, so consumers learn which
    /// names are going to be dug up next; the resolution callback then emits
    /// one unverified record per resolved address.
    pub async fn dig_fqdns(&self, names: impl IntoIterator<Item = String>) {
        for name in names {
            let name = ensure_fqdn(&name);
            tokio::select! {
                _ = self.news.send(NamedAddress::placeholder(name.as_str())) => {}
                _ = self.cancel.cancelled() => return,
            }

            let news = self.news.clone();
            let cancel = self.cancel.clone();
            let fqdn = name.clone();
            self.resolver.resolve_name(
                &name,
                Box::new(move |outcome| {
                    Box::pin(async move {
                        let addrs = match outcome {
                            Ok(addrs) => addrs,
                            Err(err) => {
                                // non-fatal: the name keeps its placeholder,
                                // showing up with an empty address list
                                debug!("resolution of {fqdn} failed: {err}");
                                return;
                            }
                        };
                        for addr in addrs {
                            tokio::select! {
                                _ = news.send(NamedAddress::new(fqdn.as_str(), addr)) => {}
                                _ = cancel.cancelled() => return,
                            }
                        }
                    })
                }),
            );
        }
    }

    /// Waits for all queued resolutions to get processed, then closes the
    /// news channel. No records are emitted after the close.
    pub async fn stop_wait(self) {
        // joining the resolver's workers also drops the news clones captured
        // by outstanding resolution callbacks
        self.resolver.stop_wait().await;
        drop(self.news);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use crate::dns::ResolveCallback;
    use crate::types::Quality;

    /// Resolver answering from a canned map, completing callbacks on spawned
    /// tasks like the real pool's workers do.
    #[derive(Clone)]
    struct MockResolver {
        answers: HashMap<String, Vec<String>>,
        tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
    }

    impl MockResolver {
        fn new(answers: HashMap<String, Vec<String>>) -> Self {
            Self {
                answers,
                tasks: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl NameResolver for MockResolver {
        fn resolve_name(&self, name: &str, done: ResolveCallback) {
            let outcome = match self.answers.get(name) {
                Some(addrs) => Ok(addrs.clone()),
                None => Err(ResolveError::NoAnswers {
                    name: name.to_string(),
                }),
            };
            let handle = tokio::spawn(async move { done(outcome).await });
            self.tasks.lock().unwrap().push(handle);
        }

        async fn stop_wait(self) {
            let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
            for task in tasks {
                let _ = task.await;
            }
        }
    }

    #[tokio::test]
    async fn placeholder_precedes_resolution_results() {
        let resolver = MockResolver::new(HashMap::from([(
            "foo.net_a.".to_string(),
            vec!["10.0.0.2".to_string()],
        )]));
        let (digger, mut news) = Digger::with_resolver(resolver, 4, CancellationToken::new());

        digger
            .dig_fqdns(vec!["foo.net_a".to_string()])
            .await;
        digger.stop_wait().await;

        let mut seen = Vec::new();
        while let Some(record) = news.recv().await {
            seen.push(record);
        }
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_placeholder());
        assert_eq!(seen[0].fqdn, "foo.net_a.");
        assert_eq!(seen[1].fqdn, "foo.net_a.");
        assert_eq!(seen[1].address.address, "10.0.0.2");
        assert_eq!(seen[1].address.quality, Quality::Unverified);
    }

    #[tokio::test]
    async fn failed_resolutions_leave_only_the_placeholder() {
        let resolver = MockResolver::new(HashMap::new());
        let (digger, mut news) = Digger::with_resolver(resolver, 4, CancellationToken::new());

        digger.dig_fqdns(vec!["ghost.net_a.".to_string()]).await;
        digger.stop_wait().await;

        let record = news.recv().await.unwrap();
        assert!(record.is_placeholder());
        assert!(news.recv().await.is_none(), "news channel must be closed");
    }

    #[tokio::test]
    async fn digs_whole_networks() {
        let resolver = MockResolver::new(HashMap::from([
            ("foo.net_a.".to_string(), vec!["10.0.0.2".to_string()]),
            ("foo.".to_string(), vec!["10.0.0.2".to_string()]),
        ]));
        let (digger, mut news) = Digger::with_resolver(resolver, 4, CancellationToken::new());

        digger
            .dig_networks(&[NetworkDescriptor {
                label: "net_a".into(),
                labels: vec!["foo".into()],
            }])
            .await;
        digger.stop_wait().await;

        let mut placeholders = 0;
        let mut resolved = 0;
        while let Some(record) = news.recv().await {
            if record.is_placeholder() {
                placeholders += 1;
            } else {
                resolved += 1;
                assert_eq!(record.address.address, "10.0.0.2");
            }
        }
        assert_eq!(placeholders, 2); // foo.net_a. and foo.
        assert_eq!(resolved, 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_dig() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let resolver = MockResolver::new(HashMap::new());
        let (digger, mut news) = Digger::with_resolver(resolver, 1, cancel.clone());

        digger
            .dig_fqdns((0..32).map(|i| format!("name-{i}.net_a.")))
            .await;
        digger.stop_wait().await;

        // nothing gets emitted into a cancelled dig beyond what raced ahead
        let mut count = 0;
        while news.recv().await.is_some() {
            count += 1;
        }
        assert!(count <= 1, "cancelled dig emitted {count} records");
    }
}
