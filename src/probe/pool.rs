//! ICMP echo prober pool
//!
//! Unlike the DNS pool, which amortizes namespace switching by dialing its
//! connections once, every probe opens a fresh echo socket: ICMP sockets are
//! short-lived and must be bound to the target namespace's kernel state for
//! packet routing. The whole echo sequence therefore runs on a pinned thread
//! driving its own single-threaded runtime.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use surge_ping::{PingIdentifier, PingSequence, ICMP};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ConfigError, ProbeError};
use crate::netns::{self, NetnsRef};
use crate::probe::Prober;
use crate::types::{AddressRecord, Quality};

const ECHO_PAYLOAD: [u8; 56] = [0u8; 56];

#[derive(Debug, Clone)]
struct ProbeSettings {
    count: u16,
    interval: Duration,
    threshold_percent: u8,
    unprivileged: bool,
    netns: Option<NetnsRef>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            count: 3,
            interval: Duration::from_secs(1),
            threshold_percent: 50,
            unprivileged: false,
            netns: None,
        }
    }
}

struct ProbeJob {
    record: AddressRecord,
    settings: ProbeSettings,
}

/// Size-limited pool of ICMP echo probers. Verdicts stream to the channel
/// returned alongside the pool: first a `Verifying` notice per probed record,
/// then its terminal verdict. Under cancellation, zero, one or two verdicts
/// may appear for a given probe; non-cancelled probes always deliver exactly
/// two.
pub struct IcmpProberPool {
    settings: ProbeSettings,
    queue: mpsc::UnboundedSender<ProbeJob>,
    verdict_tx: mpsc::Sender<AddressRecord>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl IcmpProberPool {
    /// Creates a pool with `size` workers and a verdict channel of the same
    /// capacity. Defaults: 3 echoes, 1s apart, 50% reply threshold,
    /// privileged (raw-socket) mode, caller's own network namespace.
    pub fn new(size: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<AddressRecord>) {
        let (verdict_tx, verdict_rx) = mpsc::channel(size.max(1));
        let (queue, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..size)
            .map(|_| {
                tokio::spawn(worker_loop(
                    Arc::clone(&rx),
                    verdict_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        (
            Self {
                settings: ProbeSettings::default(),
                queue,
                verdict_tx,
                workers,
                cancel,
            },
            verdict_rx,
        )
    }

    /// Sets the number of echoes sent per probe.
    pub fn with_count(mut self, count: u16) -> Self {
        self.settings.count = count;
        self
    }

    /// Sets the pause between consecutive echoes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.settings.interval = interval;
        self
    }

    /// Sets the minimum percentage of replied echoes for an address to count
    /// as verified.
    pub fn with_threshold_percent(mut self, threshold: u8) -> Result<Self, ConfigError> {
        if threshold > 100 {
            return Err(ConfigError::OutOfRange {
                flag: "threshold",
                value: threshold.to_string(),
                range: "0..=100",
            });
        }
        self.settings.threshold_percent = threshold;
        Ok(self)
    }

    /// Switches to unprivileged datagram echoes instead of raw ICMP.
    pub fn with_unprivileged(mut self, unprivileged: bool) -> Self {
        self.settings.unprivileged = unprivileged;
        self
    }

    /// Probes from inside the referenced network namespace.
    pub fn in_network_namespace(mut self, netns: NetnsRef) -> Self {
        self.settings.netns = Some(netns);
        self
    }
}

impl Prober for IcmpProberPool {
    async fn probe(&self, record: AddressRecord) {
        // announce pending work before any packet is sent
        let pending = record.with_quality(Quality::Verifying, None);
        tokio::select! {
            _ = self.verdict_tx.send(pending) => {}
            _ = self.cancel.cancelled() => return,
        }
        let _ = self.queue.send(ProbeJob {
            record,
            settings: self.settings.clone(),
        });
    }

    async fn stop_wait(self) {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
        // all worker clones are gone by now; dropping the last sender closes
        // the verdict channel
        drop(self.verdict_tx);
    }
}

async fn worker_loop(
    queue: Arc<Mutex<mpsc::UnboundedReceiver<ProbeJob>>>,
    verdict_tx: mpsc::Sender<AddressRecord>,
    cancel: CancellationToken,
) {
    loop {
        let job = queue.lock().await.recv().await;
        match job {
            Some(job) => run_probe(job, &verdict_tx, &cancel).await,
            None => return,
        }
    }
}

/// Runs one echo sequence and delivers the terminal verdict. The delivery
/// races cancellation, so a cancelled probe's verdict may get dropped.
async fn run_probe(
    job: ProbeJob,
    verdict_tx: &mpsc::Sender<AddressRecord>,
    cancel: &CancellationToken,
) {
    let ProbeJob { record, settings } = job;
    let verdict = decide(&record, settings, cancel).await;
    tokio::select! {
        _ = verdict_tx.send(verdict) => {}
        _ = cancel.cancelled() => {}
    }
}

async fn decide(
    record: &AddressRecord,
    settings: ProbeSettings,
    cancel: &CancellationToken,
) -> AddressRecord {
    if cancel.is_cancelled() {
        return record.with_quality(Quality::Invalid, Some(ProbeError::Cancelled.to_string()));
    }
    let ip: IpAddr = match record.addr().parse() {
        Ok(ip) => ip,
        Err(_) => {
            return record.with_quality(
                Quality::Invalid,
                Some(ProbeError::BadAddress(record.addr().to_string()).to_string()),
            )
        }
    };

    let inner_cancel = cancel.clone();
    let ns = settings.netns.clone();
    let outcome = netns::execute(ns.as_ref(), move || {
        echo_blocking(&settings, ip, inner_cancel)
    })
    .await;
    match outcome {
        Ok(Ok(())) => record.with_quality(Quality::Verified, None),
        Ok(Err(probe_err)) => {
            debug!("probe of {ip} failed: {probe_err}");
            record.with_quality(Quality::Invalid, Some(probe_err.to_string()))
        }
        Err(ns_err) => record.with_quality(Quality::Invalid, Some(ns_err.to_string())),
    }
}

/// Drives the echo sequence to completion on the calling (pinned) thread.
/// The echo socket must be created on this thread, after the namespace
/// switch, so the sequence gets its own single-threaded runtime here.
fn echo_blocking(
    settings: &ProbeSettings,
    ip: IpAddr,
    cancel: CancellationToken,
) -> Result<(), ProbeError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ProbeError::Socket(e.to_string()))?;
    runtime.block_on(echo_sequence(settings, ip, cancel))
}

async fn echo_sequence(
    settings: &ProbeSettings,
    ip: IpAddr,
    cancel: CancellationToken,
) -> Result<(), ProbeError> {
    let mut config = surge_ping::Config::builder();
    if ip.is_ipv6() {
        config = config.kind(ICMP::V6);
    }
    if !settings.unprivileged {
        config = config.sock_type_hint(socket2::Type::RAW);
    }
    let client =
        surge_ping::Client::new(&config.build()).map_err(|e| ProbeError::Socket(e.to_string()))?;
    let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
    pinger.timeout(settings.interval);

    // always limit waiting for the last echo to get reflected (or not)
    let deadline =
        tokio::time::Instant::now() + settings.interval * (u32::from(settings.count) + 2);
    let mut received = 0u32;
    for seq in 0..settings.count {
        let sent_at = tokio::time::Instant::now();
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => break,
            reply = pinger.ping(PingSequence(seq), &ECHO_PAYLOAD) => reply,
        };
        if reply.is_ok() {
            received += 1;
        }
        if seq + 1 < settings.count {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
                _ = tokio::time::sleep(settings.interval.saturating_sub(sent_at.elapsed())) => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
    }
    if received < required_replies(settings.count, settings.threshold_percent) {
        return Err(ProbeError::Unreachable);
    }
    Ok(())
}

/// Minimum number of replies for a verified verdict; integer math leaves some
/// legroom, e.g. 3 echoes at 50% require a single reply.
fn required_replies(count: u16, threshold_percent: u8) -> u32 {
    u32::from(count) * u32::from(threshold_percent) / 100
}
