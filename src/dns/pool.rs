//! DNS client connection pool
//!
//! A fixed-size pool of long-lived TCP connections to one resolver endpoint.
//! The connections are dialed up front, inside the target network namespace
//! when one is configured; a socket keeps its namespace for its lifetime, so
//! the pooled connections can afterwards be driven from any runtime thread.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dns::{NameResolver, ResolveCallback, ResolveOutcome};
use crate::error::ResolveError;
use crate::netns::{self, NetnsRef};

/// A pooled DNS client connection. Queries are exchanged over TCP with the
/// standard two-byte length framing, since answer sets can exceed a single
/// UDP datagram.
pub struct DnsConn {
    stream: TcpStream,
}

impl DnsConn {
    async fn exchange(&mut self, query: &Message) -> Result<Message, ResolveError> {
        let wire = query
            .to_vec()
            .map_err(|e| ResolveError::Protocol(e.to_string()))?;
        self.stream
            .write_all(&(wire.len() as u16).to_be_bytes())
            .await
            .map_err(|e| ResolveError::Query(e.to_string()))?;
        self.stream
            .write_all(&wire)
            .await
            .map_err(|e| ResolveError::Query(e.to_string()))?;

        let mut lenbuf = [0u8; 2];
        self.stream
            .read_exact(&mut lenbuf)
            .await
            .map_err(|e| ResolveError::Query(e.to_string()))?;
        let mut buf = vec![0u8; u16::from_be_bytes(lenbuf) as usize];
        self.stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| ResolveError::Query(e.to_string()))?;
        Message::from_vec(&buf).map_err(|e| ResolveError::Protocol(e.to_string()))
    }
}

/// A task submitted through [`ResolverPool::submit`], receiving exclusive use
/// of one pooled connection.
pub type ConnTask = Box<dyn for<'a> FnOnce(&'a mut DnsConn) -> BoxFuture<'a, ()> + Send>;

enum Job {
    Resolve { name: String, done: ResolveCallback },
    Raw(ConnTask),
}

/// Size-limited pool of DNS client connections talking to the same resolver
/// endpoint. One worker task per connection consumes an unbounded job queue,
/// so submissions never block.
#[derive(Debug)]
pub struct ResolverPool {
    queue: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl ResolverPool {
    /// Dials `size` connections to `resolver` and starts the workers. When a
    /// namespace is given, all dials run inside it on a pinned thread. If any
    /// dial fails, the connections dialed so far are closed again and the
    /// pool construction fails.
    pub async fn new(
        size: usize,
        resolver: &str,
        netns: Option<&NetnsRef>,
        cancel: CancellationToken,
    ) -> Result<Self, ResolveError> {
        let addr: SocketAddr = resolver.parse().map_err(|_| ResolveError::Dial {
            addr: resolver.to_string(),
            reason: "not a socket address".into(),
        })?;

        let dial = move || -> Result<Vec<std::net::TcpStream>, ResolveError> {
            let mut conns = Vec::with_capacity(size);
            for _ in 0..size {
                match std::net::TcpStream::connect(addr) {
                    Ok(conn) => conns.push(conn),
                    // dropping `conns` closes the connections dialed so far
                    Err(e) => {
                        return Err(ResolveError::Dial {
                            addr: addr.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
            Ok(conns)
        };
        let conns = netns::execute(netns, dial)
            .await
            .map_err(|e| ResolveError::Dial {
                addr: addr.to_string(),
                reason: e.to_string(),
            })??;
        debug!("dialed {} DNS connections to {}", conns.len(), addr);

        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(size);
        for conn in conns {
            conn.set_nonblocking(true)
                .map_err(|e| ResolveError::Dial {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })?;
            let stream = TcpStream::from_std(conn).map_err(|e| ResolveError::Dial {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
            workers.push(tokio::spawn(worker_loop(
                DnsConn { stream },
                Arc::clone(&rx),
                cancel.clone(),
            )));
        }
        Ok(Self { queue: tx, workers })
    }

    /// Submits a task that gets an exclusive connection once a worker is
    /// free. Never blocks; the queue is unbounded.
    pub fn submit(&self, task: ConnTask) {
        let _ = self.queue.send(Job::Raw(task));
    }
}

impl NameResolver for ResolverPool {
    fn resolve_name(&self, name: &str, done: ResolveCallback) {
        let _ = self.queue.send(Job::Resolve {
            name: name.to_string(),
            done,
        });
    }

    async fn stop_wait(self) {
        // Closing the queue lets the workers drain what is left and then
        // exit, dropping (and thereby closing) their connections.
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(
    mut conn: DnsConn,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = queue.lock().await.recv().await;
        match job {
            Some(Job::Resolve { name, done }) => {
                let outcome = resolve_on(&mut conn, &name, &cancel).await;
                done(outcome).await;
            }
            Some(Job::Raw(task)) => task(&mut conn).await,
            None => return,
        }
    }
}

/// Resolves one name into its A and AAAA addresses, querying sequentially
/// over the same connection so that A records always precede AAAA records in
/// the result. Zero answers across both families count as failure: that
/// distinguishes an unknown name from a known name without addresses.
async fn resolve_on(
    conn: &mut DnsConn,
    name: &str,
    cancel: &CancellationToken,
) -> ResolveOutcome {
    let fqdn = Name::from_utf8(name).map_err(|e| ResolveError::Protocol(e.to_string()))?;
    let mut addrs = Vec::new();
    for rtype in [RecordType::A, RecordType::AAAA] {
        // don't dispatch another query once cancellation has been observed
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        let mut query = Message::new();
        query
            .set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(fqdn.clone(), rtype));
        let response = conn.exchange(&query).await?;
        for record in response.answers() {
            match record.data() {
                Some(RData::A(a)) => addrs.push(a.to_string()),
                Some(RData::AAAA(aaaa)) => addrs.push(aaaa.to_string()),
                _ => {}
            }
        }
    }
    if addrs.is_empty() {
        return Err(ResolveError::NoAnswers {
            name: name.to_string(),
        });
    }
    Ok(addrs)
}
