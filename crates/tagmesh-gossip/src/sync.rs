//! The gossip synchronizer: announce, want, deliver and watermark pull.
//!
//! An exchange initiated by [`Synchronizer::sync_with`] runs two phases
//! against one peer:
//!
//! 1. **Announce** the edges of our newest statements with their highest
//!    clock. The peer answers with the entries it lacks (`Want`) and we
//!    deliver exactly those statements (`Deliver`, answered by `Ack`).
//! 2. **Pull** everything the peer stored after our per-peer watermark,
//!    then advance the watermark.
//!
//! Every network step is bounded by the configured timeout. Received
//! statements are verified and inserted one by one, so an aborted exchange
//! never leaves a partial statement behind. Newly accepted statements
//! invalidate the subject's cached aggregate and are pushed on to a few
//! other peers. Pushes triggered by inbound messages run in background
//! tasks so a slow third peer never holds up a reply.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagmesh_ledger::{InsertOutcome, Ledger, LedgerError, Statement};
use tagmesh_net::{EdgeClock, MessageBody, NetError, PeerSampler, TagMessage, Transport};
use tagmesh_resolver::Resolver;
use tagmesh_types::{Edge, PROTOCOL_VERSION, PeerId};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::GossipConfig;
use crate::error::GossipError;
use crate::throttle::PeerThrottle;

type Result<T> = std::result::Result<T, GossipError>;

/// Outcome of one [`Synchronizer::sync_with`] exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Summary entries we announced.
    pub announced: usize,
    /// Statements the peer wanted and we delivered.
    pub delivered: usize,
    /// Statements received from the watermark pull.
    pub pulled: usize,
    /// Pulled statements newly stored.
    pub accepted: usize,
    /// Pulled statements we already held.
    pub duplicates: usize,
    /// Pulled statements dropped as invalid or uninteresting.
    pub rejected: usize,
    /// Our watermark for the peer after the exchange.
    pub watermark: u64,
}

/// Outcome of ingesting a batch of encoded statements.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Newly stored statements.
    pub accepted: Vec<Statement>,
    /// Statements already held.
    pub duplicates: usize,
    /// Statements dropped (undecodable, invalid, throttled or filtered).
    pub rejected: usize,
}

async fn bounded<T>(
    timeout: Duration,
    peer: PeerId,
    step: &'static str,
    fut: impl Future<Output = std::result::Result<T, NetError>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(GossipError::PeerTimeout { peer, step }),
    }
}

/// Pushes accepted statements on to sampled peers.
#[derive(Clone)]
struct Forwarder {
    transport: Arc<dyn Transport>,
    sampler: Arc<dyn PeerSampler>,
    fanout: usize,
    chunk_len: usize,
    timeout: Duration,
}

impl Forwarder {
    async fn forward(&self, origin: Option<PeerId>, statements: &[Statement]) {
        if self.fanout == 0 || statements.is_empty() {
            return;
        }
        let exclude: Vec<PeerId> = origin.into_iter().collect();
        let peers = self.sampler.sample(self.fanout, &exclude);

        for chunk in statements.chunks(self.chunk_len) {
            let msg = TagMessage::new(MessageBody::Push {
                statements: chunk.iter().map(Statement::encode).collect(),
            });
            for &peer in &peers {
                let sent = bounded(self.timeout, peer, "push", self.transport.send_to(peer, &msg));
                if let Err(e) = sent.await {
                    debug!(%peer, "failed to push statements: {e}");
                }
            }
        }
    }
}

/// Disseminates statements between this node's ledger and its peers.
pub struct Synchronizer {
    resolver: Arc<Resolver>,
    transport: Arc<dyn Transport>,
    sampler: Arc<dyn PeerSampler>,
    config: GossipConfig,
    throttle: PeerThrottle,
    forwarder: Forwarder,
    /// Pushes started on behalf of inbound messages.
    background: Mutex<JoinSet<()>>,
    /// Last arrival sequence pulled from each peer.
    watermarks: Mutex<HashMap<PeerId, u64>>,
    /// Entries of our latest `Want` to each peer. Statements answering
    /// them bypass the throttle.
    solicited: Mutex<HashMap<PeerId, HashSet<(Edge, u64)>>>,
}

impl Synchronizer {
    /// Create a synchronizer over the resolver's ledger.
    pub fn new(
        resolver: Arc<Resolver>,
        transport: Arc<dyn Transport>,
        sampler: Arc<dyn PeerSampler>,
        config: GossipConfig,
    ) -> Self {
        let throttle = PeerThrottle::new(config.max_statements_per_sec);
        let forwarder = Forwarder {
            transport: transport.clone(),
            sampler: sampler.clone(),
            fanout: config.forward_fanout,
            chunk_len: config.max_statements_per_message.max(1),
            timeout: config.timeout,
        };
        Self {
            resolver,
            transport,
            sampler,
            config,
            throttle,
            forwarder,
            background: Mutex::new(JoinSet::new()),
            watermarks: Mutex::new(HashMap::new()),
            solicited: Mutex::new(HashMap::new()),
        }
    }

    fn ledger(&self) -> &Ledger {
        self.resolver.ledger()
    }

    /// The configuration in use.
    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Our watermark for `peer` (0 if never pulled).
    pub fn watermark(&self, peer: &PeerId) -> u64 {
        self.watermarks
            .lock()
            .expect("watermark lock poisoned")
            .get(peer)
            .copied()
            .unwrap_or(0)
    }

    fn set_watermark(&self, peer: PeerId, watermark: u64) {
        self.watermarks
            .lock()
            .expect("watermark lock poisoned")
            .insert(peer, watermark);
    }

    fn solicit(&self, peer: PeerId, entries: &[EdgeClock]) {
        let wanted = entries.iter().map(|e| (e.edge(), e.clock)).collect();
        self.solicited
            .lock()
            .expect("solicited lock poisoned")
            .insert(peer, wanted);
    }

    /// For each statement, whether it answers our `Want` to `peer`.
    /// Matched entries are consumed.
    fn take_solicited(&self, peer: PeerId, statements: &[Statement]) -> Vec<bool> {
        let mut solicited = self.solicited.lock().expect("solicited lock poisoned");
        match solicited.get_mut(&peer) {
            Some(wanted) => statements
                .iter()
                .map(|s| wanted.remove(&(s.edge(), s.clock)))
                .collect(),
            None => vec![false; statements.len()],
        }
    }

    // -------------------------------------------------------------------
    // Summaries
    // -------------------------------------------------------------------

    /// Edges of the newest stored statements, each with the highest clock
    /// held for it.
    pub fn summary(&self) -> Result<Vec<EdgeClock>> {
        let ledger = self.ledger();
        let mut seen = HashSet::new();
        let mut summary = Vec::new();

        for statement in ledger.latest(self.config.announce_limit)?.into_iter().rev() {
            let edge = statement.edge();
            if !seen.insert(edge.key()) {
                continue;
            }
            let clock = ledger.max_clock(&edge)?.unwrap_or(statement.clock);
            summary.push(EdgeClock {
                subject: edge.subject,
                predicate: edge.predicate,
                author: edge.author,
                object: edge.object,
                clock,
            });
        }
        Ok(summary)
    }

    /// Entries of a remote summary that carry a clock we have not seen.
    pub fn wanted(&self, summary: &[EdgeClock]) -> Result<Vec<EdgeClock>> {
        let mut wanted = Vec::new();
        for entry in summary {
            if wanted.len() >= self.config.max_statements_per_message {
                break;
            }
            if !self.config.is_interested(&entry.subject) {
                continue;
            }
            let local = self.ledger().max_clock(&entry.edge())?;
            if local.is_none_or(|clock| clock < entry.clock) {
                wanted.push(entry.clone());
            }
        }
        Ok(wanted)
    }

    fn encode_wanted(&self, entries: &[EdgeClock]) -> Result<Vec<Vec<u8>>> {
        let mut statements = Vec::new();
        for entry in entries.iter().take(self.config.max_statements_per_message) {
            match self.ledger().encoded(&entry.edge(), entry.clock)? {
                Some(bytes) => statements.push(bytes),
                None => debug!(edge = %entry.edge(), clock = entry.clock, "wanted statement not held"),
            }
        }
        Ok(statements)
    }

    // -------------------------------------------------------------------
    // Inbound statements
    // -------------------------------------------------------------------

    /// Verify and store encoded statements received from `from`.
    ///
    /// With `throttled`, statements we did not ask `from` for are charged
    /// to the peer's rate budget and dropped once it runs out. Invalid
    /// statements are dropped and logged. A storage failure aborts the
    /// batch; statements stored before it stay stored.
    pub async fn ingest(
        &self,
        from: PeerId,
        statements: Vec<Vec<u8>>,
        throttled: bool,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let offered = statements.len();
        let allowed = offered.min(self.config.max_statements_per_message);
        report.rejected += offered - allowed;

        let mut decoded = Vec::with_capacity(allowed);
        for bytes in statements.into_iter().take(allowed) {
            match Statement::decode(&bytes) {
                Ok(s) => decoded.push(s),
                Err(e) => {
                    warn!(%from, "dropping undecodable statement: {e}");
                    report.rejected += 1;
                }
            }
        }

        if throttled {
            let solicited = self.take_solicited(from, &decoded);
            let unsolicited = solicited.iter().filter(|wanted| !**wanted).count();
            let mut budget = self.throttle.take(from, unsolicited).await;
            let before = decoded.len();
            decoded = decoded
                .into_iter()
                .zip(solicited)
                .filter(|(_, wanted)| {
                    if *wanted {
                        return true;
                    }
                    let keep = budget > 0;
                    budget = budget.saturating_sub(1);
                    keep
                })
                .map(|(s, _)| s)
                .collect();
            report.rejected += before - decoded.len();
        }

        for statement in decoded {
            if !self.config.is_interested(&statement.subject) {
                debug!(%from, subject = %statement.subject, "dropping statement outside interest");
                report.rejected += 1;
                continue;
            }

            match self.ledger().insert(&statement) {
                Ok(InsertOutcome::Inserted { .. }) => {
                    self.resolver.invalidate(&statement.subject);
                    report.accepted.push(statement);
                }
                Ok(InsertOutcome::DuplicateIgnored) => report.duplicates += 1,
                Err(e @ LedgerError::Storage(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(
                        %from,
                        subject = %statement.subject,
                        clock = statement.clock,
                        "rejected statement: {e}"
                    );
                    report.rejected += 1;
                }
            }
        }

        if !report.accepted.is_empty() {
            debug!(
                %from,
                accepted = report.accepted.len(),
                duplicates = report.duplicates,
                rejected = report.rejected,
                "ingested statements"
            );
        }
        Ok(report)
    }

    // -------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------

    async fn step<T>(
        &self,
        peer: PeerId,
        step: &'static str,
        fut: impl Future<Output = std::result::Result<T, NetError>>,
    ) -> Result<T> {
        bounded(self.config.timeout, peer, step, fut).await
    }

    /// Push statements to up to `forward_fanout` sampled peers, skipping
    /// `origin`. Failures are logged and otherwise ignored.
    pub async fn forward(&self, origin: Option<PeerId>, statements: &[Statement]) {
        self.forwarder.forward(origin, statements).await;
    }

    /// Start forwarding statements received from `origin` without
    /// waiting for it.
    fn forward_in_background(&self, origin: PeerId, statements: Vec<Statement>) {
        if self.forwarder.fanout == 0 || statements.is_empty() {
            return;
        }
        let forwarder = self.forwarder.clone();
        let mut tasks = self.background.lock().expect("background lock poisoned");
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { forwarder.forward(Some(origin), &statements).await });
    }

    /// Wait for every background push started so far. Returns whether
    /// any was still tracked.
    pub async fn flush(&self) -> bool {
        let mut tasks = {
            let mut background = self.background.lock().expect("background lock poisoned");
            std::mem::take(&mut *background)
        };
        let pending = !tasks.is_empty();
        while tasks.join_next().await.is_some() {}
        pending
    }

    /// Announce freshly created local statements.
    pub async fn publish(&self, statements: &[Statement]) {
        self.forward(None, statements).await;
    }

    /// Run one full exchange (announce, then pull) with `peer`.
    pub async fn sync_with(&self, peer: PeerId) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        // Announce / want / deliver.
        let summary = self.summary()?;
        report.announced = summary.len();
        if !summary.is_empty() {
            let announce = TagMessage::new(MessageBody::Announce { summary });
            let reply = self
                .step(peer, "announce", self.transport.request(peer, &announce))
                .await?;
            let entries = match accept_reply(reply)? {
                MessageBody::Want { entries } => entries,
                other => return Err(unexpected("want", &other)),
            };

            let statements = self.encode_wanted(&entries)?;
            if !statements.is_empty() {
                report.delivered = statements.len();
                let deliver = TagMessage::new(MessageBody::Deliver { statements });
                let reply = self
                    .step(peer, "deliver", self.transport.request(peer, &deliver))
                    .await?;
                match accept_reply(reply)? {
                    MessageBody::Ack { rejected, .. } if rejected > 0 => {
                        debug!(%peer, rejected, "peer rejected delivered statements");
                    }
                    MessageBody::Ack { .. } => {}
                    other => return Err(unexpected("ack", &other)),
                }
            }
        }

        // Watermark pull. Never ask for more than one message may carry,
        // or the watermark would skip statements we could not ingest.
        let since = self.watermark(&peer);
        let limit = self
            .config
            .pull_limit
            .min(self.config.max_statements_per_message);
        let pull = TagMessage::new(MessageBody::Pull {
            since,
            limit: u32::try_from(limit).unwrap_or(u32::MAX),
        });
        let reply = self
            .step(peer, "pull", self.transport.request(peer, &pull))
            .await?;
        let (statements, watermark) = match accept_reply(reply)? {
            MessageBody::PullResponse {
                statements,
                watermark,
                ..
            } => (statements, watermark),
            other => return Err(unexpected("pull_response", &other)),
        };
        if statements.len() > limit {
            return Err(GossipError::Protocol(format!(
                "pull response carries {} statements, asked for at most {limit}",
                statements.len()
            )));
        }

        report.pulled = statements.len();
        let ingested = self.ingest(peer, statements, false).await?;
        report.accepted = ingested.accepted.len();
        report.duplicates = ingested.duplicates;
        report.rejected = ingested.rejected;

        self.set_watermark(peer, watermark);
        report.watermark = watermark;

        self.forward(Some(peer), &ingested.accepted).await;
        Ok(report)
    }

    /// Exchange with `peers_per_round` sampled peers, one after another.
    pub async fn round(&self) -> Vec<(PeerId, Result<SyncReport>)> {
        let peers = self.sampler.sample(self.config.peers_per_round, &[]);
        let mut results = Vec::with_capacity(peers.len());
        for peer in peers {
            let result = self.sync_with(peer).await;
            match &result {
                Ok(report) => debug!(%peer, ?report, "gossip exchange complete"),
                Err(e) => warn!(%peer, "gossip exchange failed, will retry: {e}"),
            }
            results.push((peer, result));
        }
        results
    }

    /// Run gossip rounds every `interval` until the task is dropped.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        info!(interval_ms = interval.as_millis() as u64, "gossip loop started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.round().await;
        }
    }

    // -------------------------------------------------------------------
    // Inbound messages
    // -------------------------------------------------------------------

    /// Answer a message received from `from`.
    ///
    /// Requests (`Announce`, `Deliver`, `Pull`) always get a response;
    /// one-way `Push` and unsolicited replies get `None`.
    pub async fn handle_message(&self, from: PeerId, msg: TagMessage) -> Option<TagMessage> {
        if msg.version != PROTOCOL_VERSION {
            warn!(%from, theirs = msg.version, "refusing message with other protocol version");
            return Some(refused(format!(
                "protocol version mismatch: ours {PROTOCOL_VERSION}, theirs {}",
                msg.version
            )));
        }

        let kind = msg.kind();
        match msg.body {
            MessageBody::Announce { summary } => Some(match self.wanted(&summary) {
                Ok(entries) => {
                    self.solicit(from, &entries);
                    TagMessage::new(MessageBody::Want { entries })
                }
                Err(e) => {
                    warn!(%from, "failed to answer announce: {e}");
                    refused(e.to_string())
                }
            }),
            MessageBody::Deliver { statements } => {
                match self.ingest(from, statements, true).await {
                    Ok(report) => {
                        let ack = TagMessage::new(MessageBody::Ack {
                            accepted: report.accepted.len() as u32,
                            duplicates: report.duplicates as u32,
                            rejected: report.rejected as u32,
                        });
                        self.forward_in_background(from, report.accepted);
                        Some(ack)
                    }
                    Err(e) => {
                        warn!(%from, "failed to ingest delivery: {e}");
                        Some(refused(e.to_string()))
                    }
                }
            }
            MessageBody::Push { statements } => {
                match self.ingest(from, statements, true).await {
                    Ok(report) => self.forward_in_background(from, report.accepted),
                    Err(e) => warn!(%from, "failed to ingest push: {e}"),
                }
                None
            }
            MessageBody::Pull { since, limit } => Some(match self.serve_pull(since, limit) {
                Ok(body) => TagMessage::new(body),
                Err(e) => {
                    warn!(%from, "failed to serve pull: {e}");
                    refused(e.to_string())
                }
            }),
            _ => {
                debug!(%from, kind, "ignoring unsolicited message");
                None
            }
        }
    }

    fn serve_pull(&self, since: u64, limit: u32) -> Result<MessageBody> {
        let ledger = self.ledger();
        let last = ledger.last_seq();
        // A watermark past our log means the requester saw an older store.
        let since = if since > last { 0 } else { since };
        let limit = (limit as usize)
            .min(self.config.pull_limit)
            .min(self.config.max_statements_per_message);

        let rows = ledger.statements_since(since, limit)?;
        let watermark = rows.last().map_or(since, |(seq, _)| *seq);
        Ok(MessageBody::PullResponse {
            statements: rows.iter().map(|(_, s)| s.encode()).collect(),
            watermark,
            more: watermark < last,
        })
    }
}

fn refused(reason: String) -> TagMessage {
    TagMessage::new(MessageBody::Refused { reason })
}

fn accept_reply(reply: TagMessage) -> Result<MessageBody> {
    if reply.version != PROTOCOL_VERSION {
        return Err(GossipError::VersionMismatch {
            ours: PROTOCOL_VERSION,
            theirs: reply.version,
        });
    }
    match reply.body {
        MessageBody::Refused { reason } => Err(GossipError::Protocol(format!("refused: {reason}"))),
        body => Ok(body),
    }
}

fn unexpected(expected: &str, got: &MessageBody) -> GossipError {
    GossipError::Protocol(format!("expected {expected}, got {}", got.kind()))
}
