use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use num::bigint::BigUint;

use crate::config::AttackConfig;
use crate::error::AbortReason;
use crate::handle::{CancelToken, Event, Reporter};
use crate::key::PublicKey;
use crate::oracle::{Oracle, QueryOutcome};

// Longest wait between cancellation checks while probes are in flight
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a search stopped without a result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Halt {
    Cancelled,
    Abort(AbortReason),
}

impl From<AbortReason> for Halt {
    fn from(reason: AbortReason) -> Self {
        Halt::Abort(reason)
    }
}

/// Issues oracle queries on behalf of the attack session
///
/// Owns the query counter, and applies the retry, timeout and budget policies.
pub(crate) struct Scheduler {
    key: PublicKey,
    oracle: Arc<dyn Oracle>,
    config: AttackConfig,
    cancel: CancelToken,
    reporter: Reporter,
    pool: WorkerPool,
    queries: u64,
}

// Reply from an oracle worker
struct Reply {
    idx: usize,
    ticket: u64,
    outcome: QueryOutcome,
}

// Probe awaiting its reply
struct Pending {
    s: BigUint,
    ciphertext: Arc<Vec<u8>>,
    failures: u32,
    ticket: u64,
    deadline: Option<Instant>,
}

// Query handed to a worker
struct Job {
    idx: usize,
    ticket: u64,
    s: BigUint,
    ciphertext: Arc<Vec<u8>>,
    reply: Sender<Reply>,
}

/// Worker threads querying the oracle off the attack thread
///
/// Workers start on demand up to `max_workers` and are reused across
/// searches. Past the limit, jobs queue until a worker frees up. Workers exit
/// once the pool is dropped and their current query returns.
struct WorkerPool {
    oracle: Arc<dyn Oracle>,
    jobs: Sender<Job>,
    queue: Arc<Mutex<Receiver<Job>>>,
    // idle workers less queued jobs
    idle: Arc<AtomicIsize>,
    workers: usize,
    max_workers: usize,
}

impl WorkerPool {
    fn new(oracle: Arc<dyn Oracle>, max_workers: usize) -> Self {
        let (jobs, queue) = mpsc::channel();

        Self {
            oracle,
            jobs,
            queue: Arc::new(Mutex::new(queue)),
            idle: Arc::new(AtomicIsize::new(0)),
            workers: 0,
            max_workers,
        }
    }

    fn submit(&mut self, job: Job) {
        let idle = self.idle.fetch_sub(1, Ordering::SeqCst);
        if idle <= 0 && self.workers < self.max_workers {
            self.spawn_worker();
        }

        // the pool holds the receiving end, sending cannot fail
        let _ = self.jobs.send(job);
    }

    fn spawn_worker(&mut self) {
        let oracle = Arc::clone(&self.oracle);
        let queue = Arc::clone(&self.queue);
        let idle = Arc::clone(&self.idle);

        self.idle.fetch_add(1, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name(format!("oracle-{}", self.workers))
            .spawn(move || loop {
                let job = match queue.lock() {
                    Ok(guard) => guard.recv(),
                    Err(_) => break,
                };
                let job = match job {
                    Ok(job) => job,
                    Err(_) => break,
                };

                let response = oracle.probe(&job.ciphertext);

                // free before replying, the scheduler may submit as soon as it hears back
                idle.fetch_add(1, Ordering::SeqCst);
                let _ = job.reply.send(Reply {
                    idx: job.idx,
                    ticket: job.ticket,
                    outcome: QueryOutcome::new(job.s, response),
                });
            });

        match spawned {
            Ok(_) => {
                self.workers += 1;
                debug!("started oracle worker {} of {}", self.workers, self.max_workers);
            }
            Err(err) => {
                self.idle.fetch_sub(1, Ordering::SeqCst);
                warn!("failed to start oracle worker: {}", err);
            }
        }
    }
}

impl Scheduler {
    pub fn new(
        key: PublicKey,
        oracle: Arc<dyn Oracle>,
        config: AttackConfig,
        cancel: CancelToken,
        reporter: Reporter,
    ) -> Self {
        // enough workers for every window slot to retry while earlier attempts hang
        let max_workers = config
            .parallel_window_size
            .saturating_mul(1 + config.probe_retries as usize);
        let pool = WorkerPool::new(Arc::clone(&oracle), max_workers);

        Self {
            key,
            oracle,
            config,
            cancel,
            reporter,
            pool,
            queries: 0,
        }
    }

    /// Number of queries issued so far, retries included
    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// Probe a single multiplier against `base`
    pub fn probe(&mut self, base: &BigUint, s: &BigUint) -> Result<bool, Halt> {
        let found = self.search(base, core::iter::once(s.clone()))?;
        Ok(found.is_some())
    }

    /// Probe `base * s**e mod n` for each candidate `s`, in order
    ///
    /// Returns the first conforming candidate in iteration order, or None if
    /// the candidates run out first. With a window larger than one, later
    /// candidates are probed speculatively, but a conforming answer is only
    /// accepted once every earlier candidate has been answered.
    pub fn search<I>(&mut self, base: &BigUint, candidates: I) -> Result<Option<BigUint>, Halt>
    where
        I: Iterator<Item = BigUint>,
    {
        if self.config.is_inline() {
            self.search_inline(base, candidates)
        } else {
            self.search_windowed(base, candidates)
        }
    }

    fn search_inline<I>(&mut self, base: &BigUint, candidates: I) -> Result<Option<BigUint>, Halt>
    where
        I: Iterator<Item = BigUint>,
    {
        for s in candidates {
            let ciphertext = self.key.to_octets(&self.key.blind(base, &s));
            let mut failures = 0_u32;

            loop {
                self.check_cancel()?;
                if !self.charge() {
                    return Err(AbortReason::QueryBudgetExceeded.into());
                }

                trace!("probing s = {}", s);
                let response = self.oracle.probe(&ciphertext);

                match QueryOutcome::new(s.clone(), response) {
                    QueryOutcome::Conforming(s) => return Ok(Some(s)),
                    QueryOutcome::NotConforming(_) => break,
                    QueryOutcome::TransportFailure(reason) => {
                        failures += 1;
                        self.note_failure(&reason, failures)?;
                    }
                }
            }
        }

        Ok(None)
    }

    fn search_windowed<I>(&mut self, base: &BigUint, candidates: I) -> Result<Option<BigUint>, Halt>
    where
        I: Iterator<Item = BigUint>,
    {
        let (tx, rx) = mpsc::channel::<Reply>();
        let mut candidates = candidates.enumerate();

        let mut pending: BTreeMap<usize, Pending> = BTreeMap::new();
        // answered non-conforming, above the frontier
        let mut rejected: BTreeSet<usize> = BTreeSet::new();
        // every candidate below the frontier answered non-conforming
        let mut frontier = 0_usize;
        let mut winner: Option<(usize, BigUint)> = None;
        let mut drained = false;
        let mut budget_spent = false;
        let mut next_ticket = 0_u64;

        loop {
            self.check_cancel()?;

            if winner.as_ref().map_or(false, |(idx, _)| *idx == frontier) {
                return Ok(winner.map(|(_, s)| s));
            }

            // keep the window full, but never probe past a confirmed winner
            while !drained && winner.is_none() && pending.len() < self.config.parallel_window_size {
                match candidates.next() {
                    None => drained = true,
                    Some((idx, s)) => {
                        if !self.charge() {
                            drained = true;
                            budget_spent = true;
                            break;
                        }

                        let ciphertext = Arc::new(self.key.to_octets(&self.key.blind(base, &s)));
                        let entry = Pending {
                            s,
                            ciphertext,
                            failures: 0,
                            ticket: next_ticket,
                            deadline: None,
                        };
                        next_ticket += 1;
                        pending.insert(idx, self.dispatch(idx, entry, &tx));
                    }
                }
            }

            if pending.is_empty() {
                if budget_spent {
                    return Err(AbortReason::QueryBudgetExceeded.into());
                }
                // exhausted candidates with nothing conforming, or a winner settled above
                return Ok(winner.map(|(_, s)| s));
            }

            let failed = match self.wait(&rx, &pending) {
                Some(Reply { idx, ticket, outcome }) => {
                    let current = pending.get(&idx).map_or(false, |p| p.ticket == ticket);

                    if !current {
                        trace!("discarding stale reply for candidate {}", idx);
                        continue;
                    }

                    match outcome {
                        QueryOutcome::Conforming(s) => {
                            pending.remove(&idx);

                            let better = winner.as_ref().map_or(true, |(w, _)| idx < *w);
                            if better {
                                trace!("candidate {} conforming, s = {}", idx, s);
                                // abandon speculative probes past the new winner
                                let abandoned = pending.split_off(&idx);
                                if !abandoned.is_empty() {
                                    debug!("abandoning {} probes past candidate {}", abandoned.len(), idx);
                                }
                                winner = Some((idx, s));
                            }
                            Vec::new()
                        }
                        QueryOutcome::NotConforming(_) => {
                            pending.remove(&idx);
                            rejected.insert(idx);
                            while rejected.remove(&frontier) {
                                frontier += 1;
                            }
                            Vec::new()
                        }
                        QueryOutcome::TransportFailure(reason) => [(idx, reason)].to_vec(),
                    }
                }
                None => {
                    let now = Instant::now();
                    pending
                        .iter()
                        .filter(|(_, p)| p.deadline.map_or(false, |d| d <= now))
                        .map(|(&idx, _)| (idx, String::from("timed out")))
                        .collect()
                }
            };

            for (idx, reason) in failed {
                if let Some(mut entry) = pending.remove(&idx) {
                    entry.failures += 1;
                    self.note_failure(&reason, entry.failures)?;

                    if !self.charge() {
                        return Err(AbortReason::QueryBudgetExceeded.into());
                    }

                    entry.ticket = next_ticket;
                    next_ticket += 1;
                    pending.insert(idx, self.dispatch(idx, entry, &tx));
                }
            }
        }
    }

    // Hand one query to the worker pool, the reply comes back through `tx`
    fn dispatch(&mut self, idx: usize, mut entry: Pending, tx: &Sender<Reply>) -> Pending {
        trace!("probing s = {} (candidate {}, ticket {})", entry.s, idx, entry.ticket);

        // a timed-out query keeps its worker until the oracle returns, its reply is then dropped
        self.pool.submit(Job {
            idx,
            ticket: entry.ticket,
            s: entry.s.clone(),
            ciphertext: Arc::clone(&entry.ciphertext),
            reply: tx.clone(),
        });

        entry.deadline = self.config.probe_timeout.map(|t| Instant::now() + t);
        entry
    }

    // Wait for the next reply, None when the earliest deadline or the poll interval passes
    fn wait(&self, rx: &Receiver<Reply>, pending: &BTreeMap<usize, Pending>) -> Option<Reply> {
        let now = Instant::now();
        let timeout = pending
            .values()
            .filter_map(|p| p.deadline)
            .min()
            .map(|d| d.saturating_duration_since(now))
            .map_or(POLL_INTERVAL, |d| d.min(POLL_INTERVAL));

        match rx.recv_timeout(timeout) {
            Ok(reply) => Some(reply),
            // the scheduler holds a sender, so the channel never disconnects
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    // Count a query against the budget, false once the budget is spent
    fn charge(&mut self) -> bool {
        if self.queries >= self.config.max_queries {
            return false;
        }

        self.queries += 1;
        if self.queries % self.config.progress_interval == 0 {
            self.reporter.emit(Event::QueriesIssued(self.queries));
        }

        true
    }

    fn note_failure(&self, reason: &str, failures: u32) -> Result<(), Halt> {
        if failures > self.config.probe_retries {
            warn!("probe failed {} times ({}), giving up", failures, reason);
            return Err(AbortReason::OracleUnreachable.into());
        }

        warn!("probe failed ({}), retry {} of {}", reason, failures, self.config.probe_retries);
        Ok(())
    }

    fn check_cancel(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        Ok(())
    }
}
