use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryIter};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::AttackConfig;
use crate::error::Error;
use crate::key::{Ciphertext, PublicKey};
use crate::oracle::Oracle;
use crate::session::{AttackResult, AttackSession, Phase};

/// Progress notifications, for display only
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    PhaseChanged(Phase),
    QueriesIssued(u64),
    IntervalCount(usize),
}

/// Shared flag asking a running attack to stop
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// Sends progress events, silently dropping them when nobody listens
#[derive(Clone, Debug, Default)]
pub(crate) struct Reporter(Option<Sender<Event>>);

impl Reporter {
    pub fn new(tx: Sender<Event>) -> Self {
        Self(Some(tx))
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

/// Handle on an attack running on its own thread
pub struct AttackHandle {
    cancel: CancelToken,
    events: Receiver<Event>,
    worker: JoinHandle<AttackResult>,
}

impl AttackHandle {
    /// Ask the attack to stop, no new probes are issued once it notices
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token cancelling this attack, for use from other threads
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Progress events received so far, without blocking
    pub fn events(&self) -> TryIter<'_, Event> {
        self.events.try_iter()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the attack terminates
    ///
    /// A panic on the attack thread is resumed on the caller's thread
    pub fn await_result(self) -> AttackResult {
        self.finish().0
    }

    /// Block until the attack terminates, also returning the undelivered events
    pub fn finish(self) -> (AttackResult, Vec<Event>) {
        let result = match self.worker.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        };

        (result, self.events.try_iter().collect())
    }
}

/// Start a Bleichenbacher attack on a new thread
///
/// The oracle is shared with probe threads when the configuration asks for
/// timeouts or a speculative window.
pub fn start_attack<O>(
    key: PublicKey,
    ciphertext: Ciphertext,
    oracle: O,
    config: AttackConfig,
) -> Result<AttackHandle, Error>
where
    O: Oracle + 'static,
{
    check_inputs(&key, &ciphertext, &config)?;

    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel();
    let session = AttackSession::new(
        key,
        ciphertext,
        Arc::new(oracle),
        config,
        cancel.clone(),
        Reporter::new(tx),
    );

    let worker = thread::Builder::new()
        .name("bleichenbacher".into())
        .spawn(move || session.run())?;

    Ok(AttackHandle {
        cancel,
        events: rx,
        worker,
    })
}

/// Run a Bleichenbacher attack on the calling thread
///
/// `cancel` may be triggered from another thread. Progress events go to
/// `events` if given.
pub fn run_attack<O>(
    key: PublicKey,
    ciphertext: Ciphertext,
    oracle: O,
    config: AttackConfig,
    cancel: &CancelToken,
    events: Option<Sender<Event>>,
) -> Result<AttackResult, Error>
where
    O: Oracle + 'static,
{
    check_inputs(&key, &ciphertext, &config)?;

    let reporter = events.map(Reporter::new).unwrap_or_default();
    let session = AttackSession::new(
        key,
        ciphertext,
        Arc::new(oracle),
        config,
        cancel.clone(),
        reporter,
    );

    Ok(session.run())
}

fn check_inputs(key: &PublicKey, ciphertext: &Ciphertext, config: &AttackConfig) -> Result<(), Error> {
    config.validate()?;

    // the ciphertext may have been checked against a different key
    if ciphertext.value() >= key.n() {
        return Err(Error::CiphertextOutOfRange);
    }

    Ok(())
}
