//! Bounded retry with a repair step between attempts.
//!
//! An operation is attempted once. When it fails, a repair step runs (for paperbot,
//! a cache check that fixes what it finds). Only if that step reports a change is the
//! operation attempted again, at most `max_retries` extra times:
//!
//! ```text
//! Attempt(1) -> Done
//! Attempt(1) -> CheckCache(1) -> Attempt(2) -> Done | Abandon
//! Attempt(1) -> CheckCache(1) -> Abandon
//! ```

use std::future::Future;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Attempt(usize),
    CheckCache(usize),
    Done,
    Abandon,
}

/// Why an operation was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    NothingRepaired,
    RetriesExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            max_retries: self.max_retries,
            step: Step::Attempt(1),
            reason: None,
        }
    }

    /// Drives `op` through the state machine, calling `hooks` at each transition.
    pub async fn run<T, F, Fut, H>(&self, mut op: F, hooks: &H) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        H: RetryHooks + ?Sized,
    {
        let mut state = self.start();

        loop {
            let attempt = state.attempt();
            let error = match op().await {
                Ok(value) => {
                    state.succeeded();
                    return Outcome::Done { value, attempts: attempt };
                }
                Err(error) => error,
            };

            hooks.on_failure(attempt, &error).await;

            if let Step::CheckCache(_) = state.failed() {
                let repaired = hooks.repair().await;
                if let Step::Attempt(next) = state.checked(repaired) {
                    debug!("Retrying, attempt {}", next);
                    hooks.on_retry(next).await;
                    continue;
                }
            }

            let reason = state.reason().unwrap_or(AbandonReason::RetriesExhausted);
            hooks.on_abandon(reason, &error).await;
            return Outcome::Abandoned { error, attempts: attempt, reason };
        }
    }
}

/// Position of one operation in the retry state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    max_retries: usize,
    step: Step,
    reason: Option<AbandonReason>,
}

impl RetryState {
    pub fn step(&self) -> Step {
        self.step
    }

    pub fn reason(&self) -> Option<AbandonReason> {
        self.reason
    }

    /// Number of the current (or last) attempt
    pub fn attempt(&self) -> usize {
        match self.step {
            Step::Attempt(n) | Step::CheckCache(n) => n,
            Step::Done | Step::Abandon => 0,
        }
    }

    pub fn succeeded(&mut self) -> Step {
        if let Step::Attempt(_) = self.step {
            self.step = Step::Done;
        }
        self.step
    }

    pub fn failed(&mut self) -> Step {
        if let Step::Attempt(n) = self.step {
            if n <= self.max_retries {
                self.step = Step::CheckCache(n);
            } else {
                self.abandon(AbandonReason::RetriesExhausted);
            }
        }
        self.step
    }

    pub fn checked(&mut self, repaired: bool) -> Step {
        if let Step::CheckCache(n) = self.step {
            if repaired {
                self.step = Step::Attempt(n + 1);
            } else {
                self.abandon(AbandonReason::NothingRepaired);
            }
        }
        self.step
    }

    fn abandon(&mut self, reason: AbandonReason) {
        self.step = Step::Abandon;
        self.reason = Some(reason);
    }
}

#[derive(Debug)]
pub enum Outcome<T> {
    Done { value: T, attempts: usize },
    Abandoned { error: Error, attempts: usize, reason: AbandonReason },
}

impl<T> Outcome<T> {
    pub fn attempts(&self) -> usize {
        match self {
            Outcome::Done { attempts, .. } | Outcome::Abandoned { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Done { value, .. } => Ok(value),
            Outcome::Abandoned { error, .. } => Err(error),
        }
    }
}

/// Callbacks for [`RetryPolicy::run`]. Only `repair` is required.
#[async_trait]
pub trait RetryHooks: Send + Sync {
    async fn on_failure(&self, _attempt: usize, _error: &Error) {}

    /// Returns true when something was fixed and another attempt is worthwhile.
    async fn repair(&self) -> bool;

    async fn on_retry(&self, _attempt: usize) {}

    async fn on_abandon(&self, _reason: AbandonReason, _error: &Error) {}
}
