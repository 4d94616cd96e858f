//! A reusable guard for component start-up and tear-down.
//!
//! A [`StateMachine`] makes sure a component's start action and shutdown
//! action each run at most once, in order, and never concurrently with each
//! other. The lock is held while the guarded action runs, so the state check,
//! the action and the state update form one atomic step.

use crate::enums::State;
use std::future::Future;
use thiserror::Error;
use tokio::sync::Mutex;

/// A boxed, thread-safe error used to carry the failure of a guarded action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum TransitionError {
    /// The component is already in the state the transition would move it to.
    #[error("{component} is already {state}")]
    AlreadyAtEnd { component: String, state: State },

    #[error(
        "problem {verb} {component}: cannot transition to {wanted} because the current state is {current}, not {expected}"
    )]
    InvalidTransition {
        component: String,
        verb: &'static str,
        wanted: State,
        current: State,
        expected: State,
    },

    /// The guarded action itself failed. The state was left unchanged.
    #[error("problem {verb} {component}: {source}")]
    Action {
        component: String,
        verb: &'static str,
        #[source]
        source: BoxError,
    },
}

impl TransitionError {
    pub fn is_already_at_end(&self) -> bool {
        matches!(self, TransitionError::AlreadyAtEnd { .. })
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, TransitionError::InvalidTransition { .. })
    }
}

struct Verbs {
    past_tense: &'static str,
    present_participle: &'static str,
}

const START_VERBS: Verbs = Verbs {
    past_tense: "started",
    present_participle: "starting",
};

const SHUTDOWN_VERBS: Verbs = Verbs {
    past_tense: "shut down",
    present_participle: "shutting down",
};

/// Builder for [`StateMachine`].
#[derive(Debug, Default)]
pub struct StateMachineBuilder {
    component: String,
    ignore_already_at_end: bool,
}

impl StateMachineBuilder {
    /// The name used in log lines and error messages.
    pub fn component_name(mut self, name: impl Into<String>) -> Self {
        self.component = name.into();
        self
    }

    /// When `true`, asking to move to the state the machine is already in
    /// (e.g. a second `shutdown`) succeeds instead of returning
    /// [`TransitionError::AlreadyAtEnd`].
    pub fn ignore_already_at_end(mut self, ignore: bool) -> Self {
        self.ignore_already_at_end = ignore;
        self
    }

    pub fn build(self) -> StateMachine {
        StateMachine {
            component: self.component,
            ignore_already_at_end: self.ignore_already_at_end,
            current: Mutex::new(State::New),
        }
    }
}

/// Guards the `New -> Started -> Shutdown` transitions of one component.
#[derive(Debug)]
pub struct StateMachine {
    component: String,
    ignore_already_at_end: bool,
    current: Mutex<State>,
}

impl StateMachine {
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    pub fn component_name(&self) -> &str {
        &self.component
    }

    /// Returns the current state. Waits if a transition is in progress.
    pub async fn current(&self) -> State {
        *self.current.lock().await
    }

    /// Runs `action` and moves to `Started`, provided the machine is `New`.
    pub async fn start<F, Fut, E>(&self, action: F) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<BoxError>,
    {
        self.transition(State::New, State::Started, &START_VERBS, action)
            .await
    }

    /// Runs `action` and moves to `Shutdown`, provided the machine is `Started`.
    pub async fn shutdown<F, Fut, E>(&self, action: F) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<BoxError>,
    {
        self.transition(State::Started, State::Shutdown, &SHUTDOWN_VERBS, action)
            .await
    }

    async fn transition<F, Fut, E>(
        &self,
        expected: State,
        wanted: State,
        verbs: &Verbs,
        action: F,
    ) -> Result<(), TransitionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<BoxError>,
    {
        let mut current = self.current.lock().await;

        if *current == wanted {
            if self.ignore_already_at_end {
                tracing::debug!(
                    component = %self.component,
                    "{} already {}, ignoring the repeated request",
                    self.component,
                    verbs.past_tense
                );
                return Ok(());
            }
            return Err(TransitionError::AlreadyAtEnd {
                component: self.component.clone(),
                state: wanted,
            });
        }

        if *current != expected {
            return Err(TransitionError::InvalidTransition {
                component: self.component.clone(),
                verb: verbs.present_participle,
                wanted,
                current: *current,
                expected,
            });
        }

        action().await.map_err(|e| TransitionError::Action {
            component: self.component.clone(),
            verb: verbs.present_participle,
            source: e.into(),
        })?;

        *current = wanted;
        Ok(())
    }
}
