//! Guarded state transitions.
//!
//! A [`Transition`] describes one operation of a state machine: the states it
//! may start from, extra preconditions, the state it leads to and an exit
//! action that runs after the state is updated. Owners keep one `const`
//! transition per operation and route the operation's body through it:
//!
//! ```ignore
//! impl Timer {
//!     const STOP: Transition<Timer> = Transition::new(
//!         "stop",
//!         Target::To(State::Stopped),
//!         Source::Only(&[State::Started]),
//!         &[],
//!         Some(Timer::emit_stopped as fn(&Timer)),
//!     );
//!
//!     pub fn stop(&self) -> bool {
//!         Self::STOP.run(self, |t| t.clear()).is_some()
//!     }
//! }
//! ```
//!
//! A rejected transition is not an error: `run` returns `None` and nothing
//! about the owner changes.

use std::fmt::Debug;

use thiserror::Error;
use tracing::debug;

/// An owner of a state variable that transitions may read and write.
///
/// Methods take `&self`; implementors keep the state in a cell.
pub trait Machine {
    type State: Copy + PartialEq + Debug + 'static;

    fn state(&self) -> Self::State;
    fn set_state(&self, state: Self::State);
}

/// States a transition may start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<S: 'static> {
    Any,
    Only(&'static [S]),
}

/// State a transition leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<S> {
    /// Self-loop: the state variable is not written.
    Unchanged,
    To(S),
}

/// Why a transition did not run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejected<S: Debug> {
    #[error("`{transition}` is not allowed from {state:?}")]
    Source { transition: &'static str, state: S },

    #[error("`{transition}` precondition #{index} failed in {state:?}")]
    Condition {
        transition: &'static str,
        state: S,
        index: usize,
    },
}

/// Declarative guard around one operation of a [`Machine`].
pub struct Transition<M: Machine + 'static> {
    name: &'static str,
    target: Target<M::State>,
    source: Source<M::State>,
    conditions: &'static [fn(&M) -> bool],
    exit: Option<fn(&M)>,
}

impl<M: Machine + 'static> Transition<M> {
    pub const fn new(
        name: &'static str,
        target: Target<M::State>,
        source: Source<M::State>,
        conditions: &'static [fn(&M) -> bool],
        exit: Option<fn(&M)>,
    ) -> Self {
        Self {
            name,
            target,
            source,
            conditions,
            exit,
        }
    }

    /// Check the source set, then every precondition in order.
    pub fn check(&self, machine: &M) -> Result<(), Rejected<M::State>> {
        let state = machine.state();

        if let Source::Only(allowed) = self.source {
            if !allowed.contains(&state) {
                return Err(Rejected::Source {
                    transition: self.name,
                    state,
                });
            }
        }

        for (index, condition) in self.conditions.iter().enumerate() {
            if !condition(machine) {
                return Err(Rejected::Condition {
                    transition: self.name,
                    state,
                    index,
                });
            }
        }

        Ok(())
    }

    /// Run `body` as this transition. Returns `None` if rejected.
    ///
    /// The target state is applied whatever `body` returns.
    pub fn run<R>(&self, machine: &M, body: impl FnOnce(&M) -> R) -> Option<R> {
        if let Err(rejected) = self.check(machine) {
            debug!(%rejected, "transition rejected");
            return None;
        }

        let result = body(machine);
        self.complete(machine);
        Some(result)
    }

    /// Like [`run`](Self::run) for bodies that call fallible collaborators.
    ///
    /// An `Err` from `body` is returned as is; the state is left alone and the
    /// exit action does not run.
    pub fn try_run<T, E>(
        &self,
        machine: &M,
        body: impl FnOnce(&M) -> Result<T, E>,
    ) -> Result<Option<T>, E> {
        if let Err(rejected) = self.check(machine) {
            debug!(%rejected, "transition rejected");
            return Ok(None);
        }

        let result = body(machine)?;
        self.complete(machine);
        Ok(Some(result))
    }

    fn complete(&self, machine: &M) {
        if let Target::To(target) = self.target {
            if machine.state() != target {
                machine.set_state(target);
            }
        }

        if let Some(exit) = self.exit {
            exit(machine);
        }
    }
}

impl<M: Machine + 'static> Debug for Transition<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("source", &self.source)
            .field("conditions", &self.conditions.len())
            .field("exit", &self.exit.is_some())
            .finish()
    }
}
