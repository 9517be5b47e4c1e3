use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Initializing,
    ReadyIdle,
    Running,
    Stopped,
}

impl LoopState {
    pub fn label(&self) -> &'static str {
        match self {
            LoopState::Uninitialized => "uninitialized",
            LoopState::Initializing => "initializing",
            LoopState::ReadyIdle => "ready",
            LoopState::Running => "running",
            LoopState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot {action} while {}", .state.label())]
    InvalidTransition {
        state: LoopState,
        action: &'static str,
    },
    #[error("not ready (model loaded: {model_loaded}, source attached: {source_attached})")]
    NotReady {
        model_loaded: bool,
        source_attached: bool,
    },
}

/// Readiness gating for the frame loop. `ReadyIdle` needs both the model and
/// the frame source; nothing restarts the loop except an explicit `start`.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    state: LoopState,
    model_loaded: bool,
    source_attached: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LoopState::Uninitialized,
            model_loaded: false,
            source_attached: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn begin_initialization(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LoopState::Uninitialized => {
                self.state = LoopState::Initializing;
                Ok(())
            }
            state => Err(LifecycleError::InvalidTransition {
                state,
                action: "begin initialization",
            }),
        }
    }

    pub fn mark_model_loaded(&mut self) {
        self.model_loaded = true;
        self.promote();
    }

    pub fn mark_source_attached(&mut self) {
        self.source_attached = true;
        self.promote();
    }

    fn promote(&mut self) {
        if self.state == LoopState::Uninitialized {
            self.state = LoopState::Initializing;
        }
        if self.state == LoopState::Initializing && self.model_loaded && self.source_attached {
            self.state = LoopState::ReadyIdle;
        }
    }

    pub fn start(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LoopState::ReadyIdle | LoopState::Stopped => {
                self.state = LoopState::Running;
                Ok(())
            }
            LoopState::Running => Ok(()),
            LoopState::Uninitialized | LoopState::Initializing => Err(LifecycleError::NotReady {
                model_loaded: self.model_loaded,
                source_attached: self.source_attached,
            }),
        }
    }

    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LoopState::Running => {
                self.state = LoopState::Stopped;
                Ok(())
            }
            LoopState::ReadyIdle | LoopState::Stopped => Ok(()),
            state => Err(LifecycleError::InvalidTransition {
                state,
                action: "stop",
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }
}

struct ControlState {
    lifecycle: Lifecycle,
    shutdown: bool,
}

/// Lifecycle shared between the UI thread and the frame loop thread.
pub struct LoopControl {
    inner: Mutex<ControlState>,
    wake: Condvar,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopControl {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlState {
                lifecycle: Lifecycle::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<T>(&self, f: impl FnOnce(&mut Lifecycle) -> T) -> T {
        let mut guard = self.lock();
        let out = f(&mut guard.lifecycle);
        self.wake.notify_all();
        out
    }

    pub fn state(&self) -> LoopState {
        self.lock().lifecycle.state()
    }

    pub fn begin_initialization(&self) -> Result<(), LifecycleError> {
        self.update(Lifecycle::begin_initialization)
    }

    pub fn mark_model_loaded(&self) {
        self.update(Lifecycle::mark_model_loaded)
    }

    pub fn mark_source_attached(&self) {
        self.update(Lifecycle::mark_source_attached)
    }

    pub fn start(&self) -> Result<(), LifecycleError> {
        self.update(Lifecycle::start)
    }

    pub fn stop(&self) -> Result<(), LifecycleError> {
        self.update(Lifecycle::stop)
    }

    pub fn is_running(&self) -> bool {
        self.lock().lifecycle.is_running()
    }

    pub fn shutdown(&self) {
        let mut guard = self.lock();
        guard.shutdown = true;
        self.wake.notify_all();
    }

    /// Parks the caller until the loop is running. Returns `false` on shutdown.
    pub fn wait_until_running(&self) -> bool {
        let mut guard = self.lock();
        loop {
            if guard.shutdown {
                return false;
            }
            if guard.lifecycle.is_running() {
                return true;
            }
            guard = self
                .wake
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sleeps until `deadline`, waking early if the loop stops or shuts down.
    /// Returns whether the loop is still running.
    pub fn wait_for_refresh(&self, deadline: Instant) -> bool {
        let mut guard = self.lock();
        loop {
            if guard.shutdown || !guard.lifecycle.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (next, _) = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn ready_requires_model_and_source() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin_initialization().unwrap();
        lifecycle.mark_model_loaded();
        assert_eq!(lifecycle.state(), LoopState::Initializing);
        assert_eq!(
            lifecycle.start(),
            Err(LifecycleError::NotReady {
                model_loaded: true,
                source_attached: false
            })
        );

        lifecycle.mark_source_attached();
        assert_eq!(lifecycle.state(), LoopState::ReadyIdle);
    }

    #[test]
    fn readiness_signals_in_either_order() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.mark_source_attached();
        assert_eq!(lifecycle.state(), LoopState::Initializing);
        lifecycle.mark_model_loaded();
        assert_eq!(lifecycle.state(), LoopState::ReadyIdle);
        // a late duplicate signal does not move the state
        lifecycle.start().unwrap();
        lifecycle.mark_model_loaded();
        assert_eq!(lifecycle.state(), LoopState::Running);
    }

    #[test]
    fn stop_then_explicit_restart() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.mark_model_loaded();
        lifecycle.mark_source_attached();
        lifecycle.start().unwrap();
        lifecycle.stop().unwrap();
        assert_eq!(lifecycle.state(), LoopState::Stopped);
        lifecycle.start().unwrap();
        assert!(lifecycle.is_running());
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let mut lifecycle = Lifecycle::new();
        assert!(matches!(
            lifecycle.stop(),
            Err(LifecycleError::InvalidTransition {
                state: LoopState::Uninitialized,
                ..
            })
        ));
        lifecycle.begin_initialization().unwrap();
        assert!(lifecycle.begin_initialization().is_err());
    }

    #[test]
    fn stop_wakes_refresh_wait_early() {
        let control = Arc::new(LoopControl::new());
        control.mark_model_loaded();
        control.mark_source_attached();
        control.start().unwrap();

        let waiter = {
            let control = control.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let running = control.wait_for_refresh(started + Duration::from_secs(30));
                (running, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        control.stop().unwrap();

        let (running, waited) = waiter.join().unwrap();
        assert!(!running);
        assert!(waited < Duration::from_secs(10));
    }

    #[test]
    fn shutdown_releases_idle_waiter() {
        let control = Arc::new(LoopControl::new());
        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait_until_running())
        };
        thread::sleep(Duration::from_millis(20));
        control.shutdown();
        assert!(!waiter.join().unwrap());
        // later waits return straight away
        assert!(!control.wait_until_running());
    }
}
