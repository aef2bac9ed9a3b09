//! Lazy per-thread registration with the runtime.
//!
//! The runtime keeps some state per OS thread that has to be set up before
//! that thread first enters sandboxed code. The audio thread is usually not
//! the thread that loaded the module, so every entry point checks the guard.
//! The check is a thread-local read after the first call; no lock is taken.

use std::cell::Cell;

use wasmtime::Engine;

/// The runtime's per-thread environment.
pub trait ThreadEnv: Send + Sync {
    /// Whether the runtime already has the current thread set up.
    fn is_registered(&self) -> bool;

    /// Set up the current thread.
    fn register(&self) -> Result<(), String>;
}

/// wasmtime's per-thread trap handling state.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmtimeThreadEnv;

impl ThreadEnv for WasmtimeThreadEnv {
    fn is_registered(&self) -> bool {
        // wasmtime has no query; the guard's own flag is authoritative
        false
    }

    fn register(&self) -> Result<(), String> {
        std::panic::catch_unwind(Engine::tls_eager_initialize)
            .map_err(|_| "thread-local runtime initialization panicked".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Unknown,
    Registered,
    /// Failed while the instance with this epoch was live
    Failed { epoch: u64 },
}

thread_local! {
    static REGISTRATION: Cell<Registration> = const { Cell::new(Registration::Unknown) };
}

/// Registers each calling thread once, on first use.
pub struct ThreadGuard {
    env: Box<dyn ThreadEnv>,
}

impl Default for ThreadGuard {
    fn default() -> Self {
        Self::new(WasmtimeThreadEnv)
    }
}

impl ThreadGuard {
    /// Guard backed by a specific environment.
    pub fn new(env: impl ThreadEnv + 'static) -> Self {
        Self { env: Box::new(env) }
    }

    /// Make sure the current thread may call into the sandbox.
    ///
    /// `epoch` identifies the live instance. A thread whose registration
    /// failed stays refused until the instance is replaced.
    pub fn ensure_registered(&self, epoch: u64) -> bool {
        REGISTRATION.with(|state| match state.get() {
            Registration::Registered => true,
            Registration::Failed { epoch: failed } if failed == epoch => false,
            _ => {
                if self.env.is_registered() {
                    state.set(Registration::Registered);
                    return true;
                }
                match self.env.register() {
                    Ok(()) => {
                        state.set(Registration::Registered);
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            "thread {:?} could not register with the runtime: {}",
                            std::thread::current().id(),
                            e
                        );
                        state.set(Registration::Failed { epoch });
                        false
                    }
                }
            }
        })
    }
}

/// Whether the current thread has registered successfully.
pub fn current_thread_registered() -> bool {
    REGISTRATION.with(|state| state.get() == Registration::Registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct CountingEnv {
        calls: Arc<AtomicUsize>,
        fail: bool,
        already: bool,
    }

    impl ThreadEnv for CountingEnv {
        fn is_registered(&self) -> bool {
            self.already
        }

        fn register(&self) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("no thread environment".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn guard(fail: bool, already: bool) -> (Arc<ThreadGuard>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let env = CountingEnv {
            calls: calls.clone(),
            fail,
            already,
        };
        (Arc::new(ThreadGuard::new(env)), calls)
    }

    #[test]
    fn test_registers_once_per_thread() {
        let (guard, calls) = guard(false, false);
        let g = guard.clone();
        thread::spawn(move || {
            assert!(g.ensure_registered(1));
            assert!(g.ensure_registered(1));
            assert!(current_thread_registered());
        })
        .join()
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let g = guard.clone();
        thread::spawn(move || assert!(g.ensure_registered(1)))
            .join()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_runtime_query_skips_registration() {
        let (guard, calls) = guard(false, true);
        thread::spawn(move || assert!(guard.ensure_registered(7)))
            .join()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_sticks_for_the_instance() {
        let (guard, calls) = guard(true, false);
        thread::spawn(move || {
            assert!(!guard.ensure_registered(3));
            assert!(!guard.ensure_registered(3));
            assert!(!current_thread_registered());
            // A new instance gets another attempt
            assert!(!guard.ensure_registered(4));
        })
        .join()
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wasmtime_env_registers() {
        let guard = ThreadGuard::default();
        thread::spawn(move || {
            assert!(guard.ensure_registered(1));
            assert!(current_thread_registered());
        })
        .join()
        .unwrap();
    }
}
