//! V8 sandboxes using deno_core
//!
//! Both backends run the same machinery: a fresh `JsRuntime` on a blocking
//! thread, a near-heap-limit callback that terminates execution, and a
//! timeout race on the async side. They differ only in their
//! [`SandboxProfile`].

mod context;
mod isolate;

pub use context::ContextBackend;
pub use isolate::IsolateBackend;

use crate::error::{Result, SandboxError};
use crate::execution::{ExecutionId, SandboxLease, SandboxState, SandboxTracker};
use crate::harness::{self, EntryPoint, HarnessOutput, SyntaxCheck};
use crate::limits::ResourceLimits;
use crate::runtime::{SandboxOutcome, SandboxRequest};
use crate::types::{ExecutionStats, MemoryStats};
use deno_core::{v8, JsRuntime, RuntimeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// How long a timed-out call waits for the isolate to go away
const DISPOSAL_GRACE: Duration = Duration::from_millis(500);

const NEVER_SETTLED: &str =
    "Entry point returned a promise that did not settle; timers and I/O are not available in the sandbox";

/// What distinguishes one backend from the other
#[derive(Debug, Clone, Copy)]
pub(crate) struct SandboxProfile {
    /// Cap the V8 heap at the memory limit and treat overruns as `MemoryLimit`
    pub hard_heap_limit: bool,

    /// Globals deleted before the harness runs
    pub removed_globals: &'static [&'static str],

    /// Wait for the isolate to be torn down before reporting a timeout
    pub await_disposal: bool,
}

impl SandboxProfile {
    /// Error for a run the near-heap-limit callback cut short
    fn heap_failure(
        &self,
        memory: MemoryStats,
        limits: &ResourceLimits,
        elapsed_ms: u64,
    ) -> SandboxError {
        if self.hard_heap_limit {
            SandboxError::MemoryLimit {
                limit_mb: limits.memory_limit_mb,
                used_mb: memory.used_mb().max(limits.memory_limit_mb),
            }
        } else {
            SandboxError::execution("Heap exhausted; execution was terminated", elapsed_ms)
                .with_memory(memory)
        }
    }
}

/// Work for one sandbox
enum Job {
    Invoke { harness: String, entry: EntryPoint },
    CheckSyntax { script: String },
}

/// How the isolate thread finished
enum IsolateExit {
    Finished {
        output_text: String,
        logs: Vec<String>,
        errors: Vec<String>,
        memory: MemoryStats,
        elapsed_ms: u64,
    },
    Checked(SyntaxCheck),
    Fault(SandboxError),
    HeapLimit {
        memory: MemoryStats,
        elapsed_ms: u64,
    },
    Terminated,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// One live isolate. The runtime is declared before the lease so the
/// isolate is gone by the time the lease reports disposal.
struct Sandbox {
    runtime: JsRuntime,
    heap_exceeded: Arc<AtomicBool>,
    lease: SandboxLease,
}

impl Sandbox {
    fn create(
        profile: &SandboxProfile,
        limits: &ResourceLimits,
        lease: SandboxLease,
    ) -> std::result::Result<Self, String> {
        let mut options = RuntimeOptions::default();
        if profile.hard_heap_limit {
            let max_bytes = limits.memory_limit_bytes();
            let initial_bytes = (max_bytes / 10).min(10 * 1024 * 1024);
            options.create_params =
                Some(v8::CreateParams::default().heap_limits(initial_bytes, max_bytes));
        }

        let mut runtime = JsRuntime::new(options);

        let heap_exceeded = Arc::new(AtomicBool::new(false));
        let flag = heap_exceeded.clone();
        let handle = runtime.v8_isolate().thread_safe_handle();
        runtime.add_near_heap_limit_callback(move |current_limit, _initial_limit| {
            flag.store(true, Ordering::SeqCst);
            handle.terminate_execution();
            // Headroom for the termination to unwind
            current_limit * 2
        });

        let mut sandbox = Self {
            runtime,
            heap_exceeded,
            lease,
        };

        if !profile.removed_globals.is_empty() {
            let script: String = profile
                .removed_globals
                .iter()
                .map(|name| format!("delete globalThis.{};", name))
                .collect();
            sandbox
                .runtime
                .execute_script("<restrict>", script)
                .map_err(|e| format!("Failed to restrict sandbox globals: {}", e))?;
        }

        tracing::debug!(
            execution_id = %sandbox.lease.id(),
            hard_heap_limit = profile.hard_heap_limit,
            "Sandbox created"
        );
        Ok(sandbox)
    }

    fn isolate_handle(&mut self) -> v8::IsolateHandle {
        self.runtime.v8_isolate().thread_safe_handle()
    }

    fn memory(&mut self) -> MemoryStats {
        let mut stats = v8::HeapStatistics::default();
        self.runtime.v8_isolate().get_heap_statistics(&mut stats);
        MemoryStats {
            used: stats.used_heap_size() as u64,
            total: stats.total_heap_size() as u64,
            external: stats.external_memory() as u64,
        }
    }

    /// Evaluate a script and stringify its completion value
    fn eval(&mut self, name: &'static str, script: String) -> std::result::Result<String, String> {
        let global = self
            .runtime
            .execute_script(name, script)
            .map_err(|e| e.to_string())?;
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, global);
        Ok(local.to_rust_string_lossy(scope))
    }

    fn run(&mut self, job: Job, timed_out: &AtomicBool, started: Instant) -> IsolateExit {
        if timed_out.load(Ordering::SeqCst) {
            self.lease.transition(SandboxState::TimedOut);
            return IsolateExit::Terminated;
        }
        self.lease.transition(SandboxState::Running);

        let exit = match job {
            Job::Invoke { harness, entry } => self.invoke(harness, &entry, timed_out, started),
            Job::CheckSyntax { script } => self.check(script, timed_out, started),
        };

        self.lease.transition(match exit {
            IsolateExit::Finished { .. } | IsolateExit::Checked(_) => SandboxState::Completed,
            IsolateExit::Terminated => SandboxState::TimedOut,
            IsolateExit::Fault(_) | IsolateExit::HeapLimit { .. } => SandboxState::Faulted,
        });
        exit
    }

    fn invoke(
        &mut self,
        harness: String,
        entry: &EntryPoint,
        timed_out: &AtomicBool,
        started: Instant,
    ) -> IsolateExit {
        let raw = match self.eval("<plugin>", harness) {
            Ok(raw) => raw,
            Err(message) => return self.failure(message, timed_out, started),
        };
        let output = match HarnessOutput::parse(&raw, elapsed_ms(started)) {
            Ok(HarnessOutput::Pending { .. }) => match self.settle(timed_out, started) {
                Ok(settled) => settled,
                Err(exit) => return exit,
            },
            Ok(output) => output,
            Err(e) => return IsolateExit::Fault(e),
        };

        match output {
            HarnessOutput::Completed {
                output,
                logs,
                errors,
            } => IsolateExit::Finished {
                output_text: output,
                logs,
                errors,
                memory: self.memory(),
                elapsed_ms: elapsed_ms(started),
            },
            HarnessOutput::Fault { fault } => {
                let memory = self.memory();
                IsolateExit::Fault(
                    fault
                        .into_error(entry, elapsed_ms(started))
                        .with_memory(memory),
                )
            }
            HarnessOutput::Pending { .. } => {
                IsolateExit::Fault(SandboxError::execution(NEVER_SETTLED, elapsed_ms(started)))
            }
        }
    }

    /// Drain microtasks and read back the settled value of an async entry point
    fn settle(
        &mut self,
        timed_out: &AtomicBool,
        started: Instant,
    ) -> std::result::Result<HarnessOutput, IsolateExit> {
        self.runtime.v8_isolate().perform_microtask_checkpoint();
        if self.heap_exceeded.load(Ordering::SeqCst) || timed_out.load(Ordering::SeqCst) {
            return Err(self.failure("execution terminated".to_string(), timed_out, started));
        }

        let raw = self
            .eval("<settle>", harness::SETTLED_PROBE.to_string())
            .map_err(|message| self.failure(message, timed_out, started))?;
        if raw == "undefined" {
            let memory = self.memory();
            return Err(IsolateExit::Fault(
                SandboxError::execution(NEVER_SETTLED, elapsed_ms(started)).with_memory(memory),
            ));
        }
        HarnessOutput::parse(&raw, elapsed_ms(started)).map_err(IsolateExit::Fault)
    }

    fn check(&mut self, script: String, timed_out: &AtomicBool, started: Instant) -> IsolateExit {
        match self.eval("<syntax-check>", script) {
            Ok(raw) => match serde_json::from_str::<SyntaxCheck>(&raw) {
                Ok(check) => IsolateExit::Checked(check),
                Err(e) => IsolateExit::Fault(SandboxError::execution(
                    format!("Syntax check returned an unreadable result: {}", e),
                    elapsed_ms(started),
                )),
            },
            Err(message) => self.failure(message, timed_out, started),
        }
    }

    /// Classify a script that did not complete
    fn failure(&mut self, message: String, timed_out: &AtomicBool, started: Instant) -> IsolateExit {
        let memory = self.memory();
        if self.heap_exceeded.load(Ordering::SeqCst) {
            IsolateExit::HeapLimit {
                memory,
                elapsed_ms: elapsed_ms(started),
            }
        } else if timed_out.load(Ordering::SeqCst) {
            IsolateExit::Terminated
        } else {
            IsolateExit::Fault(
                SandboxError::execution(message, elapsed_ms(started)).with_memory(memory),
            )
        }
    }
}

/// Run `job` in a fresh sandbox on the blocking pool, racing it against the
/// time limit
async fn run_sandboxed(
    profile: SandboxProfile,
    execution_id: ExecutionId,
    job: Job,
    limits: ResourceLimits,
    tracker: SandboxTracker,
) -> Result<IsolateExit> {
    let started = Instant::now();
    let timed_out = Arc::new(AtomicBool::new(false));
    let thread_timed_out = timed_out.clone();
    let (handle_tx, mut handle_rx) = oneshot::channel::<v8::IsolateHandle>();

    let mut task = tokio::task::spawn_blocking(move || {
        let lease = tracker.register(execution_id);
        let mut sandbox = match Sandbox::create(&profile, &limits, lease) {
            Ok(sandbox) => sandbox,
            Err(message) => {
                return IsolateExit::Fault(SandboxError::execution(message, elapsed_ms(started)))
            }
        };
        // The handle goes out before the time-out flag is checked, so a host
        // that finds no handle can rely on the flag instead
        let _ = handle_tx.send(sandbox.isolate_handle());
        sandbox.run(job, &thread_timed_out, started)
    });

    match tokio::time::timeout(limits.timeout(), &mut task).await {
        Ok(Ok(exit)) => Ok(exit),
        Ok(Err(join_err)) => Err(SandboxError::execution(
            format!("Sandbox thread failed: {}", join_err),
            elapsed_ms(started),
        )),
        Err(_elapsed) => {
            timed_out.store(true, Ordering::SeqCst);
            if let Ok(handle) = handle_rx.try_recv() {
                handle.terminate_execution();
            }

            if profile.await_disposal {
                if tokio::time::timeout(DISPOSAL_GRACE, task).await.is_err() {
                    tracing::warn!(
                        execution_id = %execution_id,
                        grace_ms = DISPOSAL_GRACE.as_millis() as u64,
                        "Sandbox not disposed within grace period"
                    );
                }
            } else {
                tracing::debug!(
                    execution_id = %execution_id,
                    "Timed out; sandbox left to terminate on its own"
                );
            }

            Err(SandboxError::Timeout {
                timeout_ms: limits.timeout_ms,
            })
        }
    }
}

/// Execute a harness under `profile`
pub(crate) async fn execute_with_profile(
    profile: SandboxProfile,
    request: SandboxRequest,
) -> Result<SandboxOutcome> {
    let SandboxRequest {
        execution_id,
        harness,
        entry_point,
        limits,
        tracker,
    } = request;

    let job = Job::Invoke {
        harness,
        entry: entry_point,
    };
    match run_sandboxed(profile, execution_id, job, limits, tracker).await? {
        IsolateExit::Finished {
            output_text,
            logs,
            errors,
            memory,
            elapsed_ms,
        } => {
            if memory.used_mb() > limits.memory_limit_mb {
                if profile.hard_heap_limit {
                    return Err(SandboxError::MemoryLimit {
                        limit_mb: limits.memory_limit_mb,
                        used_mb: memory.used_mb(),
                    });
                }
                tracing::warn!(
                    execution_id = %execution_id,
                    used_mb = memory.used_mb(),
                    limit_mb = limits.memory_limit_mb,
                    "Heap usage above the configured limit"
                );
            }
            Ok(SandboxOutcome {
                output_text,
                logs,
                errors,
                stats: ExecutionStats {
                    execution_time_ms: elapsed_ms,
                    memory,
                },
            })
        }
        IsolateExit::HeapLimit { memory, elapsed_ms } => {
            Err(profile.heap_failure(memory, &limits, elapsed_ms))
        }
        IsolateExit::Fault(err) => Err(err),
        IsolateExit::Terminated => Err(SandboxError::Timeout {
            timeout_ms: limits.timeout_ms,
        }),
        IsolateExit::Checked(_) => Err(SandboxError::execution(
            "Sandbox returned a syntax check for an invocation",
            0,
        )),
    }
}

/// Compile `code` as a plugin body under `profile`
pub(crate) async fn check_syntax_with_profile(
    profile: SandboxProfile,
    code: &str,
    limits: &ResourceLimits,
    tracker: &SandboxTracker,
) -> Result<SyntaxCheck> {
    let job = Job::CheckSyntax {
        script: harness::syntax_check_script(code),
    };
    match run_sandboxed(profile, ExecutionId::new(), job, *limits, tracker.clone()).await? {
        IsolateExit::Checked(check) => Ok(check),
        IsolateExit::HeapLimit { memory, elapsed_ms } => {
            Err(profile.heap_failure(memory, limits, elapsed_ms))
        }
        IsolateExit::Fault(err) => Err(err),
        IsolateExit::Terminated => Err(SandboxError::Timeout {
            timeout_ms: limits.timeout_ms,
        }),
        IsolateExit::Finished { .. } => Err(SandboxError::execution(
            "Sandbox returned an invocation result for a syntax check",
            0,
        )),
    }
}
