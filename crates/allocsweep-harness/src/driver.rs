//! Test driver.
//!
//! Runs every registered test under the tracked heap, classifies how it
//! ended, and replays any test that had an allocation refused under the
//! raising allocator so both failure-reporting conventions of the library
//! are exercised.

use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::capture::{Outcome, run_guarded};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fault::{AllocatorVariant, HARNESS_HEAP, HeapSnapshot, RUN_LOCK};
use crate::host::{AllocatorHost, InstalledHooks};
use crate::registry::{Registry, TestCase};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, LogOutcome};

/// Suffix appended to the name of a raising-allocator replay.
pub const REPLAY_SUFFIX: &str = " (throw)";

/// Why a sub-test failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// A check inside the test failed.
    Assertion(String),
    /// An allocation was refused and nobody acknowledged it.
    UnguardedFault,
    /// An allocation was refused and the test ended with memory outstanding.
    UnguardedLeak { bytes: usize, count: usize },
    /// Memory outstanding at the end of a test with no refusal.
    Leak { bytes: usize, count: usize },
    /// A raised allocation failure escaped the library.
    UnhandledAllocation { size: usize },
    /// The test panicked with a message.
    Exception(String),
    /// The test unwound with an unrecognized payload.
    Unknown,
}

impl FailureKind {
    /// Stable category label for structured logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Assertion(_) => "assertion",
            Self::UnguardedFault => "unguarded_fault",
            Self::UnguardedLeak { .. } => "unguarded_leak",
            Self::Leak { .. } => "leak",
            Self::UnhandledAllocation { .. } => "unhandled_allocation",
            Self::Exception(_) => "exception",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion(message) => f.write_str(message),
            Self::UnguardedFault => f.write_str("unguarded memory fail triggered"),
            Self::UnguardedLeak { bytes, count } => write!(
                f,
                "unguarded memory fail triggered (memory leaks found: {bytes} bytes in {count} allocations)"
            ),
            Self::Leak { bytes, count } => {
                write!(f, "memory leaks found ({bytes} bytes in {count} allocations)")
            }
            Self::UnhandledAllocation { size } => {
                write!(f, "unhandled allocation failure of {size} bytes")
            }
            Self::Exception(message) => write!(f, "exception {message}"),
            Self::Unknown => f.write_str("unknown reason"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(FailureKind),
}

/// Decide the verdict of one sub-test from how it ended and the heap it left.
#[must_use]
pub fn classify(outcome: Outcome, heap: &HeapSnapshot) -> Verdict {
    let failure = match outcome {
        Outcome::Failed(message) => FailureKind::Assertion(message),
        Outcome::AllocationUnwound { size } => FailureKind::UnhandledAllocation { size },
        Outcome::Panicked(message) => FailureKind::Exception(message),
        Outcome::Unknown => FailureKind::Unknown,
        Outcome::Completed if heap.pending => FailureKind::UnguardedFault,
        Outcome::Completed if !heap.is_balanced() => {
            let (bytes, count) = (heap.live_bytes, heap.live_count);
            if heap.triggered {
                FailureKind::UnguardedLeak { bytes, count }
            } else {
                FailureKind::Leak { bytes, count }
            }
        }
        Outcome::Completed => return Verdict::Passed,
    };
    Verdict::Failed(failure)
}

/// Result of one execution of one test under one allocator variant.
#[derive(Debug, Clone)]
pub struct SubTestReport {
    pub name: String,
    pub variant: AllocatorVariant,
    pub verdict: Verdict,
    pub heap: HeapSnapshot,
    pub duration: Duration,
}

impl SubTestReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// The diagnostic line printed for a failure, `None` on success.
    #[must_use]
    pub fn failure_line(&self) -> Option<String> {
        match &self.verdict {
            Verdict::Passed => None,
            Verdict::Failed(FailureKind::Unknown) => {
                Some(format!("Test {} failed for unknown reason", self.name))
            }
            Verdict::Failed(kind) => Some(format!("Test {} failed: {kind}", self.name)),
        }
    }

    fn log_entry(&self) -> LogEntry {
        let level = if self.passed() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        let entry = LogEntry::new("", level, "test_result")
            .with_test(&self.name, self.variant.label())
            .with_heap(self.heap.live_bytes, self.heap.live_count, self.heap.triggered)
            .with_duration_us(micros(self.duration));
        match &self.verdict {
            Verdict::Passed => entry.with_outcome(LogOutcome::Pass),
            Verdict::Failed(kind) => entry
                .with_outcome(LogOutcome::Fail)
                .with_failure(kind.label(), kind.to_string()),
        }
    }
}

/// Tally of a full suite run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<SubTestReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|report| report.passed()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Failed sub-test count, saturated to fit a process exit status.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.failed()).unwrap_or(u8::MAX)
    }

    #[must_use]
    pub fn report(&self, name: &str) -> Option<&SubTestReport> {
        self.reports.iter().find(|report| report.name == name)
    }

    /// The final line printed after a run.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let secs = self.elapsed.as_secs_f64();
        if self.all_passed() {
            format!("Success: {} tests passed, cost {secs:.3}(s).", self.total())
        } else {
            format!(
                "FAILURE: {} out of {} tests failed, cost {secs:.3}(s).",
                self.failed(),
                self.total()
            )
        }
    }
}

/// Runs a [`Registry`] against a library reached through an [`AllocatorHost`].
pub struct Driver<'a> {
    host: &'a dyn AllocatorHost,
    config: HarnessConfig,
    log: Option<LogEmitter>,
}

impl<'a> Driver<'a> {
    #[must_use]
    pub fn new(host: &'a dyn AllocatorHost, config: &HarnessConfig) -> Self {
        Self {
            host,
            config: config.clone(),
            log: None,
        }
    }

    /// Attach a structured log sink.
    #[must_use]
    pub fn with_log(mut self, emitter: LogEmitter) -> Self {
        self.log = Some(emitter);
        self
    }

    /// Detach the structured log sink.
    pub fn take_log(&mut self) -> Option<LogEmitter> {
        self.log.take()
    }

    /// Run every selected test, writing one line per failure plus a summary
    /// line to `out`.
    pub fn run(
        &mut self,
        registry: &Registry,
        out: &mut dyn Write,
    ) -> Result<RunSummary, HarnessError> {
        let _exclusive = RUN_LOCK.lock();
        let started = Instant::now();
        self.host.warm_up();
        if let Some(log) = self.log.as_mut() {
            log.emit_entry(
                LogEntry::new("", LogLevel::Info, "suite_start").with_details(
                    serde_json::json!({
                        "registered": registry.len(),
                        "replay": self.config.replay.replays(),
                        "filter": self.config.filter,
                    }),
                ),
            )?;
        }

        let mut summary = RunSummary::default();
        for case in registry {
            if !self.config.selects(case.name) {
                continue;
            }
            let primary =
                self.run_subtest(case, case.name.to_string(), AllocatorVariant::ReturnNull);
            let replay = primary.heap.triggered && self.config.replay.replays();
            self.record(primary, &mut summary, out)?;

            if replay {
                let name = format!("{}{REPLAY_SUFFIX}", case.name);
                let raising = self.run_subtest(case, name, AllocatorVariant::Raise);
                self.record(raising, &mut summary, out)?;
            }
        }
        HARNESS_HEAP.reset();

        summary.elapsed = started.elapsed();
        writeln!(out, "{}", summary.summary_line())?;
        if let Some(log) = self.log.as_mut() {
            let level = if summary.all_passed() {
                LogLevel::Info
            } else {
                LogLevel::Error
            };
            log.emit_entry(
                LogEntry::new("", level, "suite_end")
                    .with_duration_us(micros(summary.elapsed))
                    .with_details(serde_json::json!({
                        "total": summary.total(),
                        "passed": summary.passed(),
                        "failed": summary.failed(),
                    })),
            )?;
            log.flush()?;
        }
        Ok(summary)
    }

    fn run_subtest(
        &self,
        case: &TestCase,
        name: String,
        variant: AllocatorVariant,
    ) -> SubTestReport {
        HARNESS_HEAP.reset();
        let started = Instant::now();
        let outcome = {
            let _installed = InstalledHooks::install(self.host, variant.hooks());
            run_guarded(case.body)
        };
        let duration = started.elapsed();
        let heap = HARNESS_HEAP.snapshot();
        SubTestReport {
            name,
            variant,
            verdict: classify(outcome, &heap),
            heap,
            duration,
        }
    }

    fn record(
        &mut self,
        report: SubTestReport,
        summary: &mut RunSummary,
        out: &mut dyn Write,
    ) -> Result<(), HarnessError> {
        if let Some(line) = report.failure_line() {
            writeln!(out, "{line}")?;
        }
        if let Some(log) = self.log.as_mut() {
            log.emit_entry(report.log_entry())?;
        }
        summary.reports.push(report);
        Ok(())
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
