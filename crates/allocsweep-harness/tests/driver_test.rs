//! Integration test: full driver runs against a hook slot.
//!
//! Covers the balance invariant, fault classification, the raising replay,
//! failure isolation and the structured log.
//!
//! Run: cargo test -p allocsweep-harness --test driver_test

use allocsweep_harness::config::ReplayPolicy;
use allocsweep_harness::driver::REPLAY_SUFFIX;
use allocsweep_harness::structured_log::{LogEmitter, validate_log_file};
use allocsweep_harness::{
    AllocFailure, AllocatorHooks, AllocatorHost, AllocatorVariant, Driver, FailureKind,
    HarnessConfig, HarnessError, HookSlot, Registry, RunSummary, Verdict, check, check_alloc_fail,
    fault, register_tests,
};

fn refuse(_size: usize) -> *mut u8 {
    std::ptr::null_mut()
}

fn ignore(_ptr: *mut u8) {}

static SLOT: HookSlot = HookSlot::new(AllocatorHooks::new(refuse, ignore));

// The slot is shared by every test in this binary.
static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

/// What a well-behaved library does: treat both conventions as `None`.
fn library_allocate(size: usize) -> Option<*mut u8> {
    match std::panic::catch_unwind(|| SLOT.allocate(size)) {
        Ok(ptr) if ptr.is_null() => None,
        Ok(ptr) => Some(ptr),
        Err(payload) if payload.is::<AllocFailure>() => None,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

fn balanced() {
    let ptr = SLOT.allocate(10);
    check!(!ptr.is_null());
    SLOT.deallocate(ptr);
}

fn leaks_one_block() {
    let ptr = SLOT.allocate(10);
    check!(!ptr.is_null());
}

fn handles_refusal_both_ways() {
    fault::set_threshold(5);
    check_alloc_fail! {
        check!(library_allocate(10).is_none());
    }
}

fn ignores_refusal() {
    fault::set_threshold(5);
    let ptr = SLOT.allocate(10);
    check!(ptr.is_null());
}

fn leaks_after_refusal() {
    fault::set_threshold(20);
    let first = library_allocate(10);
    check!(first.is_some());
    check_alloc_fail! {
        check!(library_allocate(10).is_none());
    }
}

fn failing_check() {
    check!(1 + 1 == 3, "arithmetic broke");
}

fn never_allocates() {}

fn panics() {
    panic!("library invariant violated");
}

fn sweeps_every_block() {
    let points = fault::sweep_fail_points(|| {
        let mut held = Vec::new();
        for size in [8, 8, 8] {
            match library_allocate(size) {
                Some(ptr) => held.push(ptr),
                None => break,
            }
        }
        for ptr in held {
            SLOT.deallocate(ptr);
        }
    });
    check!(points == 3, "expected 3 fail points, got {points}");
}

fn ignores_refusal_then_sweeps() {
    fault::set_threshold(5);
    let _ = library_allocate(10);
    fault::sweep_fail_points(|| {});
}

fn full_registry() -> Result<Registry, HarnessError> {
    let mut registry = Registry::new();
    register_tests!(
        registry,
        [
            balanced,
            leaks_one_block,
            handles_refusal_both_ways,
            ignores_refusal,
            leaks_after_refusal,
            failing_check,
            never_allocates,
            panics,
            sweeps_every_block,
        ]
    );
    Ok(registry)
}

fn run(registry: &Registry, config: &HarnessConfig) -> (RunSummary, Vec<String>) {
    let mut out = Vec::new();
    let summary = Driver::new(&SLOT, config)
        .run(registry, &mut out)
        .expect("driver run");
    let lines = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    (summary, lines)
}

fn verdict<'a>(summary: &'a RunSummary, name: &str) -> &'a Verdict {
    &summary
        .report(name)
        .unwrap_or_else(|| panic!("no report for {name}"))
        .verdict
}

#[test]
fn full_run_classifies_every_outcome() {
    let _serial = SERIAL.lock();
    let registry = full_registry().unwrap();
    let (summary, lines) = run(&registry, &HarnessConfig::default());

    // 9 tests, 4 of them triggered the injector and were replayed.
    assert_eq!(summary.total(), 13);
    assert_eq!(summary.failed(), 7);
    assert_eq!(summary.exit_code(), 7);

    assert_eq!(verdict(&summary, "balanced"), &Verdict::Passed);
    assert_eq!(verdict(&summary, "never_allocates"), &Verdict::Passed);
    assert!(summary.report("balanced (throw)").is_none());
    assert!(summary.report("never_allocates (throw)").is_none());

    assert_eq!(
        verdict(&summary, "leaks_one_block"),
        &Verdict::Failed(FailureKind::Leak { bytes: 16, count: 1 })
    );
    assert_eq!(verdict(&summary, "handles_refusal_both_ways"), &Verdict::Passed);
    assert_eq!(
        verdict(&summary, "handles_refusal_both_ways (throw)"),
        &Verdict::Passed
    );
    assert_eq!(
        verdict(&summary, "ignores_refusal"),
        &Verdict::Failed(FailureKind::UnguardedFault)
    );
    assert_eq!(
        verdict(&summary, "ignores_refusal (throw)"),
        &Verdict::Failed(FailureKind::UnhandledAllocation { size: 10 })
    );
    assert_eq!(
        verdict(&summary, "leaks_after_refusal"),
        &Verdict::Failed(FailureKind::UnguardedLeak { bytes: 16, count: 1 })
    );
    assert_eq!(
        verdict(&summary, "leaks_after_refusal (throw)"),
        &Verdict::Failed(FailureKind::UnguardedLeak { bytes: 16, count: 1 })
    );
    assert_eq!(
        verdict(&summary, "failing_check"),
        &Verdict::Failed(FailureKind::Assertion("arithmetic broke".to_string()))
    );
    assert_eq!(
        verdict(&summary, "panics"),
        &Verdict::Failed(FailureKind::Exception(
            "library invariant violated".to_string()
        ))
    );
    assert_eq!(verdict(&summary, "sweeps_every_block"), &Verdict::Passed);
    assert_eq!(
        verdict(&summary, "sweeps_every_block (throw)"),
        &Verdict::Passed
    );

    let expected = [
        "Test leaks_one_block failed: memory leaks found (16 bytes in 1 allocations)",
        "Test ignores_refusal failed: unguarded memory fail triggered",
        "Test ignores_refusal (throw) failed: unhandled allocation failure of 10 bytes",
        "Test leaks_after_refusal failed: unguarded memory fail triggered (memory leaks found: 16 bytes in 1 allocations)",
        "Test leaks_after_refusal (throw) failed: unguarded memory fail triggered (memory leaks found: 16 bytes in 1 allocations)",
        "Test failing_check failed: arithmetic broke",
        "Test panics failed: exception library invariant violated",
    ];
    assert_eq!(&lines[..expected.len()], expected);
    assert_eq!(lines.len(), expected.len() + 1);
    assert!(
        lines[expected.len()].starts_with("FAILURE: 7 out of 13 tests failed, cost "),
        "{}",
        lines[expected.len()]
    );
}

#[test]
fn sweep_does_not_hide_an_unhandled_refusal() {
    let _serial = SERIAL.lock();
    let mut registry = Registry::new();
    registry
        .register("ignores_refusal_then_sweeps", ignores_refusal_then_sweeps)
        .unwrap();
    registry.register("ignores_refusal", ignores_refusal).unwrap();
    let (summary, lines) = run(&registry, &HarnessConfig::default());

    assert_eq!(summary.total(), 4);
    assert_eq!(summary.failed(), 4);
    let pending = Verdict::Failed(FailureKind::Assertion(
        "allocation failure already pending before fail point sweep".to_string(),
    ));
    assert_eq!(verdict(&summary, "ignores_refusal_then_sweeps"), &pending);
    assert_eq!(
        verdict(&summary, "ignores_refusal_then_sweeps (throw)"),
        &pending
    );
    assert_eq!(
        verdict(&summary, "ignores_refusal"),
        &Verdict::Failed(FailureKind::UnguardedFault)
    );
    assert_eq!(
        lines[0],
        "Test ignores_refusal_then_sweeps failed: allocation failure already pending before fail point sweep"
    );
}

#[test]
fn run_order_follows_registration() {
    let _serial = SERIAL.lock();
    let registry = full_registry().unwrap();
    let (summary, _) = run(&registry, &HarnessConfig::default());
    let names: Vec<_> = summary.reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "balanced",
            "leaks_one_block",
            "handles_refusal_both_ways",
            "handles_refusal_both_ways (throw)",
            "ignores_refusal",
            "ignores_refusal (throw)",
            "leaks_after_refusal",
            "leaks_after_refusal (throw)",
            "failing_check",
            "never_allocates",
            "panics",
            "sweeps_every_block",
            "sweeps_every_block (throw)",
        ]
    );
    for report in &summary.reports {
        let expected = if report.name.ends_with(REPLAY_SUFFIX) {
            AllocatorVariant::Raise
        } else {
            AllocatorVariant::ReturnNull
        };
        assert_eq!(report.variant, expected, "{}", report.name);
    }
}

#[test]
fn clean_suite_succeeds() {
    let _serial = SERIAL.lock();
    let mut registry = Registry::new();
    registry.register("balanced", balanced).unwrap();
    registry.register("never_allocates", never_allocates).unwrap();
    let (summary, lines) = run(&registry, &HarnessConfig::default());
    assert!(summary.all_passed());
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Success: 2 tests passed, cost "));
}

#[test]
fn repeated_runs_are_identical() {
    let _serial = SERIAL.lock();
    let registry = full_registry().unwrap();
    let (first, first_lines) = run(&registry, &HarnessConfig::default());
    let (second, second_lines) = run(&registry, &HarnessConfig::default());
    let verdicts = |s: &RunSummary| {
        s.reports
            .iter()
            .map(|r| (r.name.clone(), r.verdict.clone(), r.heap))
            .collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), verdicts(&second));
    let strip = |lines: &[String]| lines[..lines.len() - 1].to_vec();
    assert_eq!(strip(&first_lines), strip(&second_lines));
}

#[test]
fn replay_can_be_disabled() {
    let _serial = SERIAL.lock();
    let registry = full_registry().unwrap();
    let config = HarnessConfig {
        replay: ReplayPolicy::Off,
        ..HarnessConfig::default()
    };
    let (summary, _) = run(&registry, &config);
    assert_eq!(summary.total(), 9);
    assert!(
        summary
            .reports
            .iter()
            .all(|r| r.variant == AllocatorVariant::ReturnNull)
    );
}

#[test]
fn filter_skips_unselected_tests() {
    let _serial = SERIAL.lock();
    let registry = full_registry().unwrap();
    let config = HarnessConfig {
        filter: Some("refusal".to_string()),
        ..HarnessConfig::default()
    };
    let (summary, _) = run(&registry, &config);
    let names: Vec<_> = summary.reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "handles_refusal_both_ways",
            "handles_refusal_both_ways (throw)",
            "ignores_refusal",
            "ignores_refusal (throw)",
            "leaks_after_refusal",
            "leaks_after_refusal (throw)",
        ]
    );
}

#[test]
fn hooks_are_restored_after_run() {
    let _serial = SERIAL.lock();
    let before = SLOT.hooks();
    assert!(before.same_as(&AllocatorHooks::new(refuse, ignore)));
    let registry = full_registry().unwrap();
    let _ = run(&registry, &HarnessConfig::default());
    assert!(SLOT.hooks().same_as(&before));
    assert!(!SLOT.hooks().same_as(&AllocatorVariant::ReturnNull.hooks()));
}

#[test]
fn structured_log_records_every_sub_test() {
    let _serial = SERIAL.lock();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("driver.jsonl");
    let registry = full_registry().unwrap();

    let emitter = LogEmitter::to_file(&path, "driver_test", "run-1").unwrap();
    let mut driver = Driver::new(&SLOT, &HarnessConfig::default()).with_log(emitter);
    let summary = driver.run(&registry, &mut std::io::sink()).unwrap();
    drop(driver.take_log());

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(lines, summary.total() + 2);

    let content = std::fs::read_to_string(&path).unwrap();
    let records: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records[0]["event"], "suite_start");
    assert_eq!(records[0]["details"]["registered"], 9);
    let last = records.last().unwrap();
    assert_eq!(last["event"], "suite_end");
    assert_eq!(last["details"]["failed"], 7);

    let unhandled = records
        .iter()
        .find(|r| r["test"] == "ignores_refusal (throw)")
        .unwrap();
    assert_eq!(unhandled["variant"], "raise");
    assert_eq!(unhandled["outcome"], "fail");
    assert_eq!(unhandled["failure"], "unhandled_allocation");
}
