//! Integration test: documents under replaced allocation functions.
//!
//! Validates that every block returns to the function pair it came from and
//! that exhaustion on either convention leaves documents unchanged.
//!
//! Run: cargo test -p allocsweep-tree --test allocation_test

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};

use allocsweep_tree::{
    AllocationFunction, DeallocationFunction, Document, NodeId, TreeError,
    get_memory_allocation_function, get_memory_deallocation_function,
    set_memory_management_functions,
};

const UNLIMITED: usize = usize::MAX;

static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
static LIVE: AtomicIsize = AtomicIsize::new(0);
static REMAINING: AtomicUsize = AtomicUsize::new(UNLIMITED);
static RAISE: AtomicBool = AtomicBool::new(false);

struct Exhausted;

fn counting_allocate(size: usize) -> *mut u8 {
    let remaining = REMAINING.load(Ordering::SeqCst);
    if remaining == 0 {
        if RAISE.load(Ordering::SeqCst) {
            std::panic::resume_unwind(Box::new(Exhausted));
        }
        return std::ptr::null_mut();
    }
    if remaining != UNLIMITED {
        REMAINING.store(remaining - 1, Ordering::SeqCst);
    }
    LIVE.fetch_add(1, Ordering::SeqCst);
    // SAFETY: plain malloc call.
    unsafe { libc::malloc(size.max(1)).cast() }
}

fn counting_deallocate(ptr: *mut u8) {
    LIVE.fetch_sub(1, Ordering::SeqCst);
    // SAFETY: `ptr` came from `counting_allocate`.
    unsafe { libc::free(ptr.cast()) }
}

/// Installs the counting pair for one test and restores the previous pair.
struct Counting {
    previous: (AllocationFunction, DeallocationFunction),
    _serial: parking_lot::MutexGuard<'static, ()>,
}

impl Counting {
    fn install() -> Self {
        let serial = SERIAL.lock();
        let previous = (
            get_memory_allocation_function(),
            get_memory_deallocation_function(),
        );
        LIVE.store(0, Ordering::SeqCst);
        REMAINING.store(UNLIMITED, Ordering::SeqCst);
        RAISE.store(false, Ordering::SeqCst);
        set_memory_management_functions(counting_allocate, counting_deallocate);
        Self {
            previous,
            _serial: serial,
        }
    }

    fn limit(&self, allocations: usize, raise: bool) {
        RAISE.store(raise, Ordering::SeqCst);
        REMAINING.store(allocations, Ordering::SeqCst);
    }

    fn unlimit(&self) {
        REMAINING.store(UNLIMITED, Ordering::SeqCst);
    }

    fn live(&self) -> isize {
        LIVE.load(Ordering::SeqCst)
    }
}

impl Drop for Counting {
    fn drop(&mut self) {
        set_memory_management_functions(self.previous.0, self.previous.1);
    }
}

const SAMPLE: &str = "(config \"v1\" (server (port \"8080\") (host \"localhost\")) (debug))\n(extra \"tail\")\n";

#[test]
fn every_block_is_released() {
    let counting = Counting::install();
    {
        let doc = Document::parse(SAMPLE).unwrap();
        assert!(counting.live() > 0);
        let copy = doc.try_clone().unwrap();
        assert_eq!(copy.to_string(), SAMPLE);
    }
    assert_eq!(counting.live(), 0);
}

#[test]
fn empty_document_allocates_nothing() {
    let counting = Counting::install();
    let doc = Document::new();
    let parsed = Document::parse("; only a comment\n").unwrap();
    assert_eq!(counting.live(), 0);
    drop((doc, parsed));
}

#[test]
fn blocks_outlive_a_function_swap() {
    let counting = Counting::install();
    let doc = Document::parse(SAMPLE).unwrap();
    let live = counting.live();
    assert!(live > 0);

    set_memory_management_functions(counting.previous.0, counting.previous.1);
    let mut doc = doc;
    let extra = doc.child(NodeId::ROOT, "extra").unwrap();
    doc.set_value(extra, "allocated by the default pair").unwrap();
    assert_eq!(counting.live(), live - 1);

    drop(doc);
    assert_eq!(counting.live(), 0);
}

fn sweep_parse(raise: bool) {
    let counting = Counting::install();
    let mut failures = 0;
    for budget in 0.. {
        counting.limit(budget, raise);
        let result = Document::parse(SAMPLE);
        counting.unlimit();
        match result {
            Ok(doc) => {
                assert_eq!(doc.to_string(), SAMPLE);
                break;
            }
            Err(err) => {
                assert!(err.is_out_of_memory(), "budget {budget}: {err}");
                assert_eq!(counting.live(), 0, "leak at budget {budget}");
                failures += 1;
            }
        }
        assert!(budget < 1_000, "parse never succeeded");
    }
    assert!(failures > 5);
}

#[test]
fn parse_under_exhaustion_returning_null() {
    sweep_parse(false);
}

#[test]
fn parse_under_exhaustion_unwinding() {
    sweep_parse(true);
}

fn mutations_leave_document_unchanged(raise: bool) {
    let counting = Counting::install();
    let mut doc = Document::parse(SAMPLE).unwrap();
    let config = doc.child(NodeId::ROOT, "config").unwrap();
    let before = doc.to_string();
    let len = doc.len();

    counting.limit(0, raise);
    let appended = doc.append_child(config, "new");
    let revalued = doc.set_value(config, "replacement");
    let renamed = doc.set_name(config, "renamed");
    let cloned = doc.try_clone();
    counting.unlimit();

    assert!(matches!(appended, Err(TreeError::OutOfMemory)));
    assert!(matches!(revalued, Err(TreeError::OutOfMemory)));
    assert!(matches!(renamed, Err(TreeError::OutOfMemory)));
    assert!(matches!(cloned, Err(TreeError::OutOfMemory)));
    assert_eq!(doc.to_string(), before);
    assert_eq!(doc.len(), len);

    let appended = doc.append_child(config, "new").unwrap();
    assert_eq!(doc.parent(appended), Some(config));
}

#[test]
fn mutations_under_null_exhaustion() {
    mutations_leave_document_unchanged(false);
}

#[test]
fn mutations_under_unwinding_exhaustion() {
    mutations_leave_document_unchanged(true);
}

#[test]
fn growth_failure_keeps_existing_nodes() {
    let counting = Counting::install();
    let mut doc = Document::new();
    // Name blocks plus one node-array growth at 4, 8 and 16 nodes.
    for i in 0..16 {
        doc.append_child(NodeId::ROOT, &format!("n{i}")).unwrap();
    }
    let before = doc.to_string();
    // Enough for the name, not for the doubled node array.
    counting.limit(1, false);
    let result = doc.append_child(NodeId::ROOT, "overflow");
    counting.unlimit();
    assert!(result.unwrap_err().is_out_of_memory());
    assert_eq!(doc.to_string(), before);
    drop(doc);
    assert_eq!(counting.live(), 0);
}

#[test]
fn file_round_trip() {
    let _counting = Counting::install();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.tree");

    let doc = Document::parse(SAMPLE).unwrap();
    doc.save_file(&path).unwrap();
    let loaded = Document::load_file(&path).unwrap();
    assert_eq!(loaded.to_string(), SAMPLE);

    let missing = Document::load_file(dir.path().join("missing.tree"));
    assert!(matches!(missing, Err(TreeError::Io(_))));
}
