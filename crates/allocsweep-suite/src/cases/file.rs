//! Loading and saving documents through the scratch directory.

use std::path::{Path, PathBuf};

use allocsweep_harness::{
    HarnessError, Registry, check, check_eq, config, fault, register_tests,
};
use allocsweep_tree::{Document, TreeError};

use super::SAMPLE;

pub fn register(registry: &mut Registry) -> Result<(), HarnessError> {
    register_tests!(
        registry,
        [
            save_and_load,
            load_missing_file,
            save_needs_no_tree_memory,
            load_refused_at_every_step,
        ]
    );
    Ok(())
}

/// A file in the scratch directory, removed when dropped.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(name: &str) -> Self {
        let file = format!("allocsweep-{}-{name}.tree", std::process::id());
        Self(config::scratch_dir().join(file))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn save_and_load() {
    let file = ScratchFile::new("save_and_load");
    let Ok(doc) = Document::parse(SAMPLE) else {
        allocsweep_harness::fail("parse failed");
    };
    check!(doc.save_file(file.path()).is_ok());
    match Document::load_file(file.path()) {
        Ok(loaded) => check_eq!(loaded.to_string(), SAMPLE),
        Err(err) => allocsweep_harness::fail(format!("load failed: {err}")),
    }
}

fn load_missing_file() {
    let file = ScratchFile::new("load_missing_file");
    check!(matches!(
        Document::load_file(file.path()),
        Err(TreeError::Io(_))
    ));
    check_eq!(fault::live_count(), 0);
}

fn save_needs_no_tree_memory() {
    let file = ScratchFile::new("save_needs_no_tree_memory");
    let Ok(doc) = Document::parse(SAMPLE) else {
        allocsweep_harness::fail("parse failed");
    };
    fault::set_threshold(1);
    check!(doc.save_file(file.path()).is_ok());
    check!(!fault::fault_pending());
}

fn load_refused_at_every_step() {
    let file = ScratchFile::new("load_refused_at_every_step");
    check!(std::fs::write(file.path(), SAMPLE).is_ok());
    let points = fault::sweep_fail_points(|| match Document::load_file(file.path()) {
        Ok(doc) => check_eq!(doc.to_string(), SAMPLE),
        Err(err) => check!(err.is_out_of_memory(), "unexpected error {err}"),
    });
    check!(points >= 4, "only {points} fail points");
}
