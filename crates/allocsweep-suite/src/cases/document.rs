//! Node construction and mutation.

use allocsweep_harness::{
    HarnessError, Registry, check, check_alloc_fail, check_eq, fault, register_tests,
};
use allocsweep_tree::{Document, NodeId, TreeError};

use super::SAMPLE;

pub fn register(registry: &mut Registry) -> Result<(), HarnessError> {
    register_tests!(
        registry,
        [
            empty_document_allocates_nothing,
            append_keeps_insertion_order,
            clearing_a_value_releases_it,
            append_refused,
            append_refused_at_every_step,
            set_value_refused_keeps_old_value,
            clone_refused_at_every_step,
            many_children,
        ]
    );
    Ok(())
}

fn empty_document_allocates_nothing() {
    let doc = Document::new();
    check!(doc.is_empty());
    check_eq!(fault::live_count(), 0);
    check_eq!(doc.to_string(), "");
}

fn append_keeps_insertion_order() {
    let mut doc = Document::new();
    for name in ["first", "second", "third"] {
        check!(doc.append_child(NodeId::ROOT, name).is_ok());
    }
    let names: Vec<&str> = doc.children(NodeId::ROOT).map(|id| doc.name(id)).collect();
    check_eq!(names, ["first", "second", "third"]);
    check!(fault::live_count() > 0);
}

fn clearing_a_value_releases_it() {
    let mut doc = Document::new();
    let Ok(node) = doc.append_child(NodeId::ROOT, "node") else {
        allocsweep_harness::fail("append_child failed");
    };
    let before = fault::live_count();
    check!(doc.set_value(node, "some value").is_ok());
    check_eq!(fault::live_count(), before + 1);
    check!(doc.set_value(node, "").is_ok());
    check_eq!(fault::live_count(), before);
    check_eq!(doc.value(node), "");
}

fn append_refused() {
    let mut doc = Document::new();
    fault::set_threshold(1);
    check_alloc_fail! {
        check!(matches!(
            doc.append_child(NodeId::ROOT, "refused"),
            Err(TreeError::OutOfMemory)
        ));
    }
    check!(doc.is_empty());
    check_eq!(fault::live_count(), 0);
}

fn append_refused_at_every_step() {
    let points = fault::sweep_fail_points(|| {
        let mut doc = Document::new();
        for i in 0..12 {
            let before = doc.to_string();
            let len = doc.len();
            let parent = if i % 3 == 0 {
                NodeId::ROOT
            } else {
                doc.children(NodeId::ROOT).last().unwrap_or(NodeId::ROOT)
            };
            match doc.append_child(parent, &format!("n{i}")) {
                Ok(_) => {}
                Err(err) => {
                    check!(err.is_out_of_memory(), "unexpected error {err}");
                    check_eq!(doc.to_string(), before);
                    check_eq!(doc.len(), len);
                    return;
                }
            }
        }
        check_eq!(doc.len(), 12);
    });
    check!(points >= 4, "only {points} fail points");
}

fn set_value_refused_keeps_old_value() {
    let Ok(mut doc) = Document::parse("(node \"old\")") else {
        allocsweep_harness::fail("parse failed");
    };
    let Some(node) = doc.first_child(NodeId::ROOT) else {
        allocsweep_harness::fail("node missing");
    };
    fault::set_threshold(fault::live_bytes() + 1);
    check_alloc_fail! {
        check!(doc.set_value(node, "a much longer replacement").is_err());
    }
    check_eq!(doc.value(node), "old");
    fault::set_threshold(0);
    check!(doc.set_value(node, "new").is_ok());
    check_eq!(doc.value(node), "new");
}

fn clone_refused_at_every_step() {
    let Ok(doc) = Document::parse(SAMPLE) else {
        allocsweep_harness::fail("parse failed");
    };
    let points = fault::sweep_fail_points(|| match doc.try_clone() {
        Ok(copy) => check_eq!(copy.to_string(), SAMPLE),
        Err(err) => check!(err.is_out_of_memory(), "unexpected error {err}"),
    });
    check!(points > 1);
    check_eq!(doc.to_string(), SAMPLE);
}

fn many_children() {
    let mut doc = Document::new();
    let Ok(list) = doc.append_child(NodeId::ROOT, "list") else {
        allocsweep_harness::fail("append_child failed");
    };
    for i in 0..200 {
        check!(doc.append_child(list, &format!("item{i}")).is_ok());
    }
    check_eq!(doc.children(list).count(), 200);
    check!(doc.child(list, "item199").is_some());
    check!(doc.child(list, "item200").is_none());
}
