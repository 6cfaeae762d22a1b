//! Reading and writing the text form.

use allocsweep_harness::{
    HarnessError, Registry, check, check_alloc_fail, check_eq, fault, register_tests,
};
use allocsweep_tree::{Document, NodeId, ParseErrorKind, TreeError};

use super::SAMPLE;

pub fn register(registry: &mut Registry) -> Result<(), HarnessError> {
    register_tests!(
        registry,
        [
            parse_sample,
            parse_escapes,
            parse_error_releases_partial_tree,
            parse_refused_first_allocation,
            parse_refused_at_every_step,
            text_round_trip,
            deep_nesting,
        ]
    );
    Ok(())
}

fn parse_sample() {
    let Ok(doc) = Document::parse(SAMPLE) else {
        allocsweep_harness::fail("parse failed");
    };
    check_eq!(doc.len(), 9);
    let Some(users) = doc.child(NodeId::ROOT, "users") else {
        allocsweep_harness::fail("users missing");
    };
    let values: Vec<&str> = doc.children(users).map(|id| doc.value(id)).collect();
    check_eq!(values, ["alice", "bob"]);
    let port = doc
        .child(NodeId::ROOT, "config")
        .and_then(|config| doc.child(config, "server"))
        .and_then(|server| doc.child(server, "port"));
    check!(port.is_some_and(|port| doc.value(port) == "8080"));
}

fn parse_escapes() {
    let Ok(doc) = Document::parse(r#"(s "tab\there \"quoted\" back\\slash")"#) else {
        allocsweep_harness::fail("parse failed");
    };
    let Some(node) = doc.first_child(NodeId::ROOT) else {
        allocsweep_harness::fail("node missing");
    };
    check_eq!(doc.value(node), "tab\there \"quoted\" back\\slash");
}

fn parse_error_releases_partial_tree() {
    let result = Document::parse("(a (b \"x\") (c (d)) \"late\")");
    check!(matches!(
        result,
        Err(TreeError::Parse {
            kind: ParseErrorKind::MisplacedValue,
            ..
        })
    ));
    check_eq!(fault::live_count(), 0);
}

fn parse_refused_first_allocation() {
    fault::set_threshold(1);
    check_alloc_fail! {
        check!(matches!(Document::parse(SAMPLE), Err(TreeError::OutOfMemory)));
    }
    check_eq!(fault::live_count(), 0);
}

fn parse_refused_at_every_step() {
    let points = fault::sweep_fail_points(|| match Document::parse(SAMPLE) {
        Ok(doc) => check_eq!(doc.to_string(), SAMPLE),
        Err(err) => check!(err.is_out_of_memory(), "unexpected error {err}"),
    });
    check!(points >= 4, "only {points} fail points");
}

fn text_round_trip() {
    let Ok(doc) = Document::parse(SAMPLE) else {
        allocsweep_harness::fail("parse failed");
    };
    let text = doc.to_string();
    check_eq!(text, SAMPLE);
    let Ok(again) = Document::parse(&text) else {
        allocsweep_harness::fail("reparse failed");
    };
    check_eq!(again.to_string(), text);
}

fn deep_nesting() {
    let depth = 2_000;
    let text = format!("{}{}", "(n ".repeat(depth), ")".repeat(depth));
    let Ok(doc) = Document::parse(&text) else {
        allocsweep_harness::fail("parse failed");
    };
    check_eq!(doc.len(), depth);
    let mut node = NodeId::ROOT;
    let mut levels = 0;
    while let Some(child) = doc.first_child(node) {
        node = child;
        levels += 1;
    }
    check_eq!(levels, depth);
}
