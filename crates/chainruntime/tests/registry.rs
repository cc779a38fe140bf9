use chaincore::{ChainNode, INPUT_SOURCE};
use chainruntime::SubscriptionRegistry;
use chaintools::{hold_string, int_to_string, parse_int};

#[test]
fn subscribers_accumulate_in_registration_order() {
    let mut registry = SubscriptionRegistry::new();
    let parse = parse_int();
    let to_string = int_to_string();
    let holder = hold_string();

    registry.subscribe(INPUT_SOURCE, [parse.clone()]);
    registry.subscribe("parse-int", [to_string.clone()]);
    registry.subscribe("parse-int", [holder.clone()]);

    let names: Vec<&str> = registry
        .subscribers("parse-int")
        .iter()
        .map(|n| n.name())
        .collect();
    assert_eq!(names, ["int-to-string", "hold-string"]);
}

#[test]
fn unknown_producer_has_no_subscribers() {
    let registry = SubscriptionRegistry::new();
    assert!(registry.subscribers("nowhere").is_empty());
    assert!(registry.is_empty());
}

#[test]
fn nodes_are_deduplicated_by_name() {
    let mut registry = SubscriptionRegistry::new();
    let holder = hold_string();

    // The same node listens to two producers; it is still one task.
    registry.subscribe("split-strings", [holder.clone()]);
    registry.subscribe("int-to-string", [holder.clone()]);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.subscribers("split-strings").len(), 1);
    assert_eq!(registry.subscribers("int-to-string").len(), 1);
}
