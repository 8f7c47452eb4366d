#![no_main]

use arbitrary::Arbitrary;
use fiber_core::{Element, Node};
use fiber_harness::TestRoot;
use libfuzzer_sys::fuzz_target;

const MAX_STEPS: usize = 32;
const MAX_ITEMS: usize = 24;

#[derive(Debug, Arbitrary)]
enum Step {
    /// Render a keyed list; keys repeat freely.
    Keyed(Vec<u8>),
    /// Render an unkeyed list of the given tags.
    Unkeyed(Vec<u8>),
    /// Queue a render without draining, so it coalesces with the next one.
    Deferred(Vec<u8>),
    Flush,
    Unmount,
}

fn tag(b: u8) -> &'static str {
    ["li", "p", "span"][usize::from(b % 3)]
}

fn keyed(keys: &[u8]) -> Node {
    Element::host("ul")
        .children(
            keys.iter()
                .take(MAX_ITEMS)
                .map(|k| Element::host(tag(*k)).key(k % 16).child(i64::from(*k))),
        )
        .into()
}

fn unkeyed(tags: &[u8]) -> Node {
    Element::host("ul")
        .children(tags.iter().take(MAX_ITEMS).map(|t| Element::host(tag(*t))))
        .into()
}

fuzz_target!(|steps: Vec<Step>| {
    let t = TestRoot::new();
    for step in steps.into_iter().take(MAX_STEPS) {
        match step {
            Step::Keyed(keys) => t.render(keyed(&keys)),
            Step::Unkeyed(tags) => t.render(unkeyed(&tags)),
            Step::Deferred(keys) => t.root.render(keyed(&keys)),
            Step::Flush => {
                t.settle();
            }
            Step::Unmount => {
                t.root.unmount();
                t.settle();
            }
        }
    }
    t.settle();

    let html = t.html();
    assert!(html.is_empty() || html.starts_with("<ul>"), "{html}");
    assert!(t.root.pending_lanes().is_empty());
    assert_eq!(t.stats().aborted, 0);
});
