#![forbid(unsafe_code)]

//! `proptest` generators for keyed child lists.

use fiber_core::{Element, Node};
use proptest::prelude::*;
use proptest::sample::subsequence;

/// Distinct keys drawn from `0..universe`, in random order.
pub fn keyed_list(universe: u32) -> impl Strategy<Value = Vec<u32>> {
    let all: Vec<u32> = (0..universe).collect();
    let len = all.len();
    subsequence(all, 0..=len).prop_shuffle()
}

/// A list before and after an edit that may reorder, insert and remove keys.
pub fn keyed_edit(universe: u32) -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    (keyed_list(universe), keyed_list(universe))
}

/// `<ul>` of `<li key=k>k</li>` items.
#[must_use]
pub fn keyed_items(keys: &[u32]) -> Node {
    Element::host("ul")
        .children(keys.iter().map(|k| Element::host("li").key(k).child(k.to_string())))
        .into()
}

/// Markup [`keyed_items`] renders to.
#[must_use]
pub fn keyed_items_html(keys: &[u32]) -> String {
    let items: String = keys.iter().map(|k| format!("<li>{k}</li>")).collect();
    format!("<ul>{items}</ul>")
}
