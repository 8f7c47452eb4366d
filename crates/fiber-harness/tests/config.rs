#![forbid(unsafe_code)]

//! Integration tests: configuration reaching the root.

use fiber_core::{Element, Lanes, ReconcilerConfig};
use fiber_harness::{LogCapture, TestRoot};
use tracing::Level;

#[test]
fn root_keeps_its_config() {
    let config = ReconcilerConfig::default()
        .with_max_nested_updates(9)
        .with_default_lane(Lanes::TRANSITION);
    let t = TestRoot::with_config(config.clone());
    assert_eq!(t.root.config(), &config);
}

#[test]
fn duplicate_key_warnings_can_be_silenced() {
    let capture = LogCapture::new();
    let _guard = capture.install();
    let t = TestRoot::with_config(ReconcilerConfig::default().with_warn_on_duplicate_keys(false));
    t.render(Element::host("ul").children([
        Element::host("li").key("same"),
        Element::host("li").key("same"),
    ]));
    t.render(Element::host("ul").children([
        Element::host("li").key("same"),
        Element::host("li").key("same"),
    ]));
    assert_eq!(t.find_all("li").len(), 2);
    assert!(!capture.contains(Level::WARN, "share a key"));
}

#[cfg(feature = "config-file")]
#[test]
fn config_file_drives_the_root() {
    let config = ReconcilerConfig::from_toml_str(
        "default_lane = \"default\"\ndefer_passive_effects = false\n",
    )
    .expect("valid config");
    let t = TestRoot::with_config(config);
    assert_eq!(t.root.config().default_lane, Lanes::DEFAULT);
    assert!(!t.root.config().defer_passive_effects);
    assert_eq!(t.root.config().max_nested_updates, 50);
}

#[cfg(feature = "config-file")]
#[test]
fn missing_config_file_is_an_io_error() {
    let err = ReconcilerConfig::from_toml_file("/nonexistent/frankenfiber.toml")
        .expect_err("missing file");
    assert!(matches!(err, fiber_core::ConfigError::Io(_)));
}
