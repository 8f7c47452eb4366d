#![forbid(unsafe_code)]

//! Integration tests: hook state, effects and misuse.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fiber_core::{Component, Dispatch, Element, Hooks, Node, Props, cleanup};
use fiber_harness::{LogCapture, TestRoot, assert_html};
use tracing::Level;

type Log = Rc<RefCell<Vec<String>>>;

fn counter() -> Component {
    Component::named("Counter", |hooks: &mut Hooks, _props: &Props| {
        let (count, set) = hooks.use_state(0_i64)?;
        Ok(Element::host("button")
            .on("onclick", move || {
                set.update(|n| n + 1);
                set.update(|n| n + 1);
                set.update(|n| n + 1);
            })
            .child(count)
            .into())
    })
}

/// Component whose effect depends on its `label` prop.
fn tracked(log: &Log) -> Component {
    let log = Rc::clone(log);
    Component::named("Tracked", move |hooks: &mut Hooks, props: &Props| {
        let label = props
            .get("label")
            .map(ToString::to_string)
            .unwrap_or_default();
        let log = Rc::clone(&log);
        let effect_label = label.clone();
        hooks.use_effect_with(label.clone(), move || {
            log.borrow_mut().push(format!("create {effect_label}"));
            cleanup(move || log.borrow_mut().push(format!("destroy {effect_label}")))
        })?;
        Ok(Element::host("i").child(label).into())
    })
}

// ============================================================================
// State
// ============================================================================

#[test]
fn three_dispatches_in_one_handler_batch_into_one_commit() {
    let t = TestRoot::new();
    t.render(Element::component(counter()));
    assert_html!(t, "<button>0</button>");
    let commits = t.stats().commits;

    t.fire("button", "onclick");
    assert_html!(t, "<button>3</button>");
    assert_eq!(t.stats().commits, commits + 1);
    assert_eq!(t.stats().passes_started, 2);
}

#[test]
fn separate_handlers_render_separately() {
    let t = TestRoot::new();
    t.render(Element::component(counter()));
    t.fire("button", "onclick");
    t.fire("button", "onclick");
    assert_html!(t, "<button>6</button>");
    assert_eq!(t.stats().commits, 3);
}

#[test]
fn state_survives_parent_rerenders() {
    let t = TestRoot::new();
    let app = |title: &str| {
        Element::host("main").children([
            Node::from(Element::host("h1").child(title.to_owned())),
            Element::component(counter()).into(),
        ])
    };
    t.render(app("one"));
    t.fire("button", "onclick");
    t.render(app("two"));
    assert_html!(t, "<main><h1>two</h1><button>3</button></main>");
}

#[test]
fn refs_keep_their_value_without_rendering() {
    let renders = Rc::new(Cell::new(0));
    let seen = Rc::clone(&renders);
    let component = Component::named("WithRef", move |hooks: &mut Hooks, _props: &Props| {
        seen.set(seen.get() + 1);
        let clicks = hooks.use_ref(0_u32)?;
        let handler_clicks = Rc::clone(&clicks);
        let value = *clicks.borrow();
        Ok(Element::host("a")
            .on("onclick", move || *handler_clicks.borrow_mut() += 1)
            .child(i64::from(value))
            .into())
    });
    let t = TestRoot::new();
    t.render(Element::component(component.clone()));
    t.fire("a", "onclick");
    t.fire("a", "onclick");
    assert_eq!(renders.get(), 1);

    t.render(Element::component(component));
    assert_html!(t, "<a>2</a>");
}

#[test]
fn dispatch_after_unmount_is_dropped_with_a_warning() {
    let capture = LogCapture::new();
    let _guard = capture.install();
    let slot: Rc<RefCell<Option<Dispatch<i64>>>> = Rc::default();
    let store = Rc::clone(&slot);
    let component = Component::named("Leaky", move |hooks: &mut Hooks, _props: &Props| {
        let (n, set) = hooks.use_state(0_i64)?;
        *store.borrow_mut() = Some(set);
        Ok(Node::from(n))
    });
    let t = TestRoot::new();
    t.render(Element::component(component));
    assert_html!(t, "0");
    t.root.unmount();
    t.settle();
    assert_html!(t, "");

    let set = slot.borrow_mut().take().expect("dispatch");
    t.act(|| set.set(5));
    assert_eq!(t.stats().commits, 2);
    assert!(capture.contains(Level::WARN, "unmounted component"));
}

// ============================================================================
// Misuse
// ============================================================================

#[test]
fn calling_more_hooks_than_before_aborts_the_pass() {
    let capture = LogCapture::new();
    let _guard = capture.install();
    let extra = Rc::new(Cell::new(false));
    let flag = Rc::clone(&extra);
    let component = Component::named("Growing", move |hooks: &mut Hooks, _props: &Props| {
        let (a, _) = hooks.use_state(1_i64)?;
        if flag.get() {
            let (b, _) = hooks.use_state(2_i64)?;
            return Ok(Node::from(a + b));
        }
        Ok(Node::from(a))
    });
    let t = TestRoot::new();
    t.render(Element::component(component.clone()));
    assert_html!(t, "1");

    extra.set(true);
    t.render(Element::component(component));
    assert_html!(t, "1");
    assert_eq!(t.stats().aborted, 1);
    assert!(capture.contains(Level::ERROR, "render failed"));
    let failure = capture.at(Level::ERROR).pop().expect("error event");
    assert!(failure.field("error").is_some_and(|e| e.contains("more hooks")));
}

#[test]
fn ignored_hook_errors_still_abort() {
    let extra = Rc::new(Cell::new(false));
    let flag = Rc::clone(&extra);
    let component = Component::named("Swallow", move |hooks: &mut Hooks, _props: &Props| {
        let (a, _) = hooks.use_state(1_i64)?;
        if flag.get() {
            let _ = hooks.use_ref("ignored");
        }
        Ok(Node::from(a))
    });
    let t = TestRoot::new();
    t.render(Element::component(component.clone()));
    extra.set(true);
    t.render(Element::component(component));
    assert_eq!(t.stats().aborted, 1);
    assert_eq!(t.stats().commits, 1);
}

#[test]
fn calling_fewer_hooks_than_before_aborts_the_pass() {
    let fewer = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fewer);
    let component = Component::named("Shrinking", move |hooks: &mut Hooks, _props: &Props| {
        let (a, _) = hooks.use_state(1_i64)?;
        if !flag.get() {
            hooks.use_effect(|| None)?;
        }
        Ok(Node::from(a))
    });
    let t = TestRoot::new();
    t.render(Element::component(component.clone()));
    fewer.set(true);
    t.render(Element::component(component));
    assert_eq!(t.stats().aborted, 1);
}

// ============================================================================
// Effects
// ============================================================================

#[test]
fn effects_run_after_commit_and_clean_up_before_rerunning() {
    let log: Log = Rc::default();
    let component = tracked(&log);
    let t = TestRoot::new();

    t.root.render(Element::component(component.clone()).prop("label", "a"));
    t.root.flush_sync();
    assert_html!(t, "<i>a</i>");
    assert!(log.borrow().is_empty(), "passive effects wait for their own batch");
    t.settle();
    assert_eq!(*log.borrow(), ["create a"]);

    t.render(Element::component(component.clone()).prop("label", "a"));
    assert_eq!(log.borrow().len(), 1, "unchanged deps skip the effect");

    t.render(Element::component(component).prop("label", "b"));
    assert_eq!(*log.borrow(), ["create a", "destroy a", "create b"]);

    t.root.unmount();
    t.settle();
    assert_eq!(*log.borrow(), ["create a", "destroy a", "create b", "destroy b"]);
}

#[test]
fn all_cleanups_run_before_any_create() {
    let log: Log = Rc::default();
    let component = tracked(&log);
    let pair = |x: &str, y: &str| {
        Element::host("div").children([
            Element::component(component.clone()).key("x").prop("label", x.to_owned()),
            Element::component(component.clone()).key("y").prop("label", y.to_owned()),
        ])
    };
    let t = TestRoot::new();
    t.render(pair("x1", "y1"));
    log.borrow_mut().clear();

    t.render(pair("x2", "y2"));
    assert_eq!(*log.borrow(), ["destroy x1", "destroy y1", "create x2", "create y2"]);
}

#[test]
fn inline_effects_run_at_the_end_of_commit() {
    let log: Log = Rc::default();
    let t = TestRoot::with_config(
        fiber_core::ReconcilerConfig::default().with_defer_passive_effects(false),
    );
    t.root.render(Element::component(tracked(&log)).prop("label", "now"));
    t.root.flush_sync();
    assert_eq!(*log.borrow(), ["create now"]);
}

#[test]
fn effect_updates_schedule_another_render() {
    let component = Component::named("Loader", |hooks: &mut Hooks, _props: &Props| {
        let (status, set) = hooks.use_state("loading".to_owned())?;
        hooks.use_effect_with((), move || {
            set.set("ready".to_owned());
            None
        })?;
        Ok(Element::host("p").child(status).into())
    });
    let t = TestRoot::new();
    t.render(Element::component(component));
    assert_html!(t, "<p>ready</p>");
    assert_eq!(t.stats().commits, 2);
}
