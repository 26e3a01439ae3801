//! Tracing integration tests
//!
//! One tracer can follow several programs running under a hub.

use std::cell::RefCell;
use std::rc::Rc;

use eddy_debug::{HumanFormatter, TraceConfig, TraceEvent, TraceFormatter, Tracer};
use eddy_engine::{Hub, Program, RecordSpec, Rule};
use eddy_store::Diff;

use crate::e;

fn traced_hub(tracer: &Rc<RefCell<Tracer>>) -> Hub {
    let mut app = Program::new("app");
    app.register(
        Rule::watch("render", "dom")
            .find("?e", "tag", "button")
            .add("?e", "dom-tag", "button"),
    )
    .unwrap();
    app.register(
        Rule::commit("click")
            .find("?e", "click", true)
            .remove("?e", "click", true)
            .record(RecordSpec::new("?c").tag("click-log").attr("on", "?e")),
    )
    .unwrap();
    app.subscribe(Rc::clone(tracer));

    let mut dom = Program::new("dom");
    dom.subscribe(Rc::clone(tracer));

    let mut hub = Hub::new();
    hub.add_program(app).unwrap();
    hub.add_program(dom).unwrap();
    hub.route("app", "dom", "dom").unwrap();
    hub
}

#[test]
fn one_tracer_follows_every_program() {
    let tracer = Rc::new(RefCell::new(Tracer::new(TraceConfig::enabled())));
    let mut hub = traced_hub(&tracer);
    hub.submit("app", Diff::new().with_add(e(1), "tag", "button").with_add(e(1), "click", true))
        .unwrap();
    hub.run().unwrap();

    let tracer = tracer.borrow();
    let buffer = tracer.buffer();
    let app = buffer.records_for_round("app", 1);
    assert!(matches!(app.first().map(|r| &r.event), Some(TraceEvent::RoundStart { round: 1 })));
    assert!(matches!(app.last().map(|r| &r.event), Some(TraceEvent::RoundEnd { round: 1, .. })));
    assert_eq!(buffer.by_event_type("commit-fired").len(), 1);
    let forwarded: Vec<_> = buffer
        .by_event_type("diff-forwarded")
        .into_iter()
        .map(|r| &r.event)
        .collect();
    assert_eq!(
        forwarded,
        vec![&TraceEvent::DiffForwarded {
            channel: "dom".to_string(),
            changes: 1,
        }]
    );

    let dom = buffer.records_for_program("dom");
    assert!(dom.iter().any(|r| r.event.is_fact_event()));
    assert_eq!(tracer.stats().newest_rounds["dom"], 1);
}

#[test]
fn human_output_reads_as_a_log() {
    let tracer = Rc::new(RefCell::new(Tracer::new(TraceConfig::enabled())));
    let mut hub = traced_hub(&tracer);
    hub.submit("app", Diff::new().with_add(e(1), "click", true)).unwrap();
    hub.run().unwrap();

    let tracer = tracer.borrow();
    let records: Vec<_> = tracer.buffer().records_for_program("app");
    let text = HumanFormatter::new().format_many(&records);
    assert!(text.starts_with("app#0001 === ROUND 1 START ==="));
    assert!(text.contains("COMMIT \"click\" {?e=#1}"));
    // the click was consumed within the round, so it never shows up
    assert!(!text.contains("click true"));
}

#[test]
fn exported_traces_can_be_reloaded() {
    let tracer = Rc::new(RefCell::new(Tracer::new(TraceConfig::enabled().with_buffer_size(8))));
    let mut hub = traced_hub(&tracer);
    for _ in 0..3 {
        hub.submit("app", Diff::new().with_add(e(1), "click", true)).unwrap();
        hub.run().unwrap();
    }

    let tracer = tracer.borrow();
    assert_eq!(tracer.buffer().len(), 8);
    let bytes = tracer.export().unwrap();
    let records = Tracer::import(&bytes).unwrap();
    let buffered: Vec<_> = tracer.buffer().iter().cloned().collect();
    assert_eq!(records, buffered);
}
