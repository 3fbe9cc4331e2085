//! Asynchronous processors: dispatch, completion, supersession and liveness

mod common;

use common::probes::{CallLog, Probe};
use common::{recording_network, test_timeout};
use procflow::network::{DiagnosticKind, InvalidationLevel, ProcessorId, ProcessorNetwork};
use procflow::processors::{AsyncScale, Collector, ValueSource};
use std::time::Duration;

/// source → background pass → sink, wired in one batch
fn chain(network: &mut ProcessorNetwork, background: Probe, log: &CallLog) -> [ProcessorId; 3] {
    let mut batch = network.batch();
    let a = batch.add_processor(Probe::source(log)).unwrap();
    let b = batch.add_processor(background).unwrap();
    let c = batch.add_processor(Probe::sink(log)).unwrap();
    batch.add_connection(a.outport(0), b.inport(0)).unwrap();
    batch.add_connection(b.outport(0), c.inport(0)).unwrap();
    [a, b, c]
}

fn value(network: &ProcessorNetwork, id: ProcessorId) -> Option<f64> {
    network.outport(id.outport(0))?.get::<f64>().copied()
}

#[test]
fn test_completion_publishes_and_reaches_downstream() {
    let log = CallLog::new();
    let mut network = ProcessorNetwork::new();
    let sink = Probe::sink(&log);
    let seen = sink.control();
    let background = Probe::background(&log, Duration::from_millis(10));
    let [a, b, c] = {
        let mut batch = network.batch();
        let a = batch.add_processor(Probe::source(&log)).unwrap();
        let b = batch.add_processor(background).unwrap();
        let c = batch.add_processor(sink).unwrap();
        batch.add_connection(a.outport(0), b.inport(0)).unwrap();
        batch.add_connection(b.outport(0), c.inport(0)).unwrap();
        [a, b, c]
    };

    let report = network.evaluator().last_report().unwrap().clone();
    assert_eq!(report.processed, vec![a]);
    assert_eq!(report.dispatched, vec![b]);
    assert_eq!(report.not_ready, vec![c]);
    assert!(network.has_pending_jobs());
    assert!(network.processor(b).unwrap().is_awaiting_completion());

    // Waiting processors are skipped, not re-run.
    assert!(network.evaluate().unwrap().is_idle());

    assert!(network.wait_for_completions(Some(test_timeout())));
    assert!(!network.has_pending_jobs());
    assert_eq!(value(&network, b), Some(2.0));
    assert_eq!(seen.last_input(), Some(2.0));
    assert_eq!(network.invalidation_level(b), Some(InvalidationLevel::Valid));
    assert!(network.evaluator().last_report().unwrap().scoped);
}

#[test]
fn test_removed_processor_completion_is_dropped() {
    let log = CallLog::new();
    let (mut network, diagnostics) = recording_network();
    let [_, b, c] = chain(
        &mut network,
        Probe::background(&log, Duration::from_millis(30)),
        &log,
    );
    assert!(network.has_pending_jobs());

    network.remove_processor(b).unwrap();
    assert!(network
        .engine()
        .pool()
        .wait_idle(test_timeout()));

    assert_eq!(network.process_completions(), 0);
    assert!(!network.has_pending_jobs());
    assert!(diagnostics.is_empty());
    assert!(!network.inport(c.inport(0)).unwrap().is_connected());
}

#[test]
fn test_superseded_job_is_discarded() {
    let log = CallLog::new();
    let (mut network, diagnostics) = recording_network();
    let background = Probe::background(&log, Duration::from_millis(30));
    let control = background.control();
    let [a, b, _] = chain(&mut network, background, &log);
    assert_eq!(control.calls(), 1);

    // New input while the first job is still running: dispatch again.
    network.invalidate(a, InvalidationLevel::InvalidOutput).unwrap();
    assert_eq!(control.calls(), 2);
    assert_eq!(control.last_input(), Some(2.0));

    assert!(network.wait_for_completions(Some(test_timeout())));
    assert!(network.engine().pool().wait_idle(test_timeout()));
    network.process_completions();

    assert_eq!(value(&network, b), Some(3.0));
    assert_eq!(diagnostics.count(DiagnosticKind::AsyncFault), 0);
    assert_eq!(control.calls(), 2);
}

#[test]
fn test_failed_job_is_reported_and_parked() {
    let log = CallLog::new();
    let (mut network, diagnostics) = recording_network();
    let background = Probe::background(&log, Duration::from_millis(1));
    let control = background.control();
    control.set_job_failing(true);
    let [_, b, c] = chain(&mut network, background, &log);

    assert!(network.wait_for_completions(Some(test_timeout())));
    let faults = diagnostics.entries();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, DiagnosticKind::AsyncFault);
    assert_eq!(faults[0].processor, Some(b));
    assert!(faults[0].message.contains("background failure"));
    assert_ne!(network.invalidation_level(b), Some(InvalidationLevel::Valid));
    assert!(value(&network, b).is_none());

    // Parked until invalidated.
    assert!(network.evaluate().unwrap().is_idle());
    assert_eq!(control.calls(), 1);

    control.set_job_failing(false);
    network.invalidate(b, InvalidationLevel::InvalidOutput).unwrap();
    assert!(network.wait_for_completions(Some(test_timeout())));
    assert_eq!(value(&network, b), Some(2.0));
    assert_eq!(network.invalidation_level(c), Some(InvalidationLevel::Valid));
}

#[test]
fn test_completion_while_locked_waits_for_unlock() {
    let log = CallLog::new();
    let mut network = ProcessorNetwork::new();
    let background = Probe::background(&log, Duration::from_millis(1));
    let control = background.control();
    let [_, b, c] = chain(&mut network, background, &log);
    assert!(network.engine().pool().wait_idle(test_timeout()));

    {
        let mut batch = network.batch();
        // Invalidated after dispatch: the result is stored but already stale.
        batch.invalidate(b, InvalidationLevel::InvalidOutput).unwrap();
        assert_eq!(batch.process_completions(), 1);
        assert_eq!(value(&batch, b), Some(2.0));
        assert_ne!(batch.invalidation_level(b), Some(InvalidationLevel::Valid));
        assert_eq!(log.count(c), 0);
    }

    // Unlocking re-runs it from current inputs.
    assert_eq!(control.calls(), 2);
    assert!(network.wait_for_completions(Some(test_timeout())));
    assert_eq!(value(&network, b), Some(2.0));
    assert_eq!(log.count(c), 1);
    assert_eq!(network.invalidation_level(b), Some(InvalidationLevel::Valid));
}

#[test]
fn test_async_scale_feeds_collector() {
    let mut network = ProcessorNetwork::new();
    let source = ValueSource::new(3.0);
    let knob = source.value();
    let collector = Collector::new();
    let seen = collector.values();
    {
        let mut batch = network.batch();
        let s = batch.add_processor(source).unwrap();
        let x = batch.add_processor(AsyncScale::new(2.0)).unwrap();
        let c = batch.add_processor(collector).unwrap();
        batch.add_connection(s.outport(0), x.inport(0)).unwrap();
        batch.add_connection(x.outport(0), c.inport(0)).unwrap();
    }

    assert!(network.wait_for_completions(Some(test_timeout())));
    assert_eq!(seen.get(), vec![6.0]);

    knob.set(5.0);
    assert_eq!(network.process_property_changes(), 1);
    assert!(network.wait_for_completions(Some(test_timeout())));
    assert_eq!(seen.get(), vec![6.0, 10.0]);
}

#[test]
fn test_dropping_network_with_jobs_in_flight() {
    let log = CallLog::new();
    let mut network = ProcessorNetwork::new();
    chain(
        &mut network,
        Probe::background(&log, Duration::from_millis(20)),
        &log,
    );
    assert!(network.has_pending_jobs());
    drop(network);
}
