//! procflow demo - headless network evaluation
//!
//! Builds a small network, links the two scale factors, edits properties,
//! waits for the asynchronous branch and prints what the sinks received plus
//! the diagnostics log.

use anyhow::Context;
use procflow::{
    config::EngineConfig,
    logging,
    network::{EngineContext, MemorySink, ProcessorNetwork},
    processors::{AsyncScale, Collector, Scale, Sum, ValueSource},
};
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(std::path::PathBuf::from)
        .or_else(procflow::config::default_path);
    let config = EngineConfig::load_or_default(config_path.as_ref());
    let _log_guard = logging::init(&config.logging);

    tracing::info!("Starting procflow demo");

    let diagnostics = Arc::new(MemorySink::new());
    let engine = EngineContext::new(&config).with_diagnostics(diagnostics.clone());
    let mut network = ProcessorNetwork::with_context(engine);

    let left = ValueSource::new(1.5);
    let right = ValueSource::new(2.5);
    let right_value = right.value();
    let scale = Scale::new(10.0);
    let sync_factor = scale.factor();
    let sync_sink = Collector::new();
    let sync_values = sync_sink.values();
    let async_sink = Collector::new();
    let async_values = async_sink.values();

    // [Value] ─┐
    //          ├─► [Sum] ─► [Scale] ─► [Collector]
    // [Value] ─┘        └─► [Async Scale] ─► [Collector]
    {
        let mut batch = network.batch();
        let a = batch.add_processor(left)?;
        let b = batch.add_processor(right)?;
        let sum = batch.add_processor(Sum::new())?;
        let scale = batch.add_processor(scale)?;
        let slow = batch.add_processor(AsyncScale::new(100.0).with_delay(Duration::from_millis(20)))?;
        let sync_id = batch.add_processor(sync_sink)?;
        let async_id = batch.add_processor(async_sink)?;

        batch.add_connection(a.outport(0), sum.inport(0))?;
        batch.add_connection(b.outport(0), sum.inport(0))?;
        batch.add_connection(sum.outport(0), scale.inport(0))?;
        batch.add_connection(scale.outport(0), sync_id.inport(0))?;
        batch.add_connection(sum.outport(0), slow.inport(0))?;
        batch.add_connection(slow.outport(0), async_id.inport(0))?;

        let from = batch.property_id(scale, "factor").context("Scale has no factor")?;
        let to = batch.property_id(slow, "factor").context("Async Scale has no factor")?;
        batch.add_link(from, to)?;
    }

    if !network.wait_for_completions(None) {
        tracing::warn!("Async branch did not finish in time");
    }

    right_value.set(4.0);
    network.process_property_changes();
    network.wait_for_completions(None);

    // Copied into the async branch's factor through the link.
    sync_factor.set(20.0);
    network.process_property_changes();
    network.wait_for_completions(None);

    if let Some(report) = network.evaluator().last_report() {
        tracing::info!(
            "{} passes, last one took {}us",
            network.evaluator().pass_count(),
            report.elapsed_us
        );
    }
    tracing::info!("Synchronous branch received {:?}", sync_values.get());
    tracing::info!("Asynchronous branch received {:?}", async_values.get());

    let log = serde_json::to_string_pretty(&diagnostics.entries())
        .context("Failed to serialize diagnostics")?;
    println!("{log}");

    network.clear();
    tracing::info!("Shut down cleanly");
    Ok(())
}
