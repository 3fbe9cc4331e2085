//! Evaluation passes.
//!
//! # Architecture
//!
//! ```text
//!  ensure_plan ──► for id in plan.order ──► visit(id)
//!  (generation      (optionally scoped)       ├─ valid / waiting / parked → skip
//!   check, Kahn)                              ├─ not ready                → skip
//!                                             └─ process()
//!                                                  ├─ Ok, no job  → commit, reset
//!                                                  ├─ Ok, job     → commit, dispatch
//!                                                  └─ Err / panic → report, keep level
//! ```
//!
//! A pass never touches anything when the topology has a cycle. A failing
//! processor is isolated: its level stays raised, its consumers see an
//! invalid outport and are skipped, unrelated branches carry on.

use super::diagnostics::{Diagnostic, DiagnosticKind};
use super::engine::EngineContext;
use super::error::{NetworkResult, ProcessorError};
use super::graph::Graph;
use super::id::ProcessorId;
use super::pool::JobTicket;
use super::context::{InportStates, ProcessContext};
use super::topology::{EvaluationPlan, TopologyCompiler};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// What happened during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Sequence number, starting at 1.
    pub pass: u64,
    /// Limited to a subset of processors (async follow-up).
    pub scoped: bool,
    /// Requested while the network was locked; nothing ran.
    pub suppressed: bool,
    /// `process()` succeeded and the processor is valid again.
    pub processed: Vec<ProcessorId>,
    /// `process()` succeeded and handed work to the pool.
    pub dispatched: Vec<ProcessorId>,
    /// `process()` failed or panicked.
    pub failed: Vec<ProcessorId>,
    /// Invalid but not ready.
    pub not_ready: Vec<ProcessorId>,
    pub elapsed_us: u64,
}

impl PassReport {
    pub(crate) fn suppressed() -> Self {
        Self {
            suppressed: true,
            ..Self::default()
        }
    }

    /// Number of `process()` calls made.
    pub fn process_calls(&self) -> usize {
        self.processed.len() + self.dispatched.len() + self.failed.len()
    }

    pub fn is_idle(&self) -> bool {
        self.process_calls() == 0
    }
}

enum Visit {
    Skipped,
    NotReady,
    Processed,
    Dispatched,
    Failed,
}

/// Walks a graph in dependency order. Holds nothing between passes except
/// the cached plan and statistics.
#[derive(Debug, Default)]
pub struct NetworkEvaluator {
    plan: Option<EvaluationPlan>,
    passes: u64,
    last_report: Option<PassReport>,
}

impl NetworkEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes that actually ran (cycle failures and suppressed passes excluded).
    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    pub fn last_report(&self) -> Option<&PassReport> {
        self.last_report.as_ref()
    }

    /// The cached plan, if one was compiled for some generation.
    pub fn plan(&self) -> Option<&EvaluationPlan> {
        self.plan.as_ref()
    }

    /// Visits every invalid processor in topological order.
    pub fn evaluate(&mut self, graph: &mut Graph, engine: &EngineContext) -> NetworkResult<PassReport> {
        self.run(graph, engine, None)
    }

    /// Like [`evaluate`](Self::evaluate) but only visits processors in `scope`.
    pub fn evaluate_scoped(
        &mut self,
        graph: &mut Graph,
        engine: &EngineContext,
        scope: &BTreeSet<ProcessorId>,
    ) -> NetworkResult<PassReport> {
        self.run(graph, engine, Some(scope))
    }

    fn recompile_if_needed(&mut self, graph: &Graph) -> NetworkResult<()> {
        if self
            .plan
            .as_ref()
            .is_some_and(|plan| plan.generation == graph.generation())
        {
            return Ok(());
        }

        let plan = TopologyCompiler::compile(graph)?;
        tracing::info!(
            "Network recompiled: {} processors, {} connections (gen {})",
            plan.stats.total_processors,
            plan.stats.connections,
            plan.generation,
        );
        self.plan = Some(plan);
        Ok(())
    }

    fn run(
        &mut self,
        graph: &mut Graph,
        engine: &EngineContext,
        scope: Option<&BTreeSet<ProcessorId>>,
    ) -> NetworkResult<PassReport> {
        let started = Instant::now();

        if let Err(err) = self.recompile_if_needed(graph) {
            engine.report(Diagnostic::from_error(&err));
            return Err(err);
        }
        let order = self
            .plan
            .as_ref()
            .map(|plan| plan.order.clone())
            .unwrap_or_default();

        self.passes += 1;
        let mut report = PassReport {
            pass: self.passes,
            scoped: scope.is_some(),
            ..PassReport::default()
        };

        for id in order {
            if scope.is_some_and(|scope| !scope.contains(&id)) {
                continue;
            }
            match Self::visit(graph, engine, id) {
                Visit::Skipped => {}
                Visit::NotReady => report.not_ready.push(id),
                Visit::Processed => report.processed.push(id),
                Visit::Dispatched => report.dispatched.push(id),
                Visit::Failed => report.failed.push(id),
            }
        }

        report.elapsed_us = started.elapsed().as_micros() as u64;
        tracing::debug!(
            pass = report.pass,
            scoped = report.scoped,
            processed = report.processed.len(),
            dispatched = report.dispatched.len(),
            failed = report.failed.len(),
            not_ready = report.not_ready.len(),
            "Evaluation pass finished in {}us",
            report.elapsed_us
        );
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn visit(graph: &mut Graph, engine: &EngineContext, id: ProcessorId) -> Visit {
        let states = graph.inport_states(id);
        let inputs = graph.gather_inputs(id);
        let Some(slot) = graph.slot_mut(id) else {
            return Visit::Skipped;
        };

        let level = slot.invalidation_level();
        if level.is_valid() || slot.is_waiting_on_job() || slot.is_parked_after_failure() {
            return Visit::Skipped;
        }
        if !slot.processor.is_ready(&InportStates::new(&states)) {
            return Visit::NotReady;
        }

        let capabilities = slot.processor.capabilities();
        let processor = &mut slot.processor;
        let mut ctx = ProcessContext::new(
            id,
            &slot.identifier,
            level,
            &inputs,
            &slot.outports,
            capabilities,
        );

        let outcome = if engine.catch_panics() {
            panic::catch_unwind(AssertUnwindSafe(|| processor.process(&mut ctx)))
                .unwrap_or_else(|payload| Err(ProcessorError::from_panic(payload.as_ref())))
        } else {
            processor.process(&mut ctx)
        };
        let (outputs, job) = ctx.into_parts();
        slot.record_process();

        let error = match outcome.and_then(|()| slot.commit_outputs(outputs)) {
            Ok(()) => match job {
                None => {
                    slot.set_valid();
                    return Visit::Processed;
                }
                Some(job) => {
                    let (epoch, stop) = slot.begin_job();
                    let ticket = JobTicket {
                        processor: id,
                        epoch,
                        stop,
                    };
                    match engine.pool().submit(job, ticket, engine.front_queue().sender()) {
                        Ok(()) => return Visit::Dispatched,
                        Err(error) => {
                            slot.cancel_job();
                            error
                        }
                    }
                }
            },
            Err(error) => error,
        };

        slot.mark_failed();
        engine.report(
            Diagnostic::new(DiagnosticKind::ProcessorFault, error.to_string())
                .with_processor(id, slot.identifier.clone()),
        );
        Visit::Failed
    }
}
