//! The public processor network.
//!
//! Every mutator takes the re-entrant lock for its own duration. Evaluation
//! is suppressed while the lock is held and runs once when the outermost
//! holder releases it, so a batch of edits is only ever evaluated in its
//! final shape.
//!
//! Property changes arrive the same way async completions do: queued from
//! any thread, applied on the network thread by `evaluate()`, the outermost
//! unlock or `process_property_changes()`. Applying a change invalidates the
//! owner and copies the value along its property links.

use super::connection::Connection;
use super::diagnostics::{Diagnostic, DiagnosticKind};
use super::engine::EngineContext;
use super::error::{NetworkError, NetworkResult};
use super::evaluator::{NetworkEvaluator, PassReport};
use super::graph::Graph;
use super::id::{InportId, OutportId, ProcessorId};
use super::invalidation::InvalidationLevel;
use super::lock::NetworkLock;
use super::multi_inport::AnyInport;
use super::observer::{NetworkEvent, ObserverRegistry, Subscription};
use super::pool::Completion;
use super::port::Outport;
use super::processor::{Processor, ProcessorSlot};
use super::property::{PropertyId, PropertyLink, PropertyRef};
use super::topology;
use crate::config::EngineConfig;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

pub struct ProcessorNetwork {
    graph: Graph,
    evaluator: NetworkEvaluator,
    engine: EngineContext,
    observers: ObserverRegistry,
    lock_count: usize,
    /// Something changed while locked.
    modified: bool,
    identifiers: HashMap<String, ProcessorId>,
    links: Vec<PropertyLink>,
}

impl ProcessorNetwork {
    pub fn new() -> Self {
        Self::with_context(EngineContext::default())
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_context(EngineContext::new(config))
    }

    pub fn with_context(engine: EngineContext) -> Self {
        Self {
            graph: Graph::new(),
            evaluator: NetworkEvaluator::new(),
            engine,
            observers: ObserverRegistry::new(),
            lock_count: 0,
            modified: false,
            identifiers: HashMap::new(),
            links: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn evaluator(&self) -> &NetworkEvaluator {
        &self.evaluator
    }

    pub fn engine(&self) -> &EngineContext {
        &self.engine
    }

    // ==================== Locking ====================

    pub fn lock(&mut self) {
        self.lock_count += 1;
    }

    /// Releases one level of locking. The outermost release checks integrity,
    /// notifies observers and runs a pass if anything changed meanwhile.
    pub fn unlock(&mut self) {
        if self.lock_count == 0 {
            tracing::warn!("unlock() called on an unlocked network");
            return;
        }
        self.lock_count -= 1;
        if self.lock_count > 0 {
            return;
        }

        let integrity = self.graph.validate();
        if let Err(err) = &integrity {
            self.engine.report(Diagnostic::from_error(err));
        }
        debug_assert!(integrity.is_ok(), "network integrity violated: {integrity:?}");

        self.observers.notify(&NetworkEvent::Unlocked);

        self.apply_property_changes();
        if self.modified {
            self.modified = false;
            // Failures already went to the diagnostic sink.
            let _ = self.evaluator.evaluate(&mut self.graph, &self.engine);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    pub fn lock_depth(&self) -> usize {
        self.lock_count
    }

    /// Locks until the returned guard is dropped.
    pub fn batch(&mut self) -> NetworkLock<'_> {
        NetworkLock::new(self)
    }

    // ==================== Evaluation ====================

    /// Runs a pass now. While locked the pass is deferred to the outermost
    /// unlock and a suppressed report is returned.
    pub fn evaluate(&mut self) -> NetworkResult<PassReport> {
        if self.is_locked() {
            self.modified = true;
            return Ok(PassReport::suppressed());
        }
        self.apply_property_changes();
        self.modified = false;
        self.evaluator.evaluate(&mut self.graph, &self.engine)
    }

    /// Raises `processor` to `level` and everything downstream to
    /// `InvalidOutput`, then evaluates (unless locked).
    pub fn invalidate(&mut self, processor: ProcessorId, level: InvalidationLevel) -> NetworkResult<()> {
        if !self.graph.contains(processor) {
            return Err(NetworkError::UnknownProcessor(processor));
        }
        self.lock();
        self.graph.invalidate(processor, level);
        self.modified |= !level.is_valid();
        self.unlock();
        Ok(())
    }

    pub fn invalidation_level(&self, processor: ProcessorId) -> Option<InvalidationLevel> {
        self.graph
            .slot(processor)
            .map(ProcessorSlot::invalidation_level)
    }

    // ==================== Processors ====================

    pub fn add_processor<P: Processor + 'static>(&mut self, processor: P) -> NetworkResult<ProcessorId> {
        self.add_boxed_processor(Box::new(processor))
    }

    /// Initializes the processor and inserts it fully invalid. Nothing changes
    /// if the port layout is rejected or initialization fails.
    pub fn add_boxed_processor(&mut self, processor: Box<dyn Processor>) -> NetworkResult<ProcessorId> {
        let identifier = self.unique_identifier(processor.display_name());
        let id = self.graph.next_id()?;
        let mut slot = ProcessorSlot::new(id, identifier.clone(), processor)?;

        if let Err(e) = slot.initialize() {
            let err = NetworkError::Initialization {
                identifier,
                message: e.to_string(),
            };
            self.engine.report(Diagnostic::from_error(&err));
            return Err(err);
        }

        slot.bind_properties(&self.engine.property_queue().sender());
        self.lock();
        self.graph.insert(slot);
        self.identifiers.insert(identifier.clone(), id);
        self.graph.invalidate(id, InvalidationLevel::InvalidResources);
        self.modified = true;
        tracing::info!("Added processor '{}' as {}", identifier, id);
        self.observers
            .notify(&NetworkEvent::ProcessorAdded { id, identifier });
        self.unlock();

        Ok(id)
    }

    /// Deinitializes the processor, drops its property links, detaches its
    /// connections and drops it. Results of its in-flight jobs are discarded.
    pub fn remove_processor(&mut self, processor: ProcessorId) -> NetworkResult<()> {
        if !self.graph.contains(processor) {
            return Err(NetworkError::UnknownProcessor(processor));
        }
        self.lock();

        if let Some(slot) = self.graph.slot_mut(processor) {
            slot.deinitialize();
        }
        let (dropped, kept) = self
            .links
            .iter()
            .partition::<Vec<PropertyLink>, _>(|link| link.involves(processor));
        self.links = kept;
        for link in dropped {
            tracing::info!("Unlinked {}", link);
            self.observers.notify(&NetworkEvent::LinkRemoved(link));
        }
        for connection in self.graph.connections_of(processor) {
            self.detach(connection);
        }
        if let Some(slot) = self.graph.take(processor) {
            self.identifiers.remove(slot.identifier());
            tracing::info!("Removed processor '{}' ({})", slot.identifier(), processor);
            self.observers.notify(&NetworkEvent::ProcessorRemoved {
                id: processor,
                identifier: slot.identifier,
            });
        }
        self.modified = true;

        self.unlock();
        Ok(())
    }

    /// Removes every processor inside one lock.
    pub fn clear(&mut self) {
        self.lock();
        for id in self.graph.processor_ids() {
            let _ = self.remove_processor(id);
        }
        self.unlock();
    }

    pub fn processor(&self, processor: ProcessorId) -> Option<&ProcessorSlot> {
        self.graph.slot(processor)
    }

    pub fn processor_by_identifier(&self, identifier: &str) -> Option<&ProcessorSlot> {
        self.identifiers
            .get(identifier)
            .and_then(|&id| self.graph.slot(id))
    }

    /// Renames a processor. Identifiers stay unique across the network.
    pub fn set_identifier(&mut self, processor: ProcessorId, identifier: impl Into<String>) -> NetworkResult<()> {
        let identifier = identifier.into();
        match self.identifiers.get(&identifier) {
            Some(&owner) if owner == processor => return Ok(()),
            Some(_) => return Err(NetworkError::DuplicateIdentifier(identifier)),
            None => {}
        }

        let slot = self
            .graph
            .slot_mut(processor)
            .ok_or(NetworkError::UnknownProcessor(processor))?;
        let previous = std::mem::replace(&mut slot.identifier, identifier.clone());
        self.identifiers.remove(&previous);
        self.identifiers.insert(identifier.clone(), processor);
        tracing::debug!("Renamed '{}' to '{}'", previous, identifier);
        Ok(())
    }

    /// Live processors in registration order.
    pub fn processors(&self) -> impl Iterator<Item = &ProcessorSlot> {
        self.graph.processors()
    }

    pub fn for_each_processor<F>(&self, mut f: F)
    where
        F: FnMut(&ProcessorSlot),
    {
        for slot in self.graph.processors() {
            f(slot);
        }
    }

    pub fn processor_count(&self) -> usize {
        self.graph.len()
    }

    pub fn sink_processors(&self) -> Vec<ProcessorId> {
        self.graph
            .processors()
            .filter(|slot| slot.is_sink())
            .map(ProcessorSlot::id)
            .collect()
    }

    fn unique_identifier(&self, base: &str) -> String {
        if !self.identifiers.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base} {n}"))
            .find(|candidate| !self.identifiers.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    // ==================== Connections ====================

    /// Connects `outport` to `inport`. An identical existing connection is
    /// returned as is.
    pub fn add_connection(&mut self, outport: OutportId, inport: InportId) -> NetworkResult<Connection> {
        if self.graph.is_connected(outport, inport) {
            return Ok(Connection::new(outport, inport));
        }

        self.lock();
        let result = self.graph.connect(outport, inport);
        if let Ok(connection) = result {
            self.graph
                .invalidate(connection.target(), InvalidationLevel::InvalidOutput);
            self.modified = true;
            tracing::info!("Connected {}", connection);
            self.observers
                .notify(&NetworkEvent::ConnectionAdded(connection));
        }
        self.unlock();

        result
    }

    /// `false` if there was no such connection.
    pub fn remove_connection(&mut self, outport: OutportId, inport: InportId) -> bool {
        if !self.graph.is_connected(outport, inport) {
            return false;
        }
        self.lock();
        let removed = self.detach(Connection::new(outport, inport));
        self.unlock();
        removed
    }

    fn detach(&mut self, connection: Connection) -> bool {
        let Some(connection) = self
            .graph
            .disconnect(connection.outport(), connection.inport())
        else {
            return false;
        };
        self.graph
            .invalidate(connection.target(), InvalidationLevel::InvalidOutput);
        self.modified = true;
        tracing::info!("Disconnected {}", connection);
        self.observers
            .notify(&NetworkEvent::ConnectionRemoved(connection));
        true
    }

    pub fn is_connected(&self, outport: OutportId, inport: InportId) -> bool {
        self.graph.is_connected(outport, inport)
    }

    /// Connections in the order they were made.
    pub fn connections(&self) -> &[Connection] {
        self.graph.connections()
    }

    pub fn outport(&self, id: OutportId) -> Option<&Outport> {
        self.graph.outport(id)
    }

    pub fn inport(&self, id: InportId) -> Option<&AnyInport> {
        self.graph.inport(id)
    }

    pub fn outport_by_name(&self, processor: ProcessorId, name: &str) -> Option<&Outport> {
        self.graph.slot(processor)?.outport_by_name(name)
    }

    pub fn inport_by_name(&self, processor: ProcessorId, name: &str) -> Option<&AnyInport> {
        self.graph.slot(processor)?.inport_by_name(name)
    }

    // ==================== Properties ====================

    pub fn property(&self, id: PropertyId) -> Option<&PropertyRef> {
        self.graph.slot(id.processor())?.property(id.index())
    }

    pub fn property_id(&self, processor: ProcessorId, name: &str) -> Option<PropertyId> {
        let index = self.graph.slot(processor)?.property_index(name)?;
        Some(processor.property(index))
    }

    /// Applies every queued property change now and evaluates (unless
    /// locked). Returns how many changes hit a live property.
    pub fn process_property_changes(&mut self) -> usize {
        self.lock();
        let applied = self.apply_property_changes();
        self.unlock();
        applied
    }

    /// Invalidates the owner of each changed property, then copies its value
    /// into every property reachable over links. Owners of targets whose
    /// value changed are invalidated too. Each target is visited once per
    /// change, so link cycles terminate.
    fn apply_property_changes(&mut self) -> usize {
        let mut changed = self.engine.property_queue().drain();
        changed.dedup();
        let mut applied = 0;

        for root in changed {
            let Some(property) = self.property(root).cloned() else {
                tracing::trace!("Ignoring change of detached property {}", root);
                continue;
            };
            applied += 1;
            tracing::debug!("Property '{}' of {} changed", property.name(), root.processor());

            let value = property.snapshot();
            let mut touched = vec![(root.processor(), property.invalidation_level())];
            let mut visited = HashSet::from([root]);
            let mut pending = vec![root];
            while let Some(source) = pending.pop() {
                for link in self.links.iter().filter(|link| link.source() == source) {
                    let target = link.target();
                    if !visited.insert(target) {
                        continue;
                    }
                    pending.push(target);
                    if let Some(linked) = self.property(target) {
                        if linked.assign(&*value) {
                            touched.push((target.processor(), linked.invalidation_level()));
                        }
                    }
                }
            }

            for (processor, level) in touched {
                self.graph.invalidate(processor, level);
                self.modified |= !level.is_valid();
            }
        }
        applied
    }

    // ==================== Links ====================

    /// Links `source` to `target`. Nothing is copied until `source` changes.
    /// An identical existing link is returned as is.
    pub fn add_link(&mut self, source: PropertyId, target: PropertyId) -> NetworkResult<PropertyLink> {
        let link = PropertyLink::new(source, target);
        if self.links.contains(&link) {
            return Ok(link);
        }
        self.check_link(link)?;

        self.lock();
        self.links.push(link);
        tracing::info!("Linked {}", link);
        self.observers.notify(&NetworkEvent::LinkAdded(link));
        self.unlock();
        Ok(link)
    }

    fn check_link(&self, link: PropertyLink) -> NetworkResult<()> {
        let source = self
            .property(link.source())
            .ok_or(NetworkError::UnknownProperty(link.source()))?;
        let target = self
            .property(link.target())
            .ok_or(NetworkError::UnknownProperty(link.target()))?;
        let reason = if link.source() == link.target() {
            "a property cannot link to itself".to_string()
        } else if source.value_type() != target.value_type() {
            format!(
                "{} cannot be copied into {}",
                source.value_type_name(),
                target.value_type_name()
            )
        } else {
            return Ok(());
        };
        Err(NetworkError::IncompatibleLink { link, reason })
    }

    /// `false` if there was no such link.
    pub fn remove_link(&mut self, source: PropertyId, target: PropertyId) -> bool {
        let link = PropertyLink::new(source, target);
        let Some(position) = self.links.iter().position(|&l| l == link) else {
            return false;
        };
        self.lock();
        self.links.remove(position);
        tracing::info!("Unlinked {}", link);
        self.observers.notify(&NetworkEvent::LinkRemoved(link));
        self.unlock();
        true
    }

    /// Directional: `source` changes are copied into `target`.
    pub fn is_linked(&self, source: PropertyId, target: PropertyId) -> bool {
        self.links.contains(&PropertyLink::new(source, target))
    }

    pub fn is_linked_bidirectional(&self, a: PropertyId, b: PropertyId) -> bool {
        self.is_linked(a, b) && self.is_linked(b, a)
    }

    /// Links in the order they were made.
    pub fn links(&self) -> &[PropertyLink] {
        &self.links
    }

    /// Links from either processor to the other.
    pub fn links_between(&self, a: ProcessorId, b: ProcessorId) -> Vec<PropertyLink> {
        self.links
            .iter()
            .filter(|link| {
                let (from, to) = (link.source().processor(), link.target().processor());
                (from == a && to == b) || (from == b && to == a)
            })
            .copied()
            .collect()
    }

    /// Every property a change of `property` reaches, in visiting order.
    pub fn properties_linked_to(&self, property: PropertyId) -> Vec<PropertyId> {
        let mut visited = HashSet::from([property]);
        let mut reached = Vec::new();
        let mut pending = vec![property];
        while let Some(source) = pending.pop() {
            for link in self.links.iter().filter(|link| link.source() == source) {
                if visited.insert(link.target()) {
                    reached.push(link.target());
                    pending.push(link.target());
                }
            }
        }
        reached
    }

    // ==================== Observers ====================

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(handler)
    }

    // ==================== Async completions ====================

    /// Some processor still waits for a job, or results are queued.
    pub fn has_pending_jobs(&self) -> bool {
        self.graph.processors().any(ProcessorSlot::is_awaiting_completion)
            || !self.engine.front_queue().is_empty()
    }

    /// Applies every queued completion without blocking. Returns how many
    /// were applied (stale ones are not counted).
    pub fn process_completions(&mut self) -> usize {
        let completions = self.engine.front_queue().drain();
        self.apply_completions(completions)
    }

    /// Applies completions as they arrive until no job is pending or
    /// `timeout` (default: the configured completion timeout) runs out.
    /// Returns `true` when nothing is pending any more.
    pub fn wait_for_completions(&mut self, timeout: Option<Duration>) -> bool {
        let deadline = Instant::now() + timeout.unwrap_or_else(|| self.engine.completion_timeout());
        loop {
            self.process_completions();
            if !self.has_pending_jobs() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!("Timed out waiting for async completions");
                return false;
            }
            if let Some(completion) = self.engine.front_queue().recv_timeout(deadline - now) {
                self.apply_completions(vec![completion]);
            }
        }
    }

    fn apply_completions(&mut self, completions: Vec<Completion>) -> usize {
        let mut applied = 0;
        let mut scope = BTreeSet::new();
        for completion in completions {
            if let Some(processor) = self.apply_completion(completion) {
                applied += 1;
                scope.insert(processor);
                scope.extend(topology::successors(&self.graph, processor));
            }
        }
        if applied == 0 {
            return 0;
        }

        if self.is_locked() {
            self.modified = true;
        } else if let Err(err) = self
            .evaluator
            .evaluate_scoped(&mut self.graph, &self.engine, &scope)
        {
            tracing::debug!("Follow-up pass after completion failed: {}", err);
        }
        applied
    }

    fn apply_completion(&mut self, completion: Completion) -> Option<ProcessorId> {
        let Completion {
            processor,
            epoch,
            liveness,
            result,
        } = completion;

        if !liveness.is_alive() {
            tracing::trace!("Discarding completion for removed processor {}", processor);
            return None;
        }
        let slot = self.graph.slot_mut(processor)?;
        let Some(job) = slot.finish_job(epoch) else {
            tracing::debug!("Discarding stale completion {} for '{}'", epoch, slot.identifier());
            return None;
        };

        match result.and_then(|outputs| slot.commit_outputs(outputs)) {
            Ok(()) => {
                // A newer invalidation means the outputs are already outdated.
                if slot.invalidations() == job.invalidation_mark {
                    slot.set_valid();
                }
            }
            Err(error) => {
                slot.mark_failed_at(job.invalidation_mark);
                let diagnostic = Diagnostic::new(DiagnosticKind::AsyncFault, error.to_string())
                    .with_processor(processor, slot.identifier.clone());
                self.engine.report(diagnostic);
            }
        }
        Some(processor)
    }
}

impl Default for ProcessorNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessorNetwork {
    fn drop(&mut self) {
        for id in self.graph.processor_ids() {
            if let Some(slot) = self.graph.slot_mut(id) {
                slot.deinitialize();
            }
        }
    }
}

impl fmt::Debug for ProcessorNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorNetwork")
            .field("processors", &self.graph.len())
            .field("connections", &self.graph.connections().len())
            .field("links", &self.links.len())
            .field("lock_count", &self.lock_count)
            .field("passes", &self.evaluator.pass_count())
            .finish()
    }
}
