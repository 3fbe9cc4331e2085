//! Processor properties and the links between them.
//!
//! # Architecture
//!
//! ```text
//!   host thread                              network thread
//!   ───────────                              ──────────────
//!   Property::set(v) ──► PropertyQueue ──► apply_property_changes()
//!                       (crossbeam channel)      │
//!                                                ├─► invalidate owner at the
//!                                                │   property's level
//!                                                └─► follow links: copy the value
//!                                                    into each target, invalidate
//!                                                    its owner, continue from it
//! ```
//!
//! A property is bound to the network when its processor is added and
//! unbound when the processor is deinitialized. Unbound properties still
//! store values but notify nobody.

use super::id::ProcessorId;
use super::invalidation::InvalidationLevel;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

// ==================== Identity ====================

/// Handle of a processor's property, in the order `Processor::properties`
/// lists them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId {
    processor: ProcessorId,
    index: usize,
}

impl PropertyId {
    pub fn new(processor: ProcessorId, index: usize) -> Self {
        Self { processor, index }
    }

    #[inline]
    pub fn processor(self) -> ProcessorId {
        self.processor
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({}:{})", self.processor.0, self.index)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Directed link: changes of `source` are copied into `target`. A
/// bidirectional link is two links.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyLink {
    source: PropertyId,
    target: PropertyId,
}

impl PropertyLink {
    pub fn new(source: PropertyId, target: PropertyId) -> Self {
        Self { source, target }
    }

    pub fn source(&self) -> PropertyId {
        self.source
    }

    pub fn target(&self) -> PropertyId {
        self.target
    }

    pub fn involves(&self, processor: ProcessorId) -> bool {
        self.source.processor() == processor || self.target.processor() == processor
    }
}

impl fmt::Debug for PropertyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} => {:?}", self.source, self.target)
    }
}

impl fmt::Display for PropertyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ==================== Binding ====================

/// Where a bound property reports its changes.
#[derive(Debug, Clone)]
pub struct PropertyBinding {
    id: PropertyId,
    changes: Sender<PropertyId>,
}

impl PropertyBinding {
    pub(crate) fn new(id: PropertyId, changes: Sender<PropertyId>) -> Self {
        Self { id, changes }
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    fn notify(&self) {
        // The receiver lives in the engine context; once it is gone there
        // is nobody left to invalidate.
        let _ = self.changes.send(self.id);
    }
}

/// Changed properties on their way to the network thread.
pub struct PropertyQueue {
    tx: Sender<PropertyId>,
    rx: Receiver<PropertyId>,
}

impl PropertyQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<PropertyId> {
        self.tx.clone()
    }

    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> Vec<PropertyId> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for PropertyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PropertyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyQueue")
            .field("queued", &self.rx.len())
            .finish()
    }
}

// ==================== Type-erased access ====================

/// What the network needs from a property without knowing its value type.
pub trait AnyProperty: Send + Sync {
    fn name(&self) -> &str;

    /// Level the owner is invalidated with when the value changes.
    fn invalidation_level(&self) -> InvalidationLevel;

    fn value_type(&self) -> TypeId;

    fn value_type_name(&self) -> &'static str;

    /// Copy of the current value.
    fn snapshot(&self) -> Box<dyn Any + Send>;

    /// Stores `value` without notifying the network. `false` if the value
    /// has the wrong type or did not change.
    fn assign(&self, value: &dyn Any) -> bool;

    fn bind(&self, binding: PropertyBinding);

    fn unbind(&self);

    fn binding(&self) -> Option<PropertyId>;
}

/// Shared, type-erased property handle as listed by `Processor::properties`.
pub type PropertyRef = Arc<dyn AnyProperty>;

// ==================== Property ====================

struct PropertyCell<T> {
    name: String,
    level: InvalidationLevel,
    value: Mutex<T>,
    binding: Mutex<Option<PropertyBinding>>,
}

impl<T> PropertyCell<T> {
    fn notify(&self) {
        if let Some(binding) = self
            .binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            binding.notify();
        }
    }
}

impl<T> AnyProperty for PropertyCell<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidation_level(&self) -> InvalidationLevel {
        self.level
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn snapshot(&self) -> Box<dyn Any + Send> {
        Box::new(
            self.value
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }

    fn assign(&self, value: &dyn Any) -> bool {
        let Some(value) = value.downcast_ref::<T>() else {
            return false;
        };
        let mut current = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == *value {
            return false;
        }
        *current = value.clone();
        true
    }

    fn bind(&self, binding: PropertyBinding) {
        *self.binding.lock().unwrap_or_else(PoisonError::into_inner) = Some(binding);
    }

    fn unbind(&self) {
        *self.binding.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn binding(&self) -> Option<PropertyId> {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(PropertyBinding::id)
    }
}

/// A user-editable value owned by a processor.
///
/// Clones share the value. Setting a different value on a bound property
/// queues an invalidation of its owner, applied on the network thread by the
/// next `evaluate()`, unlock or `process_property_changes()`.
pub struct Property<T>(Arc<PropertyCell<T>>);

impl<T> Property<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Invalidates its owner with `InvalidOutput` when changed.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self::with_level(name, value, InvalidationLevel::InvalidOutput)
    }

    pub fn with_level(name: impl Into<String>, value: T, level: InvalidationLevel) -> Self {
        Self(Arc::new(PropertyCell {
            name: name.into(),
            level,
            value: Mutex::new(value),
            binding: Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.0.level
    }

    pub fn get(&self) -> T {
        self.0
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns whether the value changed. Only a change notifies the network.
    pub fn set(&self, value: T) -> bool {
        let changed = self.0.assign(&value);
        if changed {
            self.0.notify();
        }
        changed
    }

    /// Mutates the value in place; notifies like `set` if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    /// The network this property reports to, if any.
    pub fn binding(&self) -> Option<PropertyId> {
        self.0.binding()
    }

    pub fn handle(&self) -> PropertyRef {
        self.0.clone()
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Property");
        s.field("name", &self.0.name);
        match self.0.value.lock() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<poisoned>"),
        };
        s.finish()
    }
}
