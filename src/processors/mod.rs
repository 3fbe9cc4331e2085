//! Built-in processors.
//!
//! Small, general-purpose nodes used by the demo binary, the benches and the
//! integration tests. All of them exchange `f64` values over [`SCALAR`] ports.
//!
//! User-editable settings are [`Property`](crate::network::Property) handles
//! shared between the processor and the host. Setting one invalidates the
//! processor through its network; no manual `invalidate()` is needed.

pub mod async_scale;
pub mod collector;
pub mod scale;
pub mod sum;
pub mod value_source;

pub use async_scale::AsyncScale;
pub use collector::{Collector, Recording};
pub use scale::Scale;
pub use sum::Sum;
pub use value_source::ValueSource;

use crate::network::DataType;

/// Scalar `f64` data.
pub const SCALAR: DataType = DataType::new("f64");
