//! dash is a Partitioned Global Address Space runtime for SPMD programs, together with
//! distributed containers whose elements are placed by declarative distribution patterns.
//!
//! The crate has three layers:
//!
//! * [`dart`]: the RMA runtime. Global pointers, teams, collective segments, non-blocking
//!   one-sided get/put with handle-based local completion, barriers.
//! * [`pattern`] and [`view`]: pure index arithmetic mapping an N-dimensional global index
//!   space to `(unit, local offset)` pairs, and lazy views (sub-ranges, local parts, blocks)
//!   over those index spaces.
//! * [`array`]: containers binding a pattern to a collective allocation.
//!
//! Units are provided by a [`transport`]. The bundled local fabric runs every unit as a
//! thread of the calling process:
//!
//! ```
//! use dash::{Array, Distribution, TEAM_ALL};
//!
//! let sums = dash::transport::local::launch(4, Default::default(), |dart| {
//!     let array = Array::<u64>::new(dart.clone(), TEAM_ALL, 40, Distribution::Blocked).unwrap();
//!     for g in array.local_indices() {
//!         array.put(g, g as u64).unwrap();
//!     }
//!     array.barrier().unwrap();
//!     (0..40).map(|g| array.get(g).unwrap()).sum::<u64>()
//! });
//! assert!(sums.iter().all(|s| *s == 780));
//! ```
//!
//! Configuration is read from `DART_` prefixed environment variables, see [`Config`].

extern crate self as dash;

pub mod array;
pub mod dart;
mod env_var;
pub mod pattern;
pub mod transport;
pub mod view;

pub use crate::array::{Array, Dist, ElementHandle, GlobRef, Matrix, UnorderedMap};
pub use crate::dart::{
    Dart, DartBuilder, DartError, DartErrorCode, DartResult, GlobalPtr, Group, Handle, TeamId,
    TEAM_ALL,
};
pub use crate::env_var::{config, Config};
pub use crate::pattern::{
    BlockPattern, CsrPattern, DistSpec, Distribution, LoadBalancePattern, Pattern,
    ShiftTilePattern, SizeSpec, TeamSpec, TilePattern, ViewSpec,
};
pub use crate::transport::Backend;
pub use crate::view::{IndexSet, IndexView};

pub use dash_impl::Dist;

#[doc(hidden)]
pub fn serialize<T: ?Sized>(obj: &T) -> Result<Vec<u8>, anyhow::Error>
where
    T: serde::Serialize,
{
    Ok(bincode::serialize(obj)?)
}

#[doc(hidden)]
pub fn deserialize<'a, T>(bytes: &'a [u8]) -> Result<T, anyhow::Error>
where
    T: serde::Deserialize<'a>,
{
    Ok(bincode::deserialize(bytes)?)
}
