//! The RMA runtime: global pointers, teams, collective segments and one-sided transfers.
//!
//! Every operation is a method of the [`Dart`] runtime object of the calling unit.

mod buddy;
mod collective;
mod error;
mod gptr;
mod group;
mod handle;
mod locality;
mod rma;
mod runtime;
mod seg_stack;
mod team;
mod translation;

pub use error::{DartError, DartErrorCode, DartResult};
pub use gptr::GlobalPtr;
pub use group::{ArchResult, BlockedArch, GlobalArch, Group, IdError, StridedArch, UnitArch};
pub use handle::Handle;
pub use locality::{TeamLocality, UnitLocality};
pub use runtime::{Dart, DartBuilder};
pub use team::{TeamId, TEAM_ALL};
pub use translation::LogicalSegId;
