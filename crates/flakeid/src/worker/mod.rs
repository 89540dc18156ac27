//! Worker-ID allocation.
//!
//! Every live generator in a fleet must encode a distinct worker ID. The
//! [`WorkerIdAllocator`] obtains one exactly once at startup, either straight
//! from configuration or by racing for a session-scoped slot in a
//! coordination service.

mod allocator;
mod coordinator;
#[cfg(feature = "etcd")]
mod etcd;
mod memory;
mod retry;

pub use allocator::*;
pub use coordinator::*;
#[cfg_attr(docsrs, doc(cfg(feature = "etcd")))]
#[cfg(feature = "etcd")]
pub use etcd::*;
pub use memory::*;
pub use retry::*;
