//! # Nebula Surface Pool
//!
//! Bounded, recyclable pools of drawing surfaces whose backing storage is
//! created and destroyed by an external [`Allocator`].
//!
//! - [`SurfacePool`] tracks checked-out surfaces, supports deferred returns
//!   and keeps `idle + outstanding` under a configurable ceiling.
//! - [`SimpleSurfacePool`] is a plain bounded idle cache.
//! - [`PoolSet`] keeps one [`SurfacePool`] per [`SurfaceDescriptor`].
//!
//! Pools are owned by a single context. Work that completes elsewhere (an
//! expired [`IdleTimer`], a fired [`RecycleHook`]) is queued on the pool's
//! inbox and applied by `dispatch_pending` / `dispatch_next`.

pub mod allocator;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod pool;
pub mod recycle;
pub mod registry;
pub mod simple;
pub mod stats;
pub mod surface;
pub mod timer;

mod policy;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use allocator::{Allocator, FnAllocator};
pub use config::PoolConfig;
pub use descriptor::{SurfaceDescriptor, SurfaceFormat, SurfaceSize};
pub use error::{Error, Result};
pub use events::{EventBus, EvictionReason, PoolEvent};
pub use pool::SurfacePool;
pub use recycle::{Acknowledgement, RecycleHook, RecycleRejected, RejectReason};
pub use registry::PoolSet;
pub use simple::SimpleSurfacePool;
pub use stats::PoolStats;
pub use surface::{PooledSurface, SurfaceId, SurfaceState};
pub use timer::{IdleTimer, ShrinkTrigger, TokioIdleTimer};

#[cfg(feature = "metrics")]
pub use self::metrics::{MetricsCollector, spawn_metrics_collector};
