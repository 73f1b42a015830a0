//! Host CPU description: ISA features, microarchitecture, caches, and
//! package/core/thread topology, detected once and published as a
//! read-only process-wide snapshot.
//!
//! Detection consumes three platform primitives (CPUID-style register
//! queries, kernel per-processor text records, sysctl-style
//! configuration queries), each behind a trait in [`raw`] so the
//! pipeline can run against the host or against recorded data.
//!
//! # Examples
//!
//! ```no_run
//! coreinfo::initialize()?;
//! let info = coreinfo::snapshot().expect("initialized above");
//! println!("{} logical processors on {} packages",
//!     info.processors.len(), info.packages.len());
//! if let Some(isa) = info.x86_isa() {
//!     println!("avx2: {}", isa.avx2);
//! }
//! # Ok::<(), coreinfo::CoreInfoError>(())
//! ```
//!
//! Detection never panics on odd hardware reports: anomalies resolve
//! to conservative values and are reported through the [`log`] crate.
//! Only a structurally inconsistent topology fails [`initialize`].

pub mod cache;
pub mod error;
pub mod isa;
pub mod raw;
pub mod snapshot;
pub mod topology;
pub mod uarch;

pub use cache::Cache;
pub use error::{CoreInfoError, Result};
pub use isa::{ArmIsaFeatures, X86IsaFeatures};
pub use snapshot::{
    cores, deinitialize, initialize, initialize_with, is_initialized, isa_features, l1d_caches,
    l1i_caches, l2_caches, l3_caches, l4_caches, packages, processors, snapshot, IsaFeatures,
    Snapshot,
};
pub use topology::{Core, Package, Processor};
pub use uarch::{Uarch, Vendor};
