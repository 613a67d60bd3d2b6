//! Link engine for shortpath.
//!
//! This crate turns over-long paths into short aliases and takes them away
//! again:
//!
//! - [`generate`] derives a deterministic short name from a path
//! - [`LinkTypeSelector`] picks a junction, symbolic link or hard link
//! - [`LinkExecutor`] resolves name conflicts and creates the alias,
//!   recording every attempt in the [`OperationLog`](shortpath_store::OperationLog)
//! - [`RollbackEngine`] removes recorded aliases, newest first
//! - [`Pipeline`] drives a scan through the executor
//! - [`recover_interrupted`] settles operations a crashed run left in progress
//!
//! All file system mutations go through the [`LinkCreator`] trait, with a
//! native implementation, a dry-run implementation that only reads, and an
//! in-memory fake for tests.

mod conflict;
mod creator;
mod executor;
mod memory;
mod naming;
mod pipeline;
mod progress;
mod recovery;
mod rollback;
mod select;

pub use conflict::{Allocation, NameIndex};
pub use creator::{DryRunLinkCreator, FsLinkCreator, LinkCreator, RemoveOutcome};
pub use executor::{ExecuteOutcome, LinkExecutor};
pub use memory::{MemoryLink, MemoryLinkCreator};
pub use naming::{MAX_HASH_LENGTH, ShortName, generate, normalize};
pub use pipeline::{Pipeline, PipelineError};
pub use progress::{PipelineEvent, RunSummary};
pub use recovery::{INTERRUPTED, RecoverySummary, recover_interrupted};
pub use rollback::{RollbackEngine, RollbackFailure, RollbackSummary};
pub use select::LinkTypeSelector;

/// Default channel buffer size for pipeline events and scan hand-off.
pub const PIPELINE_CHANNEL_SIZE: usize = 100;
