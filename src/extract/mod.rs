//! The extraction engine and its host-facing operations.
//!
//! A job is one [`ExtractionContext`] rooted at a store. [`extract`] walks the
//! store depth-first and writes the package; [`list`] walks it without
//! writing anything.

pub mod context;
pub mod element;
pub mod folder;
pub mod options;
pub mod progress;
pub mod registry;

pub use context::{ExtractionContext, UniqueIdSource};
pub use element::{ElementOutcome, MessageElement};
pub use folder::{FolderNode, FolderSummary};
pub use options::ExtractionOptions;
pub use progress::{CancelToken, NoProgress, ProgressEvent, ProgressSink};
pub use registry::{SchemeEntry, SchemeRegistry};

use tracing::{error, info};

use crate::error::ExtractionFailure;
use crate::model::stats::ExtractionStats;

/// Extract the whole store into the package at `ctx.root_path()`.
///
/// On failure the statistics gathered so far come back with the error.
pub fn extract(ctx: &mut ExtractionContext) -> Result<ExtractionStats, ExtractionFailure> {
    let result = ctx.run();
    let closed = ctx.close();
    match result.and_then(|stats| closed.map(|()| stats)) {
        Ok(stats) => {
            info!(
                folders = stats.folders,
                elements = stats.elements,
                attached = stats.attached_elements,
                "Extraction finished"
            );
            Ok(stats)
        }
        Err(error) => {
            error!(error = %error, "Extraction failed");
            Err(ExtractionFailure {
                stats: ctx.stats(),
                error,
            })
        }
    }
}

/// Folder summaries of the store, in pre-order.
///
/// With `with_stats`, every folder's messages are read to count them.
pub fn list(ctx: &mut ExtractionContext, with_stats: bool) -> Result<FolderListing, ExtractionFailure> {
    let fail = |ctx: &ExtractionContext, error| ExtractionFailure {
        stats: ctx.stats(),
        error,
    };
    let mut root = ctx.take_root().map_err(|e| fail(ctx, e))?;
    let mut summaries = Vec::new();
    FolderNode::list(ctx, root.as_mut(), "", 0, with_stats, &mut summaries)
        .map_err(|e| fail(ctx, e))?;
    Ok(FolderListing {
        inner: summaries.into_iter(),
    })
}

/// Single-pass sequence of folder summaries returned by [`list`].
#[derive(Debug)]
pub struct FolderListing {
    inner: std::vec::IntoIter<FolderSummary>,
}

impl Iterator for FolderListing {
    type Item = FolderSummary;

    fn next(&mut self) -> Option<FolderSummary> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for FolderListing {}
