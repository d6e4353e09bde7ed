//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PackError, Result};

/// Something that happened during an extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    FolderStarted {
        name: String,
        level: usize,
    },
    FolderFinished {
        name: String,
        level: usize,
        elements: u64,
        retained: bool,
    },
    ElementDone {
        subject: String,
        size: u64,
    },
    ContainerStarted {
        scheme: String,
        depth: usize,
    },
    ContainerFinished {
        scheme: String,
        depth: usize,
        elements: u64,
    },
}

/// Receives progress events. Presentation is up to the implementor.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Shared cancellation flag, checked at every folder, message and nested container.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PackError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(PackError::Cancelled)));
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |event: &ProgressEvent| seen.lock().unwrap().push(event.clone())
        };
        sink.on_event(&ProgressEvent::ElementDone {
            subject: "x".into(),
            size: 3,
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
