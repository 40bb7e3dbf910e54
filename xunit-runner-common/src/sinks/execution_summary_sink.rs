use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

use xunit_sdk::messages::{ErrorMessage, TestAssemblyFinished};
use xunit_sdk::{ManualResetEvent, Message, MessageSink};

use super::ExecutionSink;
use crate::error::{Result, SinkError};
use crate::execution_summary::ExecutionSummary;

type CancelThunk = Box<dyn Fn() -> bool + Send + Sync>;
type CompletionCallback = Box<dyn Fn(&str, &ExecutionSummary) + Send + Sync>;

/// Forwards every message to an inner sink while building the
/// [`ExecutionSummary`] and counting errors.
///
/// The result of [`on_message`](MessageSink::on_message) is the inner sink's
/// result, AND-ed with the negation of the cancel predicate.
pub struct DelegatingExecutionSummarySink<S> {
    inner: S,
    cancel_thunk: CancelThunk,
    completion_callback: Option<CompletionCallback>,
    errors: AtomicUsize,
    summary: OnceCell<ExecutionSummary>,
    finished: ManualResetEvent,
    disposed: AtomicBool,
}

impl<S: MessageSink> DelegatingExecutionSummarySink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cancel_thunk: Box::new(|| false),
            completion_callback: None,
            errors: AtomicUsize::new(0),
            summary: OnceCell::new(),
            finished: ManualResetEvent::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Ask producers to stop whenever `cancel` returns true
    pub fn with_cancel_thunk(mut self, cancel: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel_thunk = Box::new(cancel);
        self
    }

    /// Called with the assembly's short name once it finishes
    pub fn with_completion_callback(
        mut self,
        callback: impl Fn(&str, &ExecutionSummary) + Send + Sync + 'static,
    ) -> Self {
        self.completion_callback = Some(Box::new(callback));
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    fn handle_assembly_finished(&self, finished: &TestAssemblyFinished) {
        let summary = ExecutionSummary::from_run(finished.summary, self.errors());
        if self.summary.set(summary).is_err() {
            warn!("Execution summary for {} was already recorded", finished.assembly_name);
        }

        let short_name = finished
            .assembly_path
            .as_deref()
            .and_then(|path| Path::new(path).file_stem())
            .and_then(|stem| stem.to_str())
            .unwrap_or(finished.assembly_name.as_str());
        debug!("{} finished: {:?}", short_name, summary);

        if let Some(callback) = &self.completion_callback {
            callback(short_name, &summary);
        }

        self.finished.set();
    }
}

impl<S: MessageSink> MessageSink for DelegatingExecutionSummarySink<S> {
    fn on_message(&self, message: &Message) -> bool {
        let result = self.inner.on_message(message);

        if message.kind().is_cleanup_failure() || message.is::<ErrorMessage>() {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        message.dispatch::<TestAssemblyFinished>(|args| self.handle_assembly_finished(args.message));

        result && !(self.cancel_thunk)()
    }
}

impl<S: MessageSink> ExecutionSink for DelegatingExecutionSummarySink<S> {
    fn execution_summary(&self) -> Option<ExecutionSummary> {
        self.summary.get().copied()
    }

    fn finished(&self) -> &ManualResetEvent {
        &self.finished
    }

    /// Release anyone waiting on [`finished`](ExecutionSink::finished).
    ///
    /// Messages arriving afterwards are still forwarded to the inner sink.
    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(SinkError::already_disposed("DelegatingExecutionSummarySink"));
        }
        self.finished.set();
        Ok(())
    }
}
