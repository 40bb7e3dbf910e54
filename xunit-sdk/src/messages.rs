//! Typed execution and discovery messages
//!
//! Every event flowing through a [`MessageBus`](crate::bus::MessageBus) is a
//! [`Message`]. Each variant wraps a dedicated struct which implements
//! [`MessageType`], so consumers can dispatch on the concrete type with
//! [`Message::dispatch`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use crate::fault::FailureInformation;
use crate::model::{SourceInformation, TestCase, Traits};
use crate::summary::RunSummary;

/// Outcome of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    /// The case was reported but never executed because the run was stopping
    NotRun,
}

/// A concrete message type which can be extracted from a [`Message`]
pub trait MessageType: Into<Message> {
    const KIND: MessageKind;

    fn from_message(message: &Message) -> Option<&Self>;
}

macro_rules! define_messages {
    ($($name:ident),* $(,)?) => {
        /// Any message published on the bus
        #[derive(Debug, Clone)]
        pub enum Message {
            $($name($name),)*
        }

        /// Discriminant of [`Message`], used for routing
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum MessageKind {
            $($name,)*
        }

        impl Message {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(Message::$name(_) => MessageKind::$name,)*
                }
            }
        }

        $(
            impl From<$name> for Message {
                fn from(message: $name) -> Self {
                    Message::$name(message)
                }
            }

            impl MessageType for $name {
                const KIND: MessageKind = MessageKind::$name;

                #[allow(unreachable_patterns)]
                fn from_message(message: &Message) -> Option<&Self> {
                    match message {
                        Message::$name(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

define_messages! {
    DiagnosticMessage,
    TestCaseDiscovered,
    DiscoveryComplete,
    TestAssemblyStarting,
    TestAssemblyFinished,
    TestCollectionStarting,
    TestCollectionFinished,
    TestClassStarting,
    TestClassFinished,
    TestMethodStarting,
    TestMethodFinished,
    TestCaseStarting,
    TestCaseFinished,
    TestPassed,
    TestFailed,
    TestSkipped,
    ErrorMessage,
    TestAssemblyCleanupFailure,
    TestCollectionCleanupFailure,
    TestClassCleanupFailure,
    TestMethodCleanupFailure,
    TestCaseCleanupFailure,
    TestCleanupFailure,
}

impl MessageKind {
    pub fn is_cleanup_failure(self) -> bool {
        matches!(
            self,
            MessageKind::TestAssemblyCleanupFailure
                | MessageKind::TestCollectionCleanupFailure
                | MessageKind::TestClassCleanupFailure
                | MessageKind::TestMethodCleanupFailure
                | MessageKind::TestCaseCleanupFailure
                | MessageKind::TestCleanupFailure
        )
    }
}

/// Arguments handed to a typed message handler
pub struct MessageHandlerArgs<'a, T> {
    pub message: &'a T,
    stopped: Cell<bool>,
}

impl<'a, T> MessageHandlerArgs<'a, T> {
    pub fn new(message: &'a T) -> Self {
        Self {
            message,
            stopped: Cell::new(false),
        }
    }

    /// Ask the producer to stop
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl Message {
    /// Invoke `handler` if this message is a `T`.
    ///
    /// Returns `false` only when the handler asked to stop.
    pub fn dispatch<T: MessageType>(&self, handler: impl FnOnce(&MessageHandlerArgs<'_, T>)) -> bool {
        match T::from_message(self) {
            Some(message) => {
                let args = MessageHandlerArgs::new(message);
                handler(&args);
                !args.is_stopped()
            }
            None => true,
        }
    }

    pub fn is<T: MessageType>(&self) -> bool {
        self.kind() == T::KIND
    }

    pub fn downcast<T: MessageType>(&self) -> Option<&T> {
        T::from_message(self)
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct TestCaseDiscovered {
    pub test_case: Arc<TestCase>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryComplete;

#[derive(Debug, Clone)]
pub struct TestAssemblyStarting {
    pub assembly_unique_id: String,
    pub assembly_name: String,
    pub assembly_path: Option<String>,
    pub config_file_path: Option<String>,
    pub start_time: DateTime<Utc>,
    pub test_environment: String,
    pub test_framework_display_name: String,
}

#[derive(Debug, Clone)]
pub struct TestAssemblyFinished {
    pub assembly_unique_id: String,
    pub assembly_name: String,
    pub assembly_path: Option<String>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct TestCollectionStarting {
    pub assembly_unique_id: String,
    pub test_collection_unique_id: String,
    pub test_collection_display_name: String,
}

#[derive(Debug, Clone)]
pub struct TestCollectionFinished {
    pub assembly_unique_id: String,
    pub test_collection_unique_id: String,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct TestClassStarting {
    pub test_collection_unique_id: String,
    pub test_class_unique_id: String,
    pub test_class: String,
}

#[derive(Debug, Clone)]
pub struct TestClassFinished {
    pub test_collection_unique_id: String,
    pub test_class_unique_id: String,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct TestMethodStarting {
    pub test_class_unique_id: String,
    pub test_method_unique_id: String,
    pub test_method: String,
}

#[derive(Debug, Clone)]
pub struct TestMethodFinished {
    pub test_class_unique_id: String,
    pub test_method_unique_id: String,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct TestCaseStarting {
    pub test_method_unique_id: String,
    pub test_case_unique_id: String,
    pub display_name: String,
    pub skip_reason: Option<String>,
    pub traits: Traits,
    pub source_information: Option<SourceInformation>,
}

#[derive(Debug, Clone)]
pub struct TestCaseFinished {
    pub test_method_unique_id: String,
    pub test_case_unique_id: String,
    pub outcome: TestOutcome,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct TestPassed {
    pub test_case_unique_id: String,
    pub execution_time: Duration,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct TestFailed {
    pub test_case_unique_id: String,
    pub execution_time: Duration,
    pub output: String,
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestSkipped {
    pub test_case_unique_id: String,
    pub reason: String,
}

/// A fault outside any single test, such as a coordination or bridge failure
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestAssemblyCleanupFailure {
    pub assembly_unique_id: String,
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestCollectionCleanupFailure {
    pub test_collection_unique_id: String,
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestClassCleanupFailure {
    pub test_class_unique_id: String,
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestMethodCleanupFailure {
    pub test_method_unique_id: String,
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestCaseCleanupFailure {
    pub test_case_unique_id: String,
    pub failure: FailureInformation,
}

#[derive(Debug, Clone)]
pub struct TestCleanupFailure {
    pub test_case_unique_id: String,
    pub failure: FailureInformation,
}
