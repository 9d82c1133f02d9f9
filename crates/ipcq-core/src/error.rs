use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue still had pending actions after waiting {0:?}")]
    WaitTimedOut(Duration),
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("failed to spawn event loop thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("event loop is stopped")]
    Stopped,

    #[error("event loop thread panicked")]
    ThreadPanicked,
}
