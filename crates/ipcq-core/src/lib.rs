//! ipcq-core
//!
//! スレッド間 action キュー
//!
//! どのスレッドからでも action を push し、1 つの消費スレッド（通常はイベントループ）が
//! 順番に取り出して実行します。
//!
//! # モジュール構成
//! - **domain**: Action レコードと ID（ActionId, SourceId）
//! - **queue**: Queue（保存と drain）、SyncQueue（イベントループ連携）、QueueStats
//! - **ports**: Notifier / WakeSource / EventLoop trait
//! - **impls**: Polled, ThreadLoop, TokioLoop
//! - **config**: ループ設定
//! - **error**: QueueError, LoopError

pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;

pub use config::LoopConfig;
pub use domain::{Action, ActionId, Runnable};
pub use error::{LoopError, QueueError};
pub use impls::{Polled, ThreadLoop, TokioLoop};
pub use ports::{EventLoop, Notifier, WakeSource};
pub use queue::{ActionQueue, ActionSyncQueue, Queue, QueueStats, SyncQueue};
