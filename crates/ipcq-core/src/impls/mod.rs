//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **Polled**: 何も起こさない Notifier（外部から `run_sync` を呼ぶ前提）
//! - **ThreadLoop**: 専用 OS スレッドを park/unpark で駆動するイベントループ
//! - **TokioLoop**: current-thread tokio ランタイムで駆動するイベントループ

pub mod polled;
pub mod thread_loop;
pub mod tokio_loop;
mod wake_slot;

pub use self::polled::Polled;
pub use self::thread_loop::{ThreadLoop, ThreadWakeSource};
pub use self::tokio_loop::{TokioLoop, TokioWakeSource};
