//! EventLoop port - wake source を発行するイベントループ
//!
//! グローバルなデフォルトループは持たず、ループは必ず引数で渡します。

use crate::error::LoopError;

use super::notifier::WakeSource;

/// Wake source が fire されたときにループのスレッドで実行されるコールバック
pub type WakeCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// EventLoop は自分のスレッドでコールバックを実行する wake source を作る
///
/// # 契約
/// - コールバックは常にループ自身のスレッドで実行される
/// - `close()` が戻った後、コールバックは二度と実行されない
///   （別スレッドで実行中の呼び出しは `close()` が完了を待つ）
pub trait EventLoop {
    type Source: WakeSource;

    fn wake_source(&self, callback: WakeCallback) -> Result<Self::Source, LoopError>;
}
