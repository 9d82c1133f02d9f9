//! Notifier port - キューから消費側への「起きて」シグナル
//!
//! Queue は push のたびに `fire()` を呼びます。
//! 何を起こすか（イベントループ、何もしない、テスト用カウンタ）は実装側の責務です。

/// Notifier は push 後に消費側を起こすための capability
///
/// # 契約
/// - `fire()` は任意のスレッドから呼べる
/// - `close()` 後の `fire()` は何もしない
/// - `close()` は冪等（何度呼んでもよい）
pub trait Notifier: Send + Sync {
    fn fire(&self);

    fn close(&self);
}

/// WakeSource は特定のイベントループに結び付いた Notifier
///
/// fire されると、登録時のコールバックがループ自身のスレッドで実行されます。
/// 連続した fire は 1 回の実行にまとめられることがあります。
pub trait WakeSource: Notifier {
    /// `close()` 済みか（以後コールバックは実行されない）
    fn is_closed(&self) -> bool;
}
