use crate::ports::Notifier;

/// 誰も起こさない Notifier
///
/// これを使うキューはポーリング専用で、`run_sync` は外側（タイマーやループの合間）から呼ぶ。
#[derive(Debug, Default, Clone, Copy)]
pub struct Polled;

impl Notifier for Polled {
    fn fire(&self) {}

    fn close(&self) {}
}
