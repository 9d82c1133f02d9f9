//! Ports - 抽象化レイヤー
//!
//! Queue と「消費側を起こす仕組み」の境界を trait で定義します。
//! 継承ではなく capability を持たせることで、同じ drain ロジックを
//! ポーリング専用キューとイベントループ連携キューの両方で使えます。

pub mod event_loop;
pub mod notifier;

pub use self::event_loop::{EventLoop, WakeCallback};
pub use self::notifier::{Notifier, WakeSource};
