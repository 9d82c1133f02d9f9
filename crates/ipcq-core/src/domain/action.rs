//! Action - producer スレッドからループスレッドへ渡す仕事の単位
//!
//! # 学習ポイント
//! - `Box<dyn Fn>` でコールバックを型消去して持つ
//! - 引数は `Arc<dyn Any>` で共有し、型付きで読むときは downcast
//! - move 専用なので、取り出した後に 2 つのスレッドが持つことはない

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::ids::ActionId;

/// [`Action`] が持つコールバック。自分自身のレコードを受け取る
pub type Callback = Box<dyn Fn(&Action) + Send + 'static>;

/// action に添える不透明な引数
///
/// レコードは共有ハンドルを持つだけで、中身の寿命は producer 側の責任です。
pub type Argument = Arc<dyn Any + Send + Sync>;

/// [`Queue`](crate::queue::Queue) に積んで実行できるもの
///
/// `run` はレコードを消費する
pub trait Runnable: Send + 'static {
    fn run(self);
}

/// 標準の action 型（コールバック + 引数 + 文字列 payload）
///
/// フィールドは private で、構築後は変更しない。
pub struct Action {
    id: ActionId,
    callback: Callback,
    argument: Option<Argument>,
    payload: String,
}

impl Action {
    /// 引数なし、空 payload で作成
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Action) + Send + 'static,
    {
        Self {
            id: ActionId::generate(),
            callback: Box::new(callback),
            argument: None,
            payload: String::new(),
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.argument = Some(argument);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn argument(&self) -> Option<&Argument> {
        self.argument.as_ref()
    }

    /// 引数を `T` として読む（無いか型が違えば `None`）
    pub fn argument_as<T: Any>(&self) -> Option<&T> {
        self.argument.as_deref().and_then(|arg| arg.downcast_ref::<T>())
    }
}

impl Runnable for Action {
    fn run(self) {
        (self.callback)(&self);
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("has_argument", &self.argument.is_some())
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn defaults_to_empty_payload_and_no_argument() {
        let action = Action::new(|_| {});
        assert_eq!(action.payload(), "");
        assert!(action.argument().is_none());
        assert!(action.id().to_string().starts_with("act-"));
    }

    #[test]
    fn run_passes_the_record_itself() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let action = Action::new(move |a| {
            sink.lock().unwrap().push((a.payload().to_string(), a.argument_as::<u32>().copied()));
        })
        .with_argument(Arc::new(7_u32))
        .with_payload("hello");

        action.run();

        assert_eq!(*seen.lock().unwrap(), vec![("hello".to_string(), Some(7))]);
    }

    #[test]
    fn argument_is_shared_not_taken() {
        let arg: Argument = Arc::new(String::from("owned by caller"));
        let action = Action::new(|_| {}).with_argument(Arc::clone(&arg));
        assert_eq!(Arc::strong_count(&arg), 2);

        action.run();
        assert_eq!(Arc::strong_count(&arg), 1);
        assert_eq!(arg.downcast_ref::<String>().unwrap(), "owned by caller");
    }

    #[test]
    fn argument_as_wrong_type_is_none() {
        let action = Action::new(|_| {}).with_argument(Arc::new(1_i64));
        assert!(action.argument_as::<u32>().is_none());
        assert_eq!(action.argument_as::<i64>(), Some(&1));
    }
}
