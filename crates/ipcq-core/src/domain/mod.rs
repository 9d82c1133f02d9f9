//! Domain - Action レコードと ID

pub mod action;
pub mod ids;

pub use self::action::{Action, Argument, Callback, Runnable};
pub use self::ids::{ActionId, SourceId};
