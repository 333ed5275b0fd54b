//! Field-level change tracking for plain models.
//!
//! A [`Model`] owns a table of named fields. Reads made through a
//! [`Subscriber`] are recorded, writes mark keys dirty, and all writes made
//! in the same turn are settled by a single flush that recomputes
//! [`computed`] fields in dependency order and then notifies listeners once.
//!
//! Flushes run on the thread-local [`microtask`] queue, so nothing is
//! delivered until the queue is drained with [`microtask::flush`] or a
//! future is driven with [`microtask::run_until`].

pub mod macros;

mod addr;
mod computed;
mod control;
mod error;
mod event;
mod instruction;
pub mod instructions;
pub mod microtask;
mod model;
mod subscriber;
mod suspense;
mod value;

use std::rc::Rc;

pub use computed::computed;
pub use control::{Callback, Control, Notify, Release};
pub use error::Error;
pub use event::{Expect, Update};
pub use instruction::{Access, Accessor, Assign, Descriptor, Getter, Instruction, Setter, Setup};
pub use model::{Model, ModelBuilder, Snapshot, WeakModel};
pub use subscriber::{subscribe, Handler, Subscriber};
pub use suspense::{Status, Suspense};
pub use value::Value;

/// Name of a tracked field.
pub type Key = Rc<str>;
