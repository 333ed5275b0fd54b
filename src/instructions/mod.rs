//! Field kinds built on [`Instruction`](crate::Instruction).

mod child;
mod deferred;
mod pending;
mod reference;
mod tuple;

pub use child::child;
pub use deferred::deferred;
pub use pending::pending;
pub use reference::reference;
pub use tuple::tuple;
