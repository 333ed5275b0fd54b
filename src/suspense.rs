use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

use crate::control::{Control, Release};
use crate::{Error, Key, Value};

/// Pending field value. Resolves the next time the field is assigned, or
/// when its model is destroyed.
#[derive(Clone)]
pub struct Suspense {
	model: Rc<str>,
	key: Key,
	resolved: Rc<Cell<bool>>,
	signal: Shared<oneshot::Receiver<()>>,
}

impl Suspense {
	pub(crate) fn new(control: &Control, key: &str) -> Self {
		let (tx, rx) = oneshot::channel();
		let suspense = Suspense {
			model: control.name_rc(),
			key: key.into(),
			resolved: Rc::default(),
			signal: rx.shared(),
		};

		if control.is_destroyed() {
			suspense.resolved.set(true);
			let _ = tx.send(());
			return suspense;
		}

		let sender = RefCell::new(Some(tx));
		let slot: Rc<RefCell<Option<Release>>> = Rc::default();
		let target = suspense.key.clone();
		let resolved = suspense.resolved.clone();

		let release = control.add_listener({
			let slot = slot.clone();
			move |changed, _| {
				if changed.map_or(true, |k| k == &*target) {
					resolved.set(true);
					if let Some(tx) = sender.borrow_mut().take() {
						let _ = tx.send(());
					}
					if let Some(release) = slot.borrow_mut().take() {
						release.release();
					}
				}
				Ok(None)
			}
		});

		*slot.borrow_mut() = Some(release);
		suspense
	}

	pub fn model(&self) -> &str {
		&self.model
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn is_resolved(&self) -> bool {
		self.resolved.get()
	}
}

impl Future for Suspense {
	type Output = ();

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.signal.poll_unpin(cx).map(|_| ())
	}
}

/// Two suspenses are equal when they wait on the same assignment.
impl PartialEq for Suspense {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.resolved, &other.resolved)
	}
}

impl Debug for Suspense {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Suspense")
			.field("model", &self.model)
			.field("key", &self.key)
			.field("resolved", &self.is_resolved())
			.finish()
	}
}

/// Outcome of reading a field that may not be ready.
#[derive(Debug, Clone)]
pub enum Status {
	Ready(Value),
	Pending(Suspense),
	Failed(Error),
}

impl Status {
	pub fn is_ready(&self) -> bool {
		matches!(self, Status::Ready(_))
	}

	pub fn ready(self) -> Option<Value> {
		match self {
			Status::Ready(value) => Some(value),
			_ => None,
		}
	}

	pub fn into_result(self) -> Result<Value, Error> {
		match self {
			Status::Ready(value) => Ok(value),
			Status::Pending(suspense) => Err(Error::Suspended(suspense)),
			Status::Failed(error) => Err(error),
		}
	}
}

impl From<Result<Value, Error>> for Status {
	fn from(result: Result<Value, Error>) -> Self {
		match result {
			Ok(value) => Status::Ready(value),
			Err(Error::Suspended(suspense)) => Status::Pending(suspense),
			Err(error) => Status::Failed(error),
		}
	}
}
