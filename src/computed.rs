//! Getter-defined fields.
//!
//! A computed field is evaluated on first read through a private
//! [`Subscriber`], which records every field the getter reads and then
//! commits to them. A change to any of those only marks the field stale and
//! queues it on its model; the model recomputes queued fields during its
//! flush, lowest priority first. A field's priority is one more than the
//! highest priority among the fields it read, so a dependency is always
//! current before anything that reads it is recomputed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};

use crate::control::Control;
use crate::instruction::{Access, Accessor, Descriptor, Getter, Instruction};
use crate::subscriber::{Handler, Subscriber};
use crate::{Callback, Error, Key, Value, WeakModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Uninitialized,
	Initializing,
	Settled,
	Stale,
	Recomputing,
}

type Compute = Box<dyn Fn(&Subscriber) -> Result<Value, Error>>;

/// Field whose value is `getter` applied to the model. The getter reads
/// through the given subscriber; whatever it reads becomes a dependency.
/// Assigning to the field fails with [`Error::ReadOnly`].
pub fn computed<F, R>(getter: F) -> Instruction
where
	F: Fn(&Subscriber) -> Result<R, Error> + 'static,
	R: Into<Value>,
{
	let compute: Compute = Box::new(move |this: &Subscriber| getter(this).map(Into::into));

	Instruction::new(move |setup| {
		let model = setup.model();
		let computed = Rc::new_cyclic(|this| Computed {
			key: setup.key().into(),
			owner: model.downgrade(),
			compute,
			phase: Cell::new(Phase::Uninitialized),
			priority: Cell::new(0),
			subscriber: RefCell::new(None),
			this: this.clone(),
		});

		model.register(setup.key(), computed.clone());

		let get: Getter = Rc::new({
			let computed = computed.clone();
			move |access: &Access<'_>| computed.get(access)
		});

		Ok(Descriptor::Accessor(Accessor {
			get: Some(get),
			read_only: true,
			destroy: Some(Box::new(move |_: &Control| computed.release())),
			..Accessor::default()
		}))
	})
}

pub(crate) struct Computed {
	key: Key,
	owner: WeakModel,
	compute: Compute,
	phase: Cell<Phase>,
	priority: Cell<u32>,
	subscriber: RefCell<Option<Subscriber>>,
	this: Weak<Computed>,
}

impl Computed {
	pub(crate) fn key(&self) -> &Key {
		&self.key
	}

	pub(crate) fn priority(&self) -> u32 {
		self.priority.get()
	}

	fn get(&self, access: &Access<'_>) -> Result<Value, Error> {
		let control = access.control();

		match self.phase.get() {
			Phase::Uninitialized => {
				if access.is_watch() {
					warn!(
						model = control.name(),
						key = %self.key,
						"computed field first evaluated by a watch, its dependencies were unknown when the watch was added"
					);
				}
				self.initialize(control)?;
			}
			Phase::Initializing => {
				return Err(Error::Cycle {
					model: control.name_rc(),
					key: self.key.clone(),
				})
			}
			_ => {}
		}

		Ok(control.peek(&self.key))
	}

	fn initialize(&self, control: &Control) -> Result<(), Error> {
		let model = control.model().ok_or_else(|| Error::Dropped {
			model: control.name_rc(),
		})?;

		self.phase.set(Phase::Initializing);
		let subscriber = Subscriber::new(&model, self.handler());

		match (self.compute)(&subscriber) {
			Ok(value) => {
				control.put(&self.key, value);
				self.priority.set(self.rank(control, &subscriber));
				subscriber.commit();
				*self.subscriber.borrow_mut() = Some(subscriber);
				self.phase.set(Phase::Settled);
				Ok(())
			}
			Err(error) => {
				subscriber.release();
				self.phase.set(Phase::Uninitialized);
				if !error.is_suspended() {
					warn!(model = control.name(), key = %self.key, initial = true, %error, "computed field failed");
				}
				Err(error)
			}
		}
	}

	/// Recompute a stale field during its model's flush. Failures keep the
	/// previous value.
	pub(crate) fn refresh(&self, control: &Control) {
		if self.phase.get() != Phase::Stale {
			return;
		}

		let subscriber = self.subscriber.borrow().clone();
		let Some(subscriber) = subscriber else {
			return;
		};

		self.phase.set(Phase::Recomputing);
		let result = (self.compute)(&subscriber);

		// Invalidated again while running, already queued.
		if self.phase.get() == Phase::Recomputing {
			self.phase.set(Phase::Settled);
		}

		match result {
			Ok(value) => {
				self.priority.set(self.rank(control, &subscriber));
				control.assign(&self.key, value);
			}
			Err(Error::Suspended(suspense)) => {
				debug!(model = control.name(), key = %self.key, waiting = suspense.key(), "computed field suspended");
			}
			Err(error) => {
				error!(model = control.name(), key = %self.key, initial = false, %error, "computed field failed");
			}
		}
	}

	fn rank(&self, control: &Control, subscriber: &Subscriber) -> u32 {
		subscriber
			.keys()
			.iter()
			.filter(|key| **key != self.key)
			.map(|key| control.priority(key))
			.max()
			.unwrap_or(0)
			+ 1
	}

	fn handler(&self) -> Handler {
		let this = self.this.clone();
		Rc::new(move |key: Option<&str>| -> Option<Callback> {
			if let Some(computed) = this.upgrade() {
				match key {
					Some(_) => computed.invalidate(),
					None => computed.release(),
				}
			}
			None
		})
	}

	fn invalidate(&self) {
		if !matches!(self.phase.get(), Phase::Settled | Phase::Recomputing) {
			return;
		}

		self.phase.set(Phase::Stale);

		if let (Some(owner), Some(this)) = (self.owner.upgrade(), self.this.upgrade()) {
			owner.enqueue(this);
		}
	}

	fn release(&self) {
		let subscriber = self.subscriber.borrow_mut().take();
		if let Some(subscriber) = subscriber {
			subscriber.release();
		}
	}
}
