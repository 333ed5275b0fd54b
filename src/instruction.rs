//! One-shot field initializers.
//!
//! A field declared with an [`Instruction`] has no behavior until it is
//! first touched. At that point the instruction runs once for this model
//! and returns a [`Descriptor`], which is installed into the model's
//! accessor table. Every custom field kind in [`crate::instructions`] and
//! [`crate::computed`] goes through this hook.

use std::rc::Rc;

use crate::control::Control;
use crate::subscriber::Subscriber;
use crate::{Error, Model, Value};

pub type Getter = Rc<dyn Fn(&Access<'_>) -> Result<Value, Error>>;
pub type Setter = Rc<dyn Fn(&Value, &Access<'_>) -> Result<Assign, Error>>;
pub type Destroy = Box<dyn FnOnce(&Control)>;

/// What a custom setter wants done with an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assign {
	/// Store the value if it differs from the current one.
	Default,
	/// Drop the assignment.
	Reject,
	/// Store and notify even if the value is the same.
	Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
	Direct,
	Proxy,
	Watch,
}

/// Context handed to custom getters and setters.
pub struct Access<'a> {
	control: &'a Control,
	key: &'a str,
	subscriber: Option<&'a Subscriber>,
	origin: Origin,
}

impl<'a> Access<'a> {
	pub(crate) fn new(
		control: &'a Control,
		key: &'a str,
		subscriber: Option<&'a Subscriber>,
		origin: Origin,
	) -> Self {
		Access {
			control,
			key,
			subscriber,
			origin,
		}
	}

	pub fn control(&self) -> &'a Control {
		self.control
	}

	pub fn key(&self) -> &'a str {
		self.key
	}

	/// The subscriber this read goes through, if any.
	pub fn subscriber(&self) -> Option<&'a Subscriber> {
		self.subscriber
	}

	/// Whether this read comes from registering a watch on the key rather
	/// than from using its value.
	pub fn is_watch(&self) -> bool {
		self.origin == Origin::Watch
	}

	/// Raw stored value of the field.
	pub fn current(&self) -> Value {
		self.control.peek(self.key)
	}
}

#[derive(Default)]
pub struct Accessor {
	pub value: Option<Value>,
	pub get: Option<Getter>,
	pub set: Option<Setter>,
	/// Reads through an active subscriber suspend while the value is
	/// undefined.
	pub suspend: bool,
	/// Assignments fail with [`Error::ReadOnly`] and imports skip the field.
	pub read_only: bool,
	pub destroy: Option<Destroy>,
}

pub enum Descriptor {
	/// Plain field with an initial value.
	Value(Value),
	/// Field served entirely by a getter.
	Getter(Getter),
	Accessor(Accessor),
	/// Plain field with no value yet.
	Skip,
}

pub struct Setup<'a> {
	model: &'a Model,
	key: &'a str,
}

impl<'a> Setup<'a> {
	pub fn model(&self) -> &'a Model {
		self.model
	}

	pub fn key(&self) -> &'a str {
		self.key
	}
}

pub struct Instruction {
	setup: Box<dyn FnOnce(&Setup<'_>) -> Result<Descriptor, Error>>,
}

impl Instruction {
	pub fn new<F>(setup: F) -> Self
	where
		F: FnOnce(&Setup<'_>) -> Result<Descriptor, Error> + 'static,
	{
		Instruction {
			setup: Box::new(setup),
		}
	}

	pub(crate) fn run(self, model: &Model, key: &str) -> Result<Descriptor, Error> {
		(self.setup)(&Setup { model, key })
	}
}

/// Installed accessor for one field.
#[derive(Clone, Default)]
pub(crate) struct Field {
	pub get: Option<Getter>,
	pub set: Option<Setter>,
	pub suspend: bool,
	pub read_only: bool,
}
