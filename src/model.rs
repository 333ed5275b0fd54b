use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::control::Control;
use crate::instruction::Instruction;
use crate::subscriber::{Handler, Subscriber};
use crate::{Callback, Key, Value};

/// Plain copy of a model's fields.
pub type Snapshot = BTreeMap<Key, Value>;

pub(crate) enum Init {
	Value(Value),
	Instruction(Instruction),
}

/// Shared handle to a tracked model. Clones point at the same model.
#[derive(Clone)]
pub struct Model {
	control: Rc<Control>,
}

impl Model {
	pub fn builder(name: &str) -> ModelBuilder {
		ModelBuilder {
			name: name.into(),
			fields: Vec::new(),
		}
	}

	pub(crate) fn from_control(control: Rc<Control>) -> Self {
		Model { control }
	}

	pub(crate) fn weak_control(&self) -> Weak<Control> {
		Rc::downgrade(&self.control)
	}

	pub fn control(&self) -> &Control {
		&self.control
	}

	pub fn ptr_eq(&self, other: &Model) -> bool {
		Rc::ptr_eq(&self.control, &other.control)
	}

	pub fn downgrade(&self) -> WeakModel {
		WeakModel {
			control: Rc::downgrade(&self.control),
		}
	}

	/// Start an observation session. See [`Subscriber`].
	pub fn subscribe<F>(&self, on_event: F) -> Subscriber
	where
		F: Fn(Option<&str>) -> Option<Callback> + 'static,
	{
		Subscriber::new(self, Rc::new(on_event) as Handler)
	}
}

impl Deref for Model {
	type Target = Control;

	fn deref(&self) -> &Self::Target {
		&self.control
	}
}

impl PartialEq for Model {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl Eq for Model {}

impl Debug for Model {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.control.name())
	}
}

#[derive(Clone)]
pub struct WeakModel {
	control: Weak<Control>,
}

impl WeakModel {
	pub fn upgrade(&self) -> Option<Model> {
		self.control.upgrade().map(Model::from_control)
	}
}

/// Declares the fields of a model. A key declared twice keeps the later
/// declaration.
pub struct ModelBuilder {
	name: Rc<str>,
	fields: Vec<(Key, Init)>,
}

impl ModelBuilder {
	/// Plain field with an initial value.
	pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.fields.push((key.into(), Init::Value(value.into())));
		self
	}

	/// Field set up by `instruction` the first time it is touched.
	pub fn field(mut self, key: &str, instruction: Instruction) -> Self {
		self.fields.push((key.into(), Init::Instruction(instruction)));
		self
	}

	pub fn build(self) -> Model {
		let ModelBuilder { name, fields } = self;
		Model {
			control: Rc::new_cyclic(|this| Control::new(name, this.clone(), fields)),
		}
	}
}
