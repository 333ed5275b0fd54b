use std::rc::Rc;

use crate::control::Control;
use crate::{Access, Accessor, Assign, Descriptor, Error, Instruction, Key, Model, Setter, Value};

/// Slot holding a child model built under the name `kind`.
///
/// Assigning a model of another kind, or anything other than a model or
/// null, fails with [`Error::TypeMismatch`]. The child held at the time is
/// destroyed together with its parent.
pub fn child(kind: &str, initial: Option<Model>) -> Instruction {
	let kind: Rc<str> = kind.into();

	Instruction::new(move |setup| {
		let key: Key = setup.key().into();
		let initial = initial.map(Value::Model);

		if let Some(value) = &initial {
			check(&kind, value).map_err(|found| Error::TypeMismatch {
				model: setup.model().name().into(),
				key: key.clone(),
				expected: kind.clone(),
				found,
			})?;
		}

		let set: Setter = Rc::new(move |value: &Value, access: &Access<'_>| {
			check(&kind, value)
				.map(|_| Assign::Default)
				.map_err(|found| Error::TypeMismatch {
					model: access.control().name().into(),
					key: access.key().into(),
					expected: kind.clone(),
					found,
				})
		});

		Ok(Descriptor::Accessor(Accessor {
			value: initial,
			set: Some(set),
			destroy: Some(Box::new(move |control: &Control| {
				if let Value::Model(child) = control.peek(&key) {
					child.destroy();
				}
			})),
			..Accessor::default()
		}))
	})
}

fn check(kind: &str, value: &Value) -> Result<(), Rc<str>> {
	match value {
		Value::Model(model) if model.name() == kind => Ok(()),
		Value::Null | Value::Undefined => Ok(()),
		other => Err(other.kind()),
	}
}
