use std::rc::Rc;

use crate::{Access, Accessor, Assign, Descriptor, Error, Instruction, Setter, Value};

/// Array field that only updates when an element actually changes.
///
/// Plain array fields notify on every assignment. Here an assigned array
/// with the same elements as the current one is dropped.
pub fn tuple<T: Into<Value>>(values: Vec<T>) -> Instruction {
	let initial = Value::from(values);

	Instruction::new(move |_| {
		let set: Setter = Rc::new(|value: &Value, access: &Access<'_>| {
			let current = access.current();
			match (current.as_array(), value.as_array()) {
				(Some(current), Some(next)) if same_elements(current, next) => Ok(Assign::Reject),
				(_, Some(_)) => Ok(Assign::Default),
				_ => Err(Error::TypeMismatch {
					model: access.control().name().into(),
					key: access.key().into(),
					expected: "array".into(),
					found: value.kind(),
				}),
			}
		});

		Ok(Descriptor::Accessor(Accessor {
			value: Some(initial),
			set: Some(set),
			..Accessor::default()
		}))
	})
}

fn same_elements(current: &[Value], next: &[Value]) -> bool {
	current.len() == next.len() && current.iter().zip(next).all(|(a, b)| a.is_same(b))
}
