use std::cell::RefCell;
use std::rc::Rc;

use crate::control::Control;
use crate::{Access, Accessor, Assign, Descriptor, Instruction, Setter, Value};

type Cleanup = Box<dyn FnOnce()>;

/// Field bound to an external target, e.g. a view element.
///
/// `effect` runs with every new non-null value. The cleanup it returns runs
/// before the next value is applied and when the model is destroyed.
pub fn reference<F>(effect: F) -> Instruction
where
	F: Fn(&Value) -> Option<Cleanup> + 'static,
{
	Instruction::new(move |_| {
		let cleanup: Rc<RefCell<Option<Cleanup>>> = Rc::default();

		let set: Setter = Rc::new({
			let cleanup = cleanup.clone();
			move |value: &Value, access: &Access<'_>| {
				if access.current().is_same(value) {
					return Ok(Assign::Reject);
				}

				let previous = cleanup.borrow_mut().take();
				if let Some(previous) = previous {
					previous();
				}

				if !matches!(value, Value::Null | Value::Undefined) {
					let next = effect(value);
					*cleanup.borrow_mut() = next;
				}

				Ok(Assign::Default)
			}
		});

		Ok(Descriptor::Accessor(Accessor {
			set: Some(set),
			destroy: Some(Box::new(move |_: &Control| {
				let previous = cleanup.borrow_mut().take();
				if let Some(previous) = previous {
					previous();
				}
			})),
			..Accessor::default()
		}))
	})
}
