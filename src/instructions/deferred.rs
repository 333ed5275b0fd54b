use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use tracing::{debug, error};

use crate::{microtask, Access, Accessor, Descriptor, Error, Getter, Instruction, Key, Model, Value};

/// Field filled in by an async factory.
///
/// The factory starts on first access and runs on the microtask pool. Until
/// it resolves, reads through a committed subscriber suspend. If it fails,
/// the field reads as that error from then on.
pub fn deferred<F, Fut, T>(factory: F) -> Instruction
where
	F: FnOnce(Model) -> Fut + 'static,
	Fut: Future<Output = Result<T, Error>> + 'static,
	T: Into<Value>,
{
	Instruction::new(move |setup| {
		let model = setup.model().clone();
		let key: Key = setup.key().into();
		let failed: Rc<RefCell<Option<Error>>> = Rc::default();

		let future = factory(model.clone());
		let owner = model.downgrade();

		microtask::spawn({
			let failed = failed.clone();
			async move {
				let result = future.await;
				let Some(model) = owner.upgrade() else {
					return;
				};

				match result {
					Ok(value) => {
						debug!(model = model.name(), key = %key, "deferred field resolved");
						if let Err(error) = model.set(&key, value) {
							error!(model = model.name(), key = %key, %error, "deferred field could not be assigned");
						}
					}
					Err(error) => {
						error!(model = model.name(), key = %key, %error, "deferred field failed");
						*failed.borrow_mut() = Some(error);
						model.update(&key);
					}
				}
			}
		});

		let get: Getter = Rc::new(move |access: &Access<'_>| {
			let failed = failed.borrow().clone();
			match failed {
				Some(error) => Err(error),
				None => Ok(access.current()),
			}
		});

		Ok(Descriptor::Accessor(Accessor {
			get: Some(get),
			suspend: true,
			..Accessor::default()
		}))
	})
}
