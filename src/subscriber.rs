use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::control::{Control, Release};
use crate::instruction::Origin;
use crate::suspense::Status;
use crate::{Callback, Error, Key, Model, Value};

/// Reacts to a change of a watched key, or to `None` when the model is
/// destroyed. A returned callback runs once after the frame flushes.
pub type Handler = Rc<dyn Fn(Option<&str>) -> Option<Callback>>;

/// Start an observation session on `model`.
pub fn subscribe<F>(model: &Model, on_event: F) -> Subscriber
where
	F: Fn(Option<&str>) -> Option<Callback> + 'static,
{
	model.subscribe(on_event)
}

/// One observation session, e.g. one render of a view or one effect.
///
/// Reads through [`Subscriber::get`] record the key. Nothing is delivered
/// until [`Subscriber::commit`], after which every recorded key, and any
/// key read later, calls the handler on change. [`Subscriber::release`]
/// ends the session.
#[derive(Clone)]
pub struct Subscriber {
	body: Rc<SubscriberBody>,
}

struct SubscriberBody {
	control: Weak<Control>,
	name: Rc<str>,
	on_event: Handler,
	inner: RefCell<SubscriberInner>,
}

#[derive(Default)]
struct SubscriberInner {
	watch: Vec<(Key, Option<Handler>)>,
	active: bool,
	released: bool,
	listener: Option<Release>,
	dependant: Vec<(Key, Subscriber)>,
}

impl Subscriber {
	pub(crate) fn new(model: &Model, on_event: Handler) -> Self {
		Subscriber {
			body: Rc::new(SubscriberBody {
				control: model.weak_control(),
				name: model.name().into(),
				on_event,
				inner: RefCell::new(SubscriberInner::default()),
			}),
		}
	}

	pub fn model(&self) -> Option<Model> {
		self.body.control.upgrade().map(Model::from_control)
	}

	fn upgrade(&self) -> Result<Model, Error> {
		self.model().ok_or_else(|| Error::Dropped {
			model: self.body.name.clone(),
		})
	}

	/// Read `key` and record it as used by this session.
	///
	/// Once committed, reading a suspense-eligible field that has no value
	/// yet fails with [`Error::Suspended`].
	pub fn get(&self, key: &str) -> Result<Value, Error> {
		let model = self.upgrade()?;
		self.watch(key, None);
		model.read(key, Some(self), Origin::Proxy)
	}

	/// [`Subscriber::get`] as a tri-state.
	pub fn status(&self, key: &str) -> Status {
		self.get(key).into()
	}

	pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.upgrade()?.set(key, value)
	}

	/// Declare interest in `key` without reading it. With `refresh`, changes
	/// to `key` go to it instead of the session handler.
	pub fn add(&self, key: &str, refresh: Option<Handler>) {
		self.watch(key, refresh)
	}

	fn watch(&self, key: &str, refresh: Option<Handler>) {
		let mut inner = self.body.inner.borrow_mut();
		if inner.released {
			return;
		}

		match inner.watch.iter_mut().find(|(k, _)| &**k == key) {
			Some((_, handler)) => {
				if refresh.is_some() {
					*handler = refresh;
				}
			}
			None => inner.watch.push((key.into(), refresh)),
		}
	}

	/// Keys recorded so far.
	pub fn keys(&self) -> Vec<Key> {
		self.body
			.inner
			.borrow()
			.watch
			.iter()
			.map(|(k, _)| k.clone())
			.collect()
	}

	pub fn is_active(&self) -> bool {
		self.body.inner.borrow().active
	}

	/// Start delivering changes for every recorded key.
	pub fn commit(&self) {
		let dependant = {
			let mut inner = self.body.inner.borrow_mut();
			if inner.released || inner.active {
				return;
			}

			inner.active = true;
			inner
				.dependant
				.iter()
				.map(|(_, s)| s.clone())
				.collect::<Vec<_>>()
		};

		if let Some(control) = self.body.control.upgrade() {
			let body = Rc::downgrade(&self.body);
			let release = control.add_listener(move |key, _| {
				Ok(body.upgrade().and_then(|body| body.dispatch(key)))
			});

			self.body.inner.borrow_mut().listener = Some(release);
		}

		for subscriber in dependant {
			subscriber.commit();
		}
	}

	/// Stop listening, together with every dependant session.
	pub fn release(&self) {
		let (listener, dependant) = {
			let mut inner = self.body.inner.borrow_mut();
			if inner.released {
				return;
			}

			inner.released = true;
			inner.active = false;
			(inner.listener.take(), std::mem::take(&mut inner.dependant))
		};

		if let Some(listener) = listener {
			listener.release();
		}

		for (_, subscriber) in dependant {
			subscriber.release();
		}
	}

	/// Session over the child model stored in `key`, sharing this session's
	/// handler. It commits and releases with this one.
	pub fn child(&self, key: &str) -> Result<Subscriber, Error> {
		let child = match self.get(key)? {
			Value::Model(child) => child,
			other => {
				return Err(Error::TypeMismatch {
					model: self.body.name.clone(),
					key: key.into(),
					expected: "model".into(),
					found: other.kind(),
				})
			}
		};

		let existing = self
			.body
			.inner
			.borrow()
			.dependant
			.iter()
			.find(|(k, s)| &**k == key && s.model().map_or(false, |m| m.ptr_eq(&child)))
			.map(|(_, s)| s.clone());

		if let Some(existing) = existing {
			return Ok(existing);
		}

		let subscriber = Subscriber::new(&child, self.body.on_event.clone());
		let (replaced, active) = {
			let mut inner = self.body.inner.borrow_mut();
			if inner.released {
				return Ok(subscriber);
			}

			let index = inner.dependant.iter().position(|(k, _)| &**k == key);
			let replaced = index.map(|index| inner.dependant.remove(index).1);
			inner.dependant.push((key.into(), subscriber.clone()));
			(replaced, inner.active)
		};

		if let Some(replaced) = replaced {
			replaced.release();
		}

		if active {
			subscriber.commit();
		}

		Ok(subscriber)
	}
}

impl SubscriberBody {
	fn dispatch(&self, key: Option<&str>) -> Option<Callback> {
		let handler = {
			let inner = self.inner.borrow();
			if !inner.active {
				return None;
			}

			match key {
				None => Some(self.on_event.clone()),
				Some(key) => inner
					.watch
					.iter()
					.find(|(k, _)| &**k == key)
					.map(|(_, handler)| handler.clone().unwrap_or_else(|| self.on_event.clone())),
			}
		};

		handler.and_then(|handler| handler(key))
	}
}
