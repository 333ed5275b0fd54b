use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::addr::RcAddr;
use crate::computed::Computed;
use crate::instruction::{Access, Assign, Descriptor, Destroy, Field, Instruction, Origin};
use crate::model::Init;
use crate::subscriber::Subscriber;
use crate::suspense::Suspense;
use crate::{microtask, Error, Key, Model, Snapshot, Value};

/// Runs once per flush with every key changed in that frame.
pub type Callback = Rc<dyn Fn(&[Key])>;

/// What a listener returns for a change: optionally a callback to run
/// after the frame flushes. Errors are logged and do not stop other
/// listeners.
pub type Notify = Result<Option<Callback>, Error>;

pub(crate) type Follower = Rc<dyn Fn(Option<&str>, &Control) -> Notify>;

/// Unregisters a listener or subscription. Calling it again does nothing.
#[derive(Clone)]
pub struct Release {
	func: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl Release {
	pub(crate) fn new(func: impl FnOnce() + 'static) -> Self {
		Release {
			func: Rc::new(RefCell::new(Some(Box::new(func)))),
		}
	}

	pub fn release(&self) {
		let func = self.func.borrow_mut().take();
		if let Some(func) = func {
			func()
		}
	}

	pub fn is_released(&self) -> bool {
		self.func.borrow().is_none()
	}
}

/// Per-model engine: field storage, the accessor table, dirty tracking
/// and listener dispatch.
pub struct Control {
	name: Rc<str>,
	inner: RefCell<ControlInner>,
	this: Weak<Control>,
}

#[derive(Default)]
struct ControlInner {
	keys: Vec<Key>,
	state: FxHashMap<Key, Value>,
	fields: FxHashMap<Key, Field>,
	pending: FxHashMap<Key, Instruction>,
	computed: FxHashMap<Key, Rc<Computed>>,
	queue: BTreeMap<(u32, Key), Rc<Computed>>,
	frame: Vec<Key>,
	followers: Vec<(u64, Follower)>,
	waiting: Vec<RcAddr<dyn Fn(&[Key])>>,
	suspended: FxHashMap<Key, Suspense>,
	destroy: Vec<Destroy>,
	next: u64,
	scheduled: bool,
	destroyed: bool,
}

impl Control {
	pub(crate) fn new(name: Rc<str>, this: Weak<Control>, fields: Vec<(Key, Init)>) -> Self {
		let mut inner = ControlInner::default();

		for (key, init) in fields {
			inner.pending.remove(&key);
			inner.state.remove(&key);
			inner.fields.remove(&key);

			if !inner.keys.contains(&key) {
				inner.keys.push(key.clone());
			}

			match init {
				Init::Value(value) => {
					inner.state.insert(key.clone(), value);
					inner.fields.insert(key, Field::default());
				}
				Init::Instruction(instruction) => {
					inner.pending.insert(key, instruction);
				}
			}
		}

		Control {
			name,
			inner: RefCell::new(inner),
			this,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn name_rc(&self) -> Rc<str> {
		self.name.clone()
	}

	pub fn model(&self) -> Option<Model> {
		self.this.upgrade().map(Model::from_control)
	}

	/// Declared keys, in declaration order.
	pub fn keys(&self) -> Vec<Key> {
		self.inner.borrow().keys.clone()
	}

	pub fn declares(&self, key: &str) -> bool {
		self.inner.borrow().keys.iter().any(|k| &**k == key)
	}

	pub fn is_destroyed(&self) -> bool {
		self.inner.borrow().destroyed
	}

	/// Whether any key changed since the last flush.
	pub fn is_pending(&self) -> bool {
		!self.inner.borrow().frame.is_empty()
	}

	/// Keys changed since the last flush.
	pub fn frame(&self) -> Vec<Key> {
		self.inner.borrow().frame.clone()
	}

	/// Read a field without tracking it. Suspense-eligible fields read as
	/// `Undefined` here instead of suspending.
	pub fn get(&self, key: &str) -> Result<Value, Error> {
		self.read(key, None, Origin::Direct)
	}

	/// Assign a field through its setter. Fails on a destroyed model.
	pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.write(key, value.into())
	}

	pub(crate) fn peek(&self, key: &str) -> Value {
		self.inner
			.borrow()
			.state
			.get(key)
			.cloned()
			.unwrap_or_default()
	}

	pub(crate) fn read(
		&self,
		key: &str,
		subscriber: Option<&Subscriber>,
		origin: Origin,
	) -> Result<Value, Error> {
		self.init(key)?;

		let field = self.field(key)?;
		let value = match &field.get {
			Some(get) => get(&Access::new(self, key, subscriber, origin))?,
			None => self.peek(key),
		};

		if field.suspend && value.is_undefined() && subscriber.map_or(false, |s| s.is_active()) {
			return Err(Error::Suspended(self.suspense(key)));
		}

		Ok(value)
	}

	/// One suspense per key until it resolves, so repeated reads share a
	/// single listener.
	fn suspense(&self, key: &str) -> Suspense {
		let cached = self.inner.borrow().suspended.get(key).cloned();
		if let Some(suspense) = cached.filter(|s| !s.is_resolved()) {
			return suspense;
		}

		let suspense = Suspense::new(self, key);
		let mut inner = self.inner.borrow_mut();
		if suspense.is_resolved() {
			inner.suspended.remove(key);
		} else {
			inner.suspended.insert(key.into(), suspense.clone());
		}
		suspense
	}

	pub(crate) fn write(&self, key: &str, value: Value) -> Result<(), Error> {
		if self.is_destroyed() {
			return Err(Error::Destroyed {
				model: self.name.clone(),
				key: key.into(),
			});
		}

		self.init(key)?;

		let field = self.field(key)?;
		if field.read_only {
			return Err(Error::ReadOnly {
				model: self.name.clone(),
				key: key.into(),
			});
		}

		let assign = match &field.set {
			Some(set) => set(&value, &Access::new(self, key, None, Origin::Direct))?,
			None => Assign::Default,
		};

		match assign {
			Assign::Reject => {}
			Assign::Force => {
				self.put(key, value);
				self.update(key);
			}
			Assign::Default => {
				self.assign(key, value);
			}
		}

		Ok(())
	}

	/// Store `value` and mark `key` dirty unless it is the same as the
	/// current value. Returns whether anything changed.
	pub(crate) fn assign(&self, key: &str, value: Value) -> bool {
		let changed = {
			let mut inner = self.inner.borrow_mut();
			match inner.state.get_mut(key) {
				Some(current) if current.is_same(&value) => false,
				Some(current) => {
					*current = value;
					true
				}
				None => {
					inner.state.insert(key.into(), value);
					true
				}
			}
		};

		if changed {
			self.update(key);
		}

		changed
	}

	/// Store without notifying anyone.
	pub(crate) fn put(&self, key: &str, value: Value) {
		let mut inner = self.inner.borrow_mut();
		match inner.state.get_mut(key) {
			Some(current) => *current = value,
			None => {
				inner.state.insert(key.into(), value);
			}
		}
	}

	fn field(&self, key: &str) -> Result<Field, Error> {
		self.inner
			.borrow()
			.fields
			.get(key)
			.cloned()
			.ok_or_else(|| Error::Unknown {
				model: self.name.clone(),
				key: key.into(),
			})
	}

	/// Run the pending instruction for `key`, if any, and install what it
	/// describes.
	fn init(&self, key: &str) -> Result<(), Error> {
		let instruction = self.inner.borrow_mut().pending.remove(key);
		let Some(instruction) = instruction else {
			return Ok(());
		};

		let model = self.model().ok_or_else(|| Error::Dropped {
			model: self.name.clone(),
		})?;

		let descriptor = instruction.run(&model, key);
		let key: Key = key.into();
		let mut inner = self.inner.borrow_mut();

		let field = match descriptor {
			Err(error) => {
				inner.fields.insert(key, Field::default());
				return Err(error);
			}
			Ok(Descriptor::Value(value)) => {
				inner.state.insert(key.clone(), value);
				Field::default()
			}
			Ok(Descriptor::Getter(get)) => Field {
				get: Some(get),
				..Field::default()
			},
			Ok(Descriptor::Accessor(accessor)) => {
				if let Some(value) = accessor.value {
					inner.state.insert(key.clone(), value);
				}
				if let Some(destroy) = accessor.destroy {
					inner.destroy.push(destroy);
				}
				Field {
					get: accessor.get,
					set: accessor.set,
					suspend: accessor.suspend,
					read_only: accessor.read_only,
				}
			}
			Ok(Descriptor::Skip) => Field::default(),
		};

		inner.fields.insert(key, field);
		Ok(())
	}

	/// Mark `key` as changed in the current frame, schedule a flush if
	/// none is scheduled and tell every listener right away.
	pub fn update(&self, key: &str) {
		let (followers, schedule) = {
			let mut inner = self.inner.borrow_mut();
			if inner.destroyed {
				return;
			}

			if !inner.frame.iter().any(|k| &**k == key) {
				inner.frame.push(key.into());
			}

			let schedule = !std::mem::replace(&mut inner.scheduled, true);
			(inner.followers.clone(), schedule)
		};

		trace!(model = %self.name, key, "update");

		if schedule {
			self.schedule();
		}

		for (id, follower) in followers {
			// Listeners removed by an earlier listener are skipped.
			if !self.inner.borrow().followers.iter().any(|(i, _)| *i == id) {
				continue;
			}

			match follower(Some(key), self) {
				Ok(Some(callback)) => self.defer(callback),
				Ok(None) => {}
				Err(error) => error!(model = %self.name, key, %error, "listener failed"),
			}
		}
	}

	/// Register a raw listener. It sees every key as it changes, and `None`
	/// once when the model is destroyed.
	pub fn add_listener<F>(&self, listener: F) -> Release
	where
		F: Fn(Option<&str>, &Control) -> Notify + 'static,
	{
		let id = {
			let mut inner = self.inner.borrow_mut();
			let id = inner.next;
			inner.next += 1;
			inner.followers.push((id, Rc::new(listener)));
			id
		};

		let this = self.this.clone();
		Release::new(move || {
			if let Some(control) = this.upgrade() {
				control
					.inner
					.borrow_mut()
					.followers
					.retain(|(i, _)| *i != id);
			}
		})
	}

	/// Queue `callback` for the end of the current frame. The same callback
	/// is queued at most once per frame.
	pub(crate) fn defer(&self, callback: Callback) {
		let callback = RcAddr::new(callback);
		let mut inner = self.inner.borrow_mut();
		if !inner.waiting.contains(&callback) {
			inner.waiting.push(callback);
		}
	}

	fn schedule(&self) {
		let this = self.this.clone();
		microtask::queue(move || {
			if let Some(control) = this.upgrade() {
				control.flush();
			}
		});
	}

	pub(crate) fn request_flush(&self) {
		let schedule = !std::mem::replace(&mut self.inner.borrow_mut().scheduled, true);
		if schedule {
			self.schedule();
		}
	}

	pub(crate) fn register(&self, key: &str, computed: Rc<Computed>) {
		self.inner.borrow_mut().computed.insert(key.into(), computed);
	}

	/// Priority of the computed field behind `key`, `0` for plain fields.
	pub(crate) fn priority(&self, key: &str) -> u32 {
		self.inner
			.borrow()
			.computed
			.get(key)
			.map_or(0, |computed| computed.priority())
	}

	pub(crate) fn enqueue(&self, computed: Rc<Computed>) {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.destroyed {
				return;
			}
			inner
				.queue
				.insert((computed.priority(), computed.key().clone()), computed);
		}

		self.request_flush();
	}

	/// Settle computed fields in priority order, close the frame and run
	/// every callback queued for it.
	pub(crate) fn flush(&self) {
		loop {
			let next = self.inner.borrow_mut().queue.pop_first();
			match next {
				Some((_, computed)) => computed.refresh(self),
				None => break,
			}
		}

		let (keys, waiting) = {
			let mut inner = self.inner.borrow_mut();
			inner.scheduled = false;
			(
				std::mem::take(&mut inner.frame),
				std::mem::take(&mut inner.waiting),
			)
		};

		if keys.is_empty() && waiting.is_empty() {
			return;
		}

		trace!(model = %self.name, ?keys, "flush");

		for callback in waiting {
			callback(&keys);
		}
	}

	/// Evaluate every field now instead of on first access.
	pub fn ready(&self) -> Result<(), Error> {
		for key in self.keys() {
			self.read(&key, None, Origin::Direct)?;
		}

		Ok(())
	}

	/// End of life: every listener hears `None` once and is dropped,
	/// destroy hooks run, and any later assignment fails.
	pub fn destroy(&self) {
		let (followers, hooks) = {
			let mut inner = self.inner.borrow_mut();
			if inner.destroyed {
				return;
			}

			inner.destroyed = true;
			inner.queue.clear();
			inner.suspended.clear();
			(
				std::mem::take(&mut inner.followers),
				std::mem::take(&mut inner.destroy),
			)
		};

		debug!(model = %self.name, "destroy");

		for (_, follower) in followers {
			if let Err(error) = follower(None, self) {
				error!(model = %self.name, %error, "listener failed on destroy");
			}
		}

		for hook in hooks {
			hook(self);
		}
	}

	/// Plain copy of every field that has a value. Fields that fail to
	/// read are left out and logged; only a dropped model is an error.
	pub fn export(&self) -> Result<Snapshot, Error> {
		let mut snapshot = Snapshot::new();
		for key in self.keys() {
			match self.get(&key) {
				Ok(value) if value.is_undefined() => {}
				Ok(value) => {
					snapshot.insert(key, value);
				}
				Err(error @ Error::Dropped { .. }) => return Err(error),
				Err(error) => {
					warn!(model = %self.name, key = %key, %error, "field left out of export");
				}
			}
		}

		Ok(snapshot)
	}

	/// Assign every declared key found in `values` through the normal
	/// setter path. Keys the model does not declare and read-only fields
	/// are skipped, so an export can be imported back. Every field is set
	/// up before the first assignment; if that fails nothing is written.
	pub fn import<I, K, V>(&self, values: I) -> Result<(), Error>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<Value>,
	{
		let mut writes = Vec::new();
		for (key, value) in values {
			let key = key.as_ref();
			if !self.declares(key) {
				continue;
			}

			self.init(key)?;
			if self.field(key)?.read_only {
				trace!(model = %self.name, key, "read-only field skipped on import");
				continue;
			}

			writes.push((Key::from(key), value.into()));
		}

		for (key, value) in writes {
			self.write(&key, value)?;
		}

		Ok(())
	}
}

impl Debug for Control {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.borrow();
		f.debug_struct("Control")
			.field("name", &self.name)
			.field("frame", &inner.frame)
			.field("destroyed", &inner.destroyed)
			.finish()
	}
}
