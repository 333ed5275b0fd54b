//! Waiting for updates: callbacks per flush and futures for the next one.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;
use futures_timer::Delay;
use smallvec::SmallVec;
use tracing::warn;

use crate::control::{Control, Release};
use crate::instruction::Origin;
use crate::{Callback, Error, Key};

/// Which updates to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
	/// Any key.
	Any,
	/// A flush including at least one of these keys.
	Keys(SmallVec<[Key; 2]>),
	/// No update at all: quiescence for [`Control::once`], end of life for
	/// [`Control::on`].
	Nothing,
}

impl Expect {
	pub fn keys<I, K>(keys: I) -> Self
	where
		I: IntoIterator<Item = K>,
		K: AsRef<str>,
	{
		Expect::Keys(keys.into_iter().map(|k| k.as_ref().into()).collect())
	}

	fn matches(&self, key: &str) -> bool {
		match self {
			Expect::Any => true,
			Expect::Keys(keys) => keys.iter().any(|k| &**k == key),
			Expect::Nothing => false,
		}
	}

	fn list(&self) -> Vec<Key> {
		match self {
			Expect::Keys(keys) => keys.to_vec(),
			_ => Vec::new(),
		}
	}
}

impl From<&str> for Expect {
	fn from(key: &str) -> Self {
		Expect::keys([key])
	}
}

impl<const N: usize> From<[&str; N]> for Expect {
	fn from(keys: [&str; N]) -> Self {
		Expect::keys(keys)
	}
}

impl From<&[&str]> for Expect {
	fn from(keys: &[&str]) -> Self {
		Expect::keys(keys)
	}
}

impl From<Vec<&str>> for Expect {
	fn from(keys: Vec<&str>) -> Self {
		Expect::keys(keys)
	}
}

type Outcome = Result<Option<Vec<Key>>, Error>;

impl Control {
	/// Call `callback` after every flush matching `expect`, with the keys of
	/// that flush. With `once`, only the first one. `Expect::Nothing` calls
	/// it when the model is destroyed instead.
	pub fn on<E, F>(&self, expect: E, callback: F, once: bool) -> Release
	where
		E: Into<Expect>,
		F: Fn(&[Key]) + 'static,
	{
		let expect = expect.into();
		if expect == Expect::Nothing {
			return self.on_destroy(move || callback(&[]));
		}

		self.watch(&expect);

		let slot: Rc<RefCell<Option<Release>>> = Rc::default();
		let fired = Cell::new(false);
		let deferred: Callback = Rc::new({
			let slot = slot.clone();
			move |keys: &[Key]| {
				if once {
					if fired.replace(true) {
						return;
					}
					if let Some(release) = slot.borrow_mut().take() {
						release.release();
					}
				}
				callback(keys)
			}
		});

		let release = self.add_listener(move |key, _| {
			Ok(match key {
				Some(key) if expect.matches(key) => Some(deferred.clone()),
				_ => None,
			})
		});

		*slot.borrow_mut() = Some(release.clone());
		release
	}

	pub fn on_destroy<F: FnOnce() + 'static>(&self, callback: F) -> Release {
		if self.is_destroyed() {
			callback();
			return Release::new(|| {});
		}

		let callback = RefCell::new(Some(callback));
		self.add_listener(move |key, _| {
			if key.is_none() {
				let callback = callback.borrow_mut().take();
				if let Some(callback) = callback {
					callback();
				}
			}
			Ok(None)
		})
	}

	/// Resolve with the keys of the next flush matching `expect`.
	///
	/// - `Expect::Nothing` resolves to `None` right away if nothing is
	///   pending and fails with [`Error::Busy`] otherwise.
	/// - A zero `timeout` fails with [`Error::NotPending`] unless a matching
	///   update is already pending.
	/// - Any other `timeout` fails with [`Error::Timeout`] once it elapses.
	/// - If the model is destroyed first, waiting for any key resolves to an
	///   empty list and waiting for given keys fails with
	///   [`Error::Cancelled`].
	pub fn once(&self, expect: impl Into<Expect>, timeout: Option<Duration>) -> Update {
		let expect = expect.into();
		let model = self.name_rc();
		let frame = self.frame();

		if expect == Expect::Nothing {
			return Update::ready(if frame.is_empty() {
				Ok(None)
			} else {
				Err(Error::Busy { model, keys: frame })
			});
		}

		let keys = expect.list();
		let pending = frame.iter().any(|k| expect.matches(k));

		if timeout == Some(Duration::ZERO) && !pending {
			return Update::ready(Err(Error::NotPending { model, keys }));
		}

		if self.is_destroyed() {
			return Update::ready(ended(model, keys));
		}

		self.watch(&expect);

		let (sender, receiver) = oneshot::channel();
		let waiter = Rc::new(Waiter {
			sender: RefCell::new(Some(sender)),
			release: RefCell::new(None),
		});

		let deferred: Callback = Rc::new({
			let waiter = waiter.clone();
			move |changed: &[Key]| waiter.resolve(Ok(Some(changed.to_vec())))
		});

		let release = self.add_listener({
			let waiter = waiter.clone();
			let deferred = deferred.clone();
			let model = model.clone();
			let keys = keys.clone();
			move |key, _| match key {
				Some(key) if expect.matches(key) => Ok(Some(deferred.clone())),
				Some(_) => Ok(None),
				None => {
					waiter.resolve(ended(model.clone(), keys.clone()));
					Ok(None)
				}
			}
		});

		*waiter.release.borrow_mut() = Some(release);

		if pending {
			self.defer(deferred);
		}

		let timeout = timeout
			.filter(|delay| !delay.is_zero())
			.map(|delay| (Delay::new(delay), delay.as_millis()));

		Update {
			state: State::Waiting(Waiting {
				receiver,
				timeout,
				waiter,
				model,
				keys,
			}),
		}
	}

	/// The next flush, whatever it contains.
	pub fn next(&self) -> Update {
		self.once(Expect::Any, None)
	}

	/// Make sure watched keys are set up, so computed fields among them
	/// are evaluated and tracking their dependencies.
	fn watch(&self, expect: &Expect) {
		if let Expect::Keys(keys) = expect {
			for key in keys {
				if let Err(error) = self.read(key, None, Origin::Watch) {
					warn!(model = self.name(), key = %key, %error, "watched field is not readable");
				}
			}
		}
	}
}

fn ended(model: Rc<str>, keys: Vec<Key>) -> Outcome {
	if keys.is_empty() {
		Ok(Some(Vec::new()))
	} else {
		Err(Error::Cancelled { model, keys })
	}
}

struct Waiter {
	sender: RefCell<Option<oneshot::Sender<Outcome>>>,
	release: RefCell<Option<Release>>,
}

impl Waiter {
	fn resolve(&self, outcome: Outcome) {
		let sender = self.sender.borrow_mut().take();
		if let Some(sender) = sender {
			let _ = sender.send(outcome);
		}
		self.detach();
	}

	fn detach(&self) {
		let release = self.release.borrow_mut().take();
		if let Some(release) = release {
			release.release();
		}
	}
}

/// Future returned by [`Control::once`] and [`Control::next`].
///
/// Resolves to `Some(keys)` for a flush and to `None` for a passed
/// quiescence check. Once resolved it stays pending, and dropping it early
/// removes its listener from the model.
pub struct Update {
	state: State,
}

enum State {
	Ready(Outcome),
	Waiting(Waiting),
	Done,
}

struct Waiting {
	receiver: oneshot::Receiver<Outcome>,
	timeout: Option<(Delay, u128)>,
	waiter: Rc<Waiter>,
	model: Rc<str>,
	keys: Vec<Key>,
}

impl Waiting {
	fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Outcome> {
		if let Some((delay, ms)) = &mut self.timeout {
			if Pin::new(delay).poll(cx).is_ready() {
				let ms = *ms;
				self.timeout = None;
				self.waiter.resolve(Err(Error::Timeout {
					keys: self.keys.clone(),
					ms,
				}));
			}
		}

		Pin::new(&mut self.receiver).poll(cx).map(|received| {
			received.unwrap_or_else(|_| {
				Err(Error::Cancelled {
					model: self.model.clone(),
					keys: self.keys.clone(),
				})
			})
		})
	}
}

impl Drop for Waiting {
	fn drop(&mut self) {
		self.waiter.detach();
	}
}

impl Update {
	fn ready(outcome: Outcome) -> Self {
		Update {
			state: State::Ready(outcome),
		}
	}
}

impl Future for Update {
	type Output = Outcome;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let state = &mut self.get_mut().state;

		if let State::Waiting(waiting) = state {
			let outcome = std::task::ready!(waiting.poll(cx));
			*state = State::Done;
			return Poll::Ready(outcome);
		}

		match mem::replace(state, State::Done) {
			State::Ready(outcome) => Poll::Ready(outcome),
			_ => Poll::Pending,
		}
	}
}
