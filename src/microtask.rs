//! Thread-local zero-delay task queue.
//!
//! Every model schedules at most one flush per frame here. Nothing runs
//! until the queue is drained by [`flush`] (or, on `wasm32`, by the
//! browser's own microtask checkpoint).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

type Task = Box<dyn FnOnce()>;

thread_local! {
	static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
	static RUNNING: Cell<bool> = Cell::new(false);
	static POOL: RefCell<LocalPool> = RefCell::new(LocalPool::new());
	static SPAWNER: LocalSpawner = POOL.with(|pool| pool.borrow().spawner());
	static DRIVER: RefCell<Option<Waker>> = RefCell::new(None);
}

pub fn queue<F: FnOnce() + 'static>(func: F) {
	let is_first = QUEUE.with(|queue| {
		let mut queue = queue.borrow_mut();
		queue.push_back(Box::new(func));
		queue.len() == 1
	});

	// A future driven by `run_until` has to come back and drain the queue.
	DRIVER.with(|driver| {
		if let Some(waker) = &*driver.borrow() {
			waker.wake_by_ref();
		}
	});

	#[cfg(target_arch = "wasm32")]
	if is_first && !RUNNING.with(|r| r.get()) {
		js::queue(flush);
	}

	#[cfg(not(target_arch = "wasm32"))]
	let _ = is_first;
}

/// Start a future on the thread-local pool. It is polled whenever the
/// queue is flushed, and while [`run_until`] is driving the thread.
pub fn spawn<F: Future<Output = ()> + 'static>(future: F) {
	SPAWNER.with(|spawner| {
		if let Err(error) = spawner.spawn_local(future) {
			tracing::error!(%error, "failed to spawn task");
		}
	});
}

/// Whether any task is waiting in the queue.
pub fn pending() -> bool {
	QUEUE.with(|queue| !queue.borrow().is_empty())
}

/// Run queued tasks, and tasks queued by them, until the queue is empty.
/// Calling this from inside a task does nothing, the outer call picks up
/// whatever the task queued.
pub fn flush() {
	let Some(_guard) = Running::enter() else {
		return;
	};

	loop {
		while let Some(task) = next() {
			task();
		}

		// The spawner borrows the pool when first created.
		SPAWNER.with(|_| ());
		POOL.with(|pool| {
			// Already borrowed while `run_until` drives the pool.
			if let Ok(mut pool) = pool.try_borrow_mut() {
				pool.run_until_stalled();
			}
		});

		if !pending() {
			break;
		}
	}
}

/// Block the thread on `future`, running spawned futures and flushing the
/// queue whenever something is queued. Timeouts wake the thread from the
/// timer thread of `futures-timer`.
///
/// Must not be called from inside a spawned future.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_until<F: Future>(future: F) -> F::Output {
	let future = std::pin::pin!(future);

	SPAWNER.with(|_| ());
	let output = POOL.with(|pool| pool.borrow_mut().run_until(Driver { future }));

	DRIVER.with(|driver| driver.borrow_mut().take());
	output
}

#[cfg(not(target_arch = "wasm32"))]
struct Driver<'a, F> {
	future: Pin<&'a mut F>,
}

#[cfg(not(target_arch = "wasm32"))]
impl<F: Future> Future for Driver<'_, F> {
	type Output = F::Output;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		DRIVER.with(|driver| *driver.borrow_mut() = Some(cx.waker().clone()));

		loop {
			flush();

			if let Poll::Ready(output) = self.future.as_mut().poll(cx) {
				return Poll::Ready(output);
			}

			if !pending() {
				return Poll::Pending;
			}
		}
	}
}

fn next() -> Option<Task> {
	QUEUE.with(|queue| queue.borrow_mut().pop_front())
}

struct Running;

impl Running {
	fn enter() -> Option<Running> {
		if RUNNING.with(|r| r.replace(true)) {
			None
		} else {
			Some(Running)
		}
	}
}

impl Drop for Running {
	fn drop(&mut self) {
		RUNNING.with(|r| r.set(false));
	}
}

#[cfg(target_arch = "wasm32")]
mod js {
	use wasm_bindgen::prelude::*;

	#[wasm_bindgen]
	extern "C" {
		#[wasm_bindgen(js_name = queueMicrotask)]
		fn queue_microtask(closure: &JsValue);
	}

	pub fn queue<F: FnOnce() + 'static>(func: F) {
		queue_microtask(&Closure::once_into_js(func));
	}
}
