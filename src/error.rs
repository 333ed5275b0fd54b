use std::fmt::Display;
use std::rc::Rc;

use thiserror::Error;

use crate::suspense::Suspense;
use crate::Key;

#[derive(Debug, Clone, Error)]
pub enum Error {
	#[error("{model}.{key} is not a declared field")]
	Unknown { model: Rc<str>, key: Key },

	#[error("{model} is destroyed, cannot assign {key}")]
	Destroyed { model: Rc<str>, key: Key },

	#[error("{model} was dropped while still observed")]
	Dropped { model: Rc<str> },

	#[error("{model}.{key} is read-only")]
	ReadOnly { model: Rc<str>, key: Key },

	#[error("{model}.{key} expects {expected}, got {found}")]
	TypeMismatch {
		model: Rc<str>,
		key: Key,
		expected: Rc<str>,
		found: Rc<str>,
	},

	#[error("{model}.{key} depends on itself")]
	Cycle { model: Rc<str>, key: Key },

	#[error("{}.{} is not ready yet", .0.model(), .0.key())]
	Suspended(Suspense),

	#[error("timed out after {ms}ms waiting for {}", list(.keys))]
	Timeout { keys: Vec<Key>, ms: u128 },

	#[error("expected {} to be pending on {model}", list(.keys))]
	NotPending { model: Rc<str>, keys: Vec<Key> },

	#[error("{model} has pending updates to {}", list(.keys))]
	Busy { model: Rc<str>, keys: Vec<Key> },

	#[error("{model} was destroyed while waiting for {}", list(.keys))]
	Cancelled { model: Rc<str>, keys: Vec<Key> },

	#[error("{0}")]
	Custom(Rc<str>),
}

impl Error {
	pub fn custom(message: impl Display) -> Self {
		Error::Custom(message.to_string().into())
	}

	pub fn is_suspended(&self) -> bool {
		matches!(self, Error::Suspended(_))
	}
}

fn list(keys: &[Key]) -> String {
	if keys.is_empty() {
		return "any update".to_owned();
	}

	keys.iter().map(|k| &**k).collect::<Vec<_>>().join(", ")
}
