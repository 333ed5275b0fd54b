use std::fmt::Debug;
use std::rc::Rc;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::Model;

/// Dynamic value stored in a model field.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	String(Rc<str>),
	Array(Vec<Value>),
	Model(Model),
}

impl Value {
	/// Identity check used to decide whether an assignment is a change.
	///
	/// Arrays are never the same, so writing an array always propagates
	/// (an array mutated in place and written back must notify).
	/// Models compare by identity, `NaN` never matches itself.
	pub fn is_same(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) => true,
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::String(a), Value::String(b)) => a == b,
			(Value::Model(a), Value::Model(b)) => a.ptr_eq(b),
			_ => false,
		}
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_model(&self) -> Option<&Model> {
		match self {
			Value::Model(model) => Some(model),
			_ => None,
		}
	}

	/// Short description used in type mismatch errors.
	pub fn kind(&self) -> Rc<str> {
		match self {
			Value::Undefined => "undefined".into(),
			Value::Null => "null".into(),
			Value::Bool(_) => "bool".into(),
			Value::Number(_) => "number".into(),
			Value::String(_) => "string".into(),
			Value::Array(_) => "array".into(),
			Value::Model(model) => model.name().into(),
		}
	}
}

/// Structural equality, for comparing values in code and tests.
/// Change detection uses [`Value::is_same`] instead.
impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Array(a), Value::Array(b)) => a == b,
			_ => self.is_same(other),
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Null => f.write_str("null"),
			Value::Bool(b) => b.fmt(f),
			Value::Number(n) => n.fmt(f),
			Value::String(s) => s.fmt(f),
			Value::Array(items) => f.debug_list().entries(items).finish(),
			Value::Model(model) => model.fmt(f),
		}
	}
}

macro_rules! number {
	($($t:ty),*) => {
		$(impl From<$t> for Value {
			fn from(value: $t) -> Self {
				Value::Number(value as f64)
			}
		})*
	};
}

number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::String(value.into())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::String(value.into())
	}
}

impl From<Rc<str>> for Value {
	fn from(value: Rc<str>) -> Self {
		Value::String(value)
	}
}

impl From<Model> for Value {
	fn from(value: Model) -> Self {
		Value::Model(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(value: Vec<T>) -> Self {
		Value::Array(value.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Value::Undefined | Value::Null => serializer.serialize_none(),
			Value::Bool(b) => serializer.serialize_bool(*b),
			Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
				serializer.serialize_i64(*n as i64)
			}
			Value::Number(n) => serializer.serialize_f64(*n),
			Value::String(s) => serializer.serialize_str(s),
			Value::Array(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(item)?;
				}
				seq.end()
			}
			Value::Model(model) => {
				let snapshot = model.export().map_err(S::Error::custom)?;
				let mut map = serializer.serialize_map(Some(snapshot.len()))?;
				for (key, value) in &snapshot {
					map.serialize_entry(&**key, value)?;
				}
				map.end()
			}
		}
	}
}
