use std::cell::RefCell;
use std::rc::Rc;

use mockall::predicate;
use tracked::instructions::pending;
use tracked::microtask::{self, run_until};
use tracked::{subscribe, Callback, Error, Key, Model, Status, Subscriber, Value};


use mock::{joined, names, SharedMock, Spy};

fn reporter(mock: &SharedMock) -> Callback {
	let mock = mock.clone();
	Rc::new(move |keys: &[Key]| mock.get().trigger(joined(keys)))
}

fn session(model: &Model, callback: Callback) -> Subscriber {
	subscribe(model, move |_| Some(callback.clone()))
}

#[test]
fn nothing_is_delivered_before_commit() {
	let model = Model::builder("Form").value("name", "").build();
	let mock = SharedMock::new();

	mock.get().expect_trigger().times(0).return_const(());

	let sub = session(&model, reporter(&mock));
	sub.get("name").unwrap();
	assert!(!sub.is_active());

	model.set("name", "Ada").unwrap();
	microtask::flush();
	mock.get().checkpoint();

	mock.get()
		.expect_trigger()
		.with(predicate::eq("name".to_owned()))
		.times(1)
		.return_const(());

	sub.commit();
	assert!(sub.is_active());

	model.set("name", "Grace").unwrap();
	microtask::flush();
	mock.get().checkpoint();
}

#[test]
fn one_callback_per_flush() {
	let model = Model::builder("Form")
		.value("first", "")
		.value("last", "")
		.build();
	let mock = SharedMock::new();

	mock.get()
		.expect_trigger()
		.with(predicate::eq("first,last".to_owned()))
		.times(1)
		.return_const(());

	let sub = session(&model, reporter(&mock));
	sub.get("first").unwrap();
	sub.get("last").unwrap();
	sub.commit();

	model.set("first", "Ada").unwrap();
	model.set("last", "Lovelace").unwrap();
	microtask::flush();
	mock.get().checkpoint();
}

#[test]
fn release_twice_is_harmless() {
	let model = Model::builder("Form").value("name", "").build();
	let mock = SharedMock::new();

	mock.get().expect_trigger().times(0).return_const(());

	let sub = session(&model, reporter(&mock));
	sub.get("name").unwrap();
	sub.commit();

	sub.release();
	sub.release();
	assert!(!sub.is_active());

	// A released session cannot be revived.
	sub.commit();
	assert!(!sub.is_active());

	model.set("name", "Ada").unwrap();
	microtask::flush();
	mock.get().checkpoint();
}

#[test]
fn custom_handler_per_key() {
	let model = Model::builder("Form")
		.value("name", "")
		.value("age", 0)
		.build();
	let mock = SharedMock::new();

	mock.get()
		.expect_trigger()
		.with(predicate::eq("custom".to_owned()))
		.times(1)
		.return_const(());
	mock.get()
		.expect_trigger()
		.with(predicate::eq("name".to_owned()))
		.times(1)
		.return_const(());

	let sub = session(&model, reporter(&mock));
	sub.get("name").unwrap();
	sub.add(
		"age",
		Some(Rc::new({
			let mock = mock.clone();
			move |_: Option<&str>| -> Option<Callback> {
				mock.get().trigger("custom".to_owned());
				None
			}
		})),
	);
	sub.commit();

	assert_eq!(names(&sub.keys()), ["name", "age"]);

	model.set("age", 36).unwrap();
	model.set("name", "Ada").unwrap();
	microtask::flush();
	mock.get().checkpoint();
}

#[test]
fn suspension_round_trip() {
	mock::trace();

	let model = Model::builder("Profile").field("name", pending()).build();
	let mock = SharedMock::new();
	let sub = session(&model, reporter(&mock));

	// Not committed yet, so nothing suspends.
	assert_eq!(sub.get("name").unwrap(), Value::Undefined);
	assert_eq!(model.get("name").unwrap(), Value::Undefined);

	sub.commit();

	let suspense = match sub.get("name") {
		Err(Error::Suspended(suspense)) => suspense,
		other => panic!("expected suspension, got {other:?}"),
	};
	assert_eq!(suspense.key(), "name");
	assert!(!suspense.is_resolved());
	assert!(matches!(sub.status("name"), Status::Pending(_)));

	mock.get()
		.expect_trigger()
		.with(predicate::eq("name".to_owned()))
		.times(1)
		.return_const(());

	model.set("name", "Ada").unwrap();
	assert!(suspense.is_resolved());
	run_until(suspense);

	microtask::flush();
	mock.get().checkpoint();

	assert_eq!(sub.get("name").unwrap(), Value::from("Ada"));
	assert!(sub.status("name").is_ready());
}

#[test]
fn repeated_reads_share_one_suspense() {
	let model = Model::builder("Profile").field("name", pending()).build();
	let sub = session(&model, Rc::new(|_: &[Key]| {}));
	sub.commit();

	let suspended = || match sub.get("name") {
		Err(Error::Suspended(suspense)) => suspense,
		other => panic!("expected suspension, got {other:?}"),
	};

	let first = suspended();
	let second = suspended();
	let third = match sub.status("name") {
		Status::Pending(suspense) => suspense,
		other => panic!("expected a pending field, got {other:?}"),
	};
	assert_eq!(first, second);
	assert_eq!(first, third);

	model.set("name", "Ada").unwrap();
	assert!(first.is_resolved());
	assert!(third.is_resolved());
	assert_eq!(sub.get("name").unwrap(), Value::from("Ada"));

	model.set("name", Value::Undefined).unwrap();
	let fresh = suspended();
	assert!(!fresh.is_resolved());
	assert_ne!(fresh, first);
}

#[test]
fn suspense_resolves_on_destroy() {
	let model = Model::builder("Profile").field("name", pending()).build();
	let sub = session(&model, Rc::new(|_: &[Key]| {}));
	sub.commit();

	let Status::Pending(suspense) = sub.status("name") else {
		panic!("expected a pending field");
	};

	model.destroy();
	assert!(suspense.is_resolved());
	run_until(suspense);
}

#[test]
fn child_session_follows_the_parent() {
	let inner = Model::builder("Address").value("city", "Paris").build();
	let outer = Model::builder("Person").value("address", inner.clone()).build();
	let mock = SharedMock::new();

	let sub = session(&outer, reporter(&mock));
	let child = sub.child("address").unwrap();
	assert_eq!(child.get("city").unwrap(), Value::from("Paris"));
	assert!(sub.child("address").unwrap().model().unwrap().ptr_eq(&inner));

	sub.commit();
	assert!(child.is_active());

	mock.get()
		.expect_trigger()
		.with(predicate::eq("city".to_owned()))
		.times(1)
		.return_const(());

	inner.set("city", "Rome").unwrap();
	microtask::flush();
	mock.get().checkpoint();

	sub.release();
	assert!(!child.is_active());
}

#[test]
fn child_of_a_plain_value_is_a_mismatch() {
	let model = Model::builder("Person").value("name", "Ada").build();
	let sub = session(&model, Rc::new(|_: &[Key]| {}));

	assert!(matches!(
		sub.child("name"),
		Err(Error::TypeMismatch { .. })
	));
}

#[test]
fn destroy_reaches_committed_sessions() {
	let model = Model::builder("Form").value("name", "").build();
	let seen = Rc::new(RefCell::new(Vec::new()));

	let sub = model.subscribe({
		let seen = seen.clone();
		move |key: Option<&str>| -> Option<Callback> {
			seen.borrow_mut().push(key.map(str::to_owned));
			None
		}
	});
	sub.get("name").unwrap();
	sub.commit();

	model.set("name", "Ada").unwrap();
	model.destroy();

	assert_eq!(*seen.borrow(), vec![Some("name".to_owned()), None]);
}

#[test]
fn session_outliving_its_model() {
	let model = Model::builder("Form").value("name", "").build();
	let sub = session(&model, Rc::new(|_: &[Key]| {}));
	drop(model);

	assert!(sub.model().is_none());
	assert!(matches!(sub.get("name"), Err(Error::Dropped { .. })));
}
