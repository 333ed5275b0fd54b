use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use tracked::instructions::{child, deferred, reference, tuple};
use tracked::microtask::{self, run_until};
use tracked::{computed, Descriptor, Error, Instruction, Key, Model, Subscriber, Value};


#[test]
fn deferred_value_arrives_later() {
	mock::trace();

	let model = Model::builder("Session")
		.field("user", deferred(|_| async { Ok::<_, Error>("ada") }))
		.build();

	let sub = model.subscribe(|_| None);
	assert_eq!(sub.get("user").unwrap(), Value::Undefined);
	sub.commit();

	let suspense = match sub.get("user") {
		Err(Error::Suspended(suspense)) => suspense,
		other => panic!("expected suspension, got {other:?}"),
	};

	run_until(suspense);
	assert_eq!(sub.get("user").unwrap(), Value::from("ada"));
}

#[test]
fn deferred_failure_is_reported_on_read() {
	let model = Model::builder("Session")
		.field(
			"user",
			deferred(|_| async { Err::<String, _>(Error::custom("offline")) }),
		)
		.build();

	assert_eq!(model.get("user").unwrap(), Value::Undefined);
	microtask::flush();

	assert!(matches!(model.get("user"), Err(Error::Custom(_))));
}

#[test]
fn deferred_factory_sees_its_model() {
	let model = Model::builder("Greeting")
		.value("name", "Ada")
		.field(
			"greeting",
			deferred(|model: Model| async move {
				let name = model.get("name")?;
				Ok::<_, Error>(format!("Hello, {}", name.as_str().unwrap_or("stranger")))
			}),
		)
		.build();

	model.ready().unwrap();
	let keys = run_until(model.next()).unwrap().unwrap();

	assert_eq!(mock::names(&keys), ["greeting"]);
	assert_eq!(model.get("greeting").unwrap(), Value::from("Hello, Ada"));
}

fn wheel(size: u32) -> Model {
	Model::builder("Wheel").value("size", size).build()
}

#[test]
fn child_checks_its_kind() {
	let model = Model::builder("Car")
		.field("wheel", child("Wheel", Some(wheel(16))))
		.build();

	assert_eq!(
		model.get("wheel").unwrap().as_model().unwrap().get("size").unwrap(),
		Value::from(16)
	);

	model.set("wheel", wheel(17)).unwrap();
	model.set("wheel", Value::Null).unwrap();

	let engine = Model::builder("Engine").build();
	assert!(matches!(
		model.set("wheel", engine),
		Err(Error::TypeMismatch { .. })
	));
	assert!(matches!(
		model.set("wheel", 3),
		Err(Error::TypeMismatch { .. })
	));
	assert_eq!(model.get("wheel").unwrap(), Value::Null);
}

#[test]
fn child_of_the_wrong_kind_fails_setup() {
	let model = Model::builder("Car")
		.field("wheel", child("Wheel", Some(Model::builder("Engine").build())))
		.build();

	assert!(matches!(model.get("wheel"), Err(Error::TypeMismatch { .. })));
}

#[test]
fn child_is_destroyed_with_its_parent() {
	let front = wheel(16);
	let model = Model::builder("Car")
		.field("wheel", child("Wheel", Some(front.clone())))
		.build();

	model.get("wheel").unwrap();
	model.destroy();

	assert!(front.is_destroyed());
}

#[test]
fn tuple_ignores_equal_elements() {
	let model = Model::builder("Point")
		.field("xy", tuple(vec![1, 2]))
		.build();

	model.set("xy", vec![1, 2]).unwrap();
	assert!(!model.is_pending());

	model.set("xy", vec![1, 3]).unwrap();
	assert!(model.is_pending());
	assert_eq!(model.get("xy").unwrap(), Value::from(vec![1, 3]));

	assert!(matches!(model.set("xy", 5), Err(Error::TypeMismatch { .. })));
}

#[test]
fn reference_runs_effect_and_cleanup() {
	let log = Rc::new(RefCell::new(Vec::<String>::new()));

	let model = Model::builder("View")
		.field(
			"element",
			reference({
				let log = log.clone();
				move |value: &Value| -> Option<Box<dyn FnOnce()>> {
					let name = value.as_str().unwrap_or_default().to_owned();
					log.borrow_mut().push(format!("attach {name}"));

					let log = log.clone();
					Some(Box::new(move || log.borrow_mut().push(format!("detach {name}"))))
				}
			}),
		)
		.build();

	model.set("element", "a").unwrap();
	model.set("element", "a").unwrap();
	model.set("element", "b").unwrap();
	model.destroy();

	assert_eq!(
		*log.borrow(),
		["attach a", "detach a", "attach b", "detach b"]
	);
}

#[test]
fn custom_instruction() {
	let model = Model::builder("Custom")
		.field(
			"answer",
			Instruction::new(|setup| {
				assert_eq!(setup.key(), "answer");
				assert_eq!(setup.model().name(), "Custom");
				Ok(Descriptor::Value(Value::from(42)))
			}),
		)
		.field("empty", Instruction::new(|_| Ok(Descriptor::Skip)))
		.build();

	assert_eq!(model.get("answer").unwrap(), Value::from(42));
	assert_eq!(model.get("empty").unwrap(), Value::Undefined);

	model.set("empty", true).unwrap();
	assert_eq!(model.get("empty").unwrap(), Value::from(true));
}

#[test]
fn failing_instruction_leaves_a_plain_field() {
	let model = Model::builder("Broken")
		.field("x", Instruction::new(|_| Err(Error::custom("bad setup"))))
		.build();

	assert!(matches!(model.get("x"), Err(Error::Custom(_))));
	assert_eq!(model.get("x").unwrap(), Value::Undefined);
}

#[test]
fn export_and_import() {
	let address = Model::builder("Address").value("city", "London").build();
	let model = Model::builder("User")
		.value("name", "Ada")
		.value("age", 36)
		.value("address", address)
		.value("nickname", Value::Undefined)
		.field(
			"label",
			computed(|this: &Subscriber| {
				let name = this.get("name")?;
				let age = this.get("age")?;
				Ok(format!("{} ({})", name.as_str().unwrap_or(""), age.as_f64().unwrap_or(0.0)))
			}),
		)
		.build();

	let snapshot = model.export().unwrap();
	let keys: Vec<Key> = snapshot.keys().cloned().collect();
	assert_eq!(mock::names(&keys), ["address", "age", "label", "name"]);

	assert_eq!(
		serde_json::to_value(Value::from(model.clone())).unwrap(),
		json!({
			"address": { "city": "London" },
			"age": 36,
			"label": "Ada (36)",
			"name": "Ada",
		})
	);

	model
		.import([("name", "Grace"), ("unknown", "ignored")])
		.unwrap();
	assert_eq!(model.get("name").unwrap(), Value::from("Grace"));

	model.import([("label", "x")]).unwrap();
	assert_eq!(model.get("label").unwrap(), Value::from("Ada (36)"));
	assert!(matches!(model.set("label", "x"), Err(Error::ReadOnly { .. })));
}

#[test]
fn export_skips_a_failing_field() {
	mock::trace();

	let model = Model::builder("Profile")
		.value("name", "Ada")
		.field(
			"avatar",
			deferred(|_| async { Err::<String, _>(Error::custom("offline")) }),
		)
		.build();

	model.get("avatar").unwrap();
	microtask::flush();
	assert!(model.get("avatar").is_err());

	let snapshot = model.export().unwrap();
	let keys: Vec<Key> = snapshot.keys().cloned().collect();
	assert_eq!(mock::names(&keys), ["name"]);
}

fn area() -> Model {
	Model::builder("Area")
		.value("a", 1)
		.field(
			"b",
			computed(|this: &Subscriber| Ok(this.get("a")?.as_f64().unwrap_or(0.0) * 2.0)),
		)
		.value("c", 3)
		.build()
}

#[test]
fn export_imports_back() {
	let source = area();
	source.set("a", 4).unwrap();
	source.set("c", 5).unwrap();
	microtask::flush();

	let snapshot = source.export().unwrap();
	assert_eq!(snapshot.len(), 3);

	let target = area();
	target.import(snapshot).unwrap();

	assert_eq!(target.get("a").unwrap(), Value::from(4));
	assert_eq!(target.get("c").unwrap(), Value::from(5));
	microtask::flush();
	assert_eq!(target.get("b").unwrap(), Value::from(8));
}

#[test]
fn import_writes_past_a_read_only_field() {
	let model = area();

	model.import([("a", 5), ("b", 9), ("c", 7)]).unwrap();

	assert_eq!(model.get("a").unwrap(), Value::from(5));
	assert_eq!(model.get("c").unwrap(), Value::from(7));
	microtask::flush();
	assert_eq!(model.get("b").unwrap(), Value::from(10));
}

#[test]
fn import_into_a_destroyed_model_writes_nothing() {
	let model = area();
	model.destroy();

	assert!(matches!(
		model.import([("a", 5), ("c", 7)]),
		Err(Error::Destroyed { .. })
	));
	assert_eq!(model.get("a").unwrap(), Value::from(1));
	assert_eq!(model.get("c").unwrap(), Value::from(3));
}
