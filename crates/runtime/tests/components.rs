//! Components, their lifecycle, and element modifiers.

mod common;

use anyhow::Result;
use core::cell::RefCell;
use serde_json::json;
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_opcode_compiler::Template;
use trellis_reference::{CapturedArguments, ConstReference, Object as _, TrackedObject, Value};
use trellis_runtime::component::{ClassComponentManager, Component, ComponentFactory};
use trellis_runtime::modifier::ElementModifier;
use trellis_runtime::{Environment, render_component};

use common::{Harness, template};

type Log = Rc<RefCell<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// `<span>{greeting} {{@name}}</span>`
fn greeting_layout(id: &str, greeting: &str) -> Result<Rc<Template>> {
    Ok(Rc::new(template(
        id,
        &json!(["@name"]),
        &json!([[9, "span", true], [10], [1, 1, 0, 0, format!("{greeting} ")], [1, 0, 0, 0, [27, [24, 1], []]], [11]]),
        &json!([]),
    )?))
}

struct Greeter {
    this: Rc<TrackedObject>,
    log: Log,
}

impl Component for Greeter {
    fn this(&self) -> Value {
        Value::from(Rc::clone(&self.this))
    }

    fn did_create(&self) {
        self.log.borrow_mut().push("did_create".to_owned());
    }

    fn update(&self, args: &CapturedArguments) {
        self.log
            .borrow_mut()
            .push(format!("update {}", args.named_value("name").to_text()));
    }

    fn did_update(&self) {
        self.log.borrow_mut().push("did_update".to_owned());
    }

    fn will_destroy(&self) {
        self.log.borrow_mut().push("will_destroy".to_owned());
    }

    fn did_destroy(&self) {
        self.log.borrow_mut().push("did_destroy".to_owned());
    }
}

/// A factory for [`Greeter`]s sharing `this` and `log`.
fn greeter_factory(this: &Rc<TrackedObject>, log: &Log) -> ComponentFactory {
    let this = Rc::clone(this);
    let log = Rc::clone(log);
    Rc::new(move |args: &CapturedArguments| {
        log.borrow_mut()
            .push(format!("create {}", args.named_value("name").to_text()));
        Rc::new(Greeter {
            this: Rc::clone(&this),
            log: Rc::clone(&log),
        }) as Rc<dyn Component>
    })
}

/// `<p>{{this.greeting}}, {{@name}}</p>`
fn greeter_layout() -> Result<Rc<Template>> {
    Ok(Rc::new(template(
        "greeter",
        &json!(["@name"]),
        &json!([
            [9, "p", true],
            [10],
            [1, 0, 0, 0, [27, [24, 0], ["greeting"]]],
            [1, 1, 0, 0, ", "],
            [1, 0, 0, 0, [27, [24, 1], []]],
            [11]
        ]),
        &json!([]),
    )?))
}

/// Test a template-only component with an argument, a block and splatted
/// attributes.
///
/// # Panics
/// Panics if the component renders wrong or does not follow its argument.
#[test]
fn template_only_component() -> Result<()> {
    let harness = Harness::default();
    let card = template(
        "card",
        &json!(["@title", "&default", "&attrs"]),
        &json!([
            [9, "section", false],
            [15, 3],
            [10],
            [9, "h2", true],
            [10],
            [1, 0, 0, 0, [27, [24, 1], []]],
            [11],
            [16, 2, null],
            [11]
        ]),
        &json!([]),
    )?;
    harness.registry.register_template_only("Card", Rc::new(card))?;

    let state = TrackedObject::with_fields([("title", Value::from("News"))]);
    let host = template(
        "host",
        &json!([]),
        &json!([[7, "Card", [[12, "id", "main", null]], [["@title"], [[27, [24, 0], ["title"]]]],
            [["default"], [{"statements": [[1, 1, 0, 0, "body"]], "parameters": []}]]]]),
        &json!([]),
    )?;
    let result = harness.render(&host, &state)?;
    assert_eq!(harness.html(), r#"<section id="main"><h2>News</h2>body</section>"#);

    assert!(state.set("title", Value::from("Sports")));
    result.rerender()?;
    assert_eq!(harness.html(), r#"<section id="main"><h2>Sports</h2>body</section>"#);
    Ok(())
}

/// Test the hooks of a class component through creation, an argument change,
/// a change to its own state and teardown.
///
/// # Panics
/// Panics if a hook is missed, repeated or out of order.
#[test]
fn class_component_lifecycle() -> Result<()> {
    let harness = Harness::default();
    let log = Log::default();
    let inner = TrackedObject::with_fields([("greeting", Value::from("Hello"))]);
    harness
        .registry
        .register_class("Greeter", greeter_layout()?, greeter_factory(&inner, &log))?;

    let state = TrackedObject::with_fields([("show", Value::from(true)), ("name", Value::from("Ada"))]);
    let host = template(
        "host",
        &json!([]),
        &json!([[5, [27, [26, 0, "BlockHead"], []], [[27, [24, 0], ["show"]]], null,
            [["default"], [{"statements": [
                [7, "Greeter", [], [["@name"], [[27, [24, 0], ["name"]]]], null]
            ], "parameters": []}]]]]),
        &json!(["if"]),
    )?;
    let result = harness.render(&host, &state)?;
    assert_eq!(harness.html(), "<p>Hello, Ada</p>");
    assert_eq!(entries(&log), ["create Ada", "did_create"]);

    assert!(state.set("name", Value::from("Grace")));
    result.rerender()?;
    assert_eq!(harness.html(), "<p>Hello, Grace</p>");
    assert_eq!(entries(&log)[2..], ["update Grace", "did_update"]);

    log.borrow_mut().clear();
    assert!(inner.set("greeting", Value::from("Howdy")));
    result.rerender()?;
    assert_eq!(harness.html(), "<p>Howdy, Grace</p>");
    assert_eq!(entries(&log), Vec::<String>::new());

    assert!(state.set("show", Value::from(false)));
    result.rerender()?;
    assert_eq!(harness.html(), "<!---->");
    assert_eq!(entries(&log), ["will_destroy", "did_destroy"]);
    Ok(())
}

/// Test `{{component}}` with a name that changes.
///
/// # Panics
/// Panics if the wrong component is shown.
#[test]
fn dynamic_component_by_name() -> Result<()> {
    let harness = Harness::default();
    harness
        .registry
        .register_template_only("Hello", greeting_layout("hello", "Hello")?)?;
    harness
        .registry
        .register_template_only("Bye", greeting_layout("bye", "Bye")?)?;

    let state = TrackedObject::with_fields([("which", Value::from("Hello")), ("name", Value::from("Ada"))]);
    let host = template(
        "host",
        &json!([]),
        &json!([[1, 0, 0, 0, [31, 0, 0, [27, [26, 0, "CallHead"], []], [[27, [24, 0], ["which"]]],
            [["name"], [[27, [24, 0], ["name"]]]]]]]),
        &json!(["component"]),
    )?;
    let result = harness.render(&host, &state)?;
    assert_eq!(harness.html(), "<span>Hello Ada</span>");

    assert!(state.set("which", Value::from("Bye")));
    result.rerender()?;
    assert_eq!(harness.html(), "<span>Bye Ada</span>");

    assert!(state.set("which", Value::from("Nobody")));
    assert!(result.rerender().is_err_and(|error| format!("{error:#}").contains("Nobody")));
    Ok(())
}

/// Test a component curried with `(component ...)` and invoked later.
///
/// # Panics
/// Panics if the curried arguments are lost.
#[test]
fn curried_component_keeps_its_arguments() -> Result<()> {
    let harness = Harness::default();
    harness
        .registry
        .register_template_only("Hello", greeting_layout("hello", "Hello")?)?;

    let state = TrackedObject::new();
    let host = template(
        "host",
        &json!(["greeting"]),
        &json!([[5, [27, [26, 1, "BlockHead"], []],
            [[31, 0, 0, [27, [26, 0, "CallHead"], []], ["Hello"], [["name"], ["bound"]]]],
            null,
            [["default"], [{"statements": [
                [1, 0, 0, 0, [31, 0, 0, [27, [26, 0, "CallHead"], []], [[27, [24, 1], []]], null]]
            ], "parameters": [1]}]]]]),
        &json!(["component", "let"]),
    )?;
    harness.render(&host, &state)?;
    assert_eq!(harness.html(), "<span>Hello bound</span>");
    Ok(())
}

/// Test rendering a component directly with host-supplied arguments.
///
/// # Panics
/// Panics if the component does not render or is not torn down.
#[test]
fn render_component_directly() -> Result<()> {
    let harness = Harness::default();
    let log = Log::default();
    let inner = TrackedObject::with_fields([("greeting", Value::from("Hi"))]);
    let definition =
        ClassComponentManager::definition("Greeter", greeter_layout()?, greeter_factory(&inner, &log));

    let result = render_component(
        &harness.runtime,
        definition,
        vec![(Rc::from("name"), ConstReference::new(Value::from("Lin")))],
        harness.root(),
        None,
    )?;
    assert_eq!(harness.html(), "<p>Hi, Lin</p>");
    assert_eq!(entries(&log), ["create Lin", "did_create"]);

    result.destroy()?;
    assert_eq!(harness.html(), "");
    assert_eq!(entries(&log)[2..], ["will_destroy", "did_destroy"]);
    Ok(())
}

/// Records what it was asked to do.
struct Recorder {
    log: Log,
}

impl ElementModifier for Recorder {
    fn install(&self, _env: &Environment, _element: NodeId, args: &CapturedArguments) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("install {}", args.positional_value(0).to_text()));
        Ok(())
    }

    fn update(&self, _env: &Environment, _element: NodeId, args: &CapturedArguments) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("update {}", args.positional_value(0).to_text()));
        Ok(())
    }

    fn destroy(&self, _element: NodeId) {
        self.log.borrow_mut().push("destroy".to_owned());
    }
}

/// Test that modifiers install after the render, update on argument
/// changes and are destroyed with their element.
///
/// # Panics
/// Panics if a modifier hook is missed or repeated.
#[test]
fn modifier_lifecycle() -> Result<()> {
    let harness = Harness::default();
    let log = Log::default();
    harness.registry.register_element_modifier(
        "record",
        Rc::new(Recorder {
            log: Rc::clone(&log),
        }),
    )?;

    let state = TrackedObject::with_fields([("show", Value::from(true)), ("label", Value::from("ok"))]);
    let host = template(
        "host",
        &json!([]),
        &json!([[5, [27, [26, 0, "BlockHead"], []], [[27, [24, 0], ["show"]]], null,
            [["default"], [{"statements": [
                [9, "button", false],
                [3, 0, 0, [27, [26, 1, "ModifierHead"], []], [[27, [24, 0], ["label"]]], null],
                [10],
                [1, 1, 0, 0, "x"],
                [11]
            ], "parameters": []}]]]]),
        &json!(["if", "record"]),
    )?;
    let result = harness.render(&host, &state)?;
    assert_eq!(harness.html(), "<button>x</button>");
    assert_eq!(entries(&log), ["install ok"]);

    result.rerender()?;
    assert_eq!(entries(&log), ["install ok"]);

    assert!(state.set("label", Value::from("go")));
    result.rerender()?;
    assert_eq!(entries(&log), ["install ok", "update go"]);

    assert!(state.set("show", Value::from(false)));
    result.rerender()?;
    assert_eq!(entries(&log), ["install ok", "update go", "destroy"]);
    Ok(())
}
