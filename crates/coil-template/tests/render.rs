use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use coil_template::{
    Component, Instance, MapImporter, NoImports, ParserOptions, RenderError, Scope, Shape,
    Template, Value, WithBuiltins,
};
use pretty_assertions::assert_eq;

fn scope(pairs: &[(&str, Value)]) -> Scope {
    Scope::new(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

fn render(source: &str, scope: &Scope) -> String {
    Template::parse(source)
        .unwrap()
        .render_to_string(scope)
        .unwrap()
}

fn with_importer(source: &str, importer: MapImporter) -> Template {
    Template::parse_with(
        source,
        &ParserOptions::default(),
        Shape::Any,
        &WithBuiltins::new(importer),
    )
    .unwrap()
}

fn card() -> Template {
    Template::parse_with(
        "<section><h2>${heading}</h2>${children}</section>",
        &ParserOptions::default(),
        Shape::object([("heading", Shape::String), ("children", Shape::Html)]),
        &NoImports,
    )
    .unwrap()
}

/// Counts instances and disposals.
#[derive(Clone, Default)]
struct Counter {
    created: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
}

impl Component for Counter {
    fn input_shape(&self) -> Shape {
        Shape::object([("n", Shape::Number)])
    }

    fn output_shape(&self) -> Shape {
        Shape::String
    }

    fn instantiate(&self) -> Box<dyn Instance> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(self.clone())
    }
}

impl Instance for Counter {
    fn render(&mut self, scope: &Scope) -> Result<Value, RenderError> {
        scope.meta().insert("rendered".into(), true.into());
        Ok(Value::String(format!("#{}", scope.get("n").unwrap_or_default().to_text())))
    }

    fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Always fails.
struct Broken;

impl Component for Broken {
    fn input_shape(&self) -> Shape {
        Shape::Any
    }

    fn output_shape(&self) -> Shape {
        Shape::Html
    }

    fn instantiate(&self) -> Box<dyn Instance> {
        Box::new(BrokenInstance)
    }
}

struct BrokenInstance;

impl Instance for BrokenInstance {
    fn render(&mut self, _scope: &Scope) -> Result<Value, RenderError> {
        Err(RenderError::Type {
            message: "boom".into(),
            line: 7,
            column: 3,
        })
    }
}

// =============================================================================
// Conditionals
// =============================================================================

#[test]
fn test_if_true_renders_element() {
    assert_eq!(render("<p c:if=\"true\">X</p>", &Scope::default()), "<p>X</p>");
}

#[test]
fn test_if_false_renders_nothing() {
    assert_eq!(render("<p c:if=\"false\">X</p>", &Scope::default()), "");
}

#[test]
fn test_chain_switches_between_renders() {
    let template = Template::parse("<p c:if=\"on\">on</p><p c:else>off</p>").unwrap();
    let scope = scope(&[("on", true.into())]);
    let mut instance = template.instance();

    let first = instance.render(&scope).unwrap();
    assert_eq!(first.into_html().to_string(), "<p>on</p>");

    scope.set("on", false.into());
    let second = instance.render(&scope).unwrap();
    assert_eq!(second.into_html().to_string(), "<p>off</p>");
}

#[test]
fn test_pattern_condition_by_value_kind() {
    let source = "<p c:if=\"val is string\">${val}</p><p c:else>not a string</p>";
    assert_eq!(render(source, &scope(&[("val", "hi".into())])), "<p>hi</p>");
    assert_eq!(
        render(source, &scope(&[("val", 3.0.into())])),
        "<p>not a string</p>"
    );
}

#[test]
fn test_pattern_binding_only_inside_branch() {
    let source = "<p c:if=\"val is string as s\">[${s}]</p><span>${s}</span>";
    assert_eq!(
        render(source, &scope(&[("val", "hi".into())])),
        "<p>[hi]</p><span></span>"
    );
}

#[test]
fn test_nil_never_matches() {
    let source = "<p c:if=\"missing is any\">yes</p><p c:else>no</p>";
    assert_eq!(render(source, &Scope::default()), "<p>no</p>");
}

// =============================================================================
// Loops
// =============================================================================

#[test]
fn test_loop_renders_like_written_out_list() {
    let looped = render(
        "<ul><li c:for=\"item in ['a','b','c']\">${item}</li></ul>",
        &Scope::default(),
    );
    let written = render("<ul><li>a</li><li>b</li><li>c</li></ul>", &Scope::default());
    assert_eq!(looped, written);
}

#[test]
fn test_loop_index_and_nested_loop() {
    let rows = Value::Array(vec![
        Value::from(vec!["a", "b"]),
        Value::from(vec!["c"]),
    ]);
    let out = render(
        "<table><tr c:for=\"row, i in rows\"><td c:for=\"cell in row\">${i}${cell}</td></tr></table>",
        &scope(&[("rows", rows)]),
    );
    assert_eq!(
        out,
        "<table><tr><td>0a</td><td>0b</td></tr><tr><td>1c</td></tr></table>"
    );
}

#[test]
fn test_loop_identity_reused_and_tail_disposed() {
    let counter = Counter::default();
    let template = with_importer(
        "<c c:for=\"x in xs\"><ui:count n=\"${x}\"/></c>",
        MapImporter::new().with("ui:count", counter.clone()),
    );
    let scope = scope(&[("xs", Value::from(vec![1.0, 2.0, 3.0]))]);
    let mut instance = template.instance();

    let out = instance.render(&scope).unwrap();
    assert_eq!(out, Value::from("#1#2#3"));
    let ids: Vec<u64> = instance
        .state()
        .keys()
        .iter()
        .map(|k| instance.state().scope(*k).unwrap().id())
        .collect();

    instance.render(&scope).unwrap();
    let again: Vec<u64> = instance
        .state()
        .keys()
        .iter()
        .map(|k| instance.state().scope(*k).unwrap().id())
        .collect();
    assert_eq!(ids, again);
    assert_eq!(counter.created.load(Ordering::SeqCst), 3);

    scope.set("xs", Value::from(vec![1.0]));
    let out = instance.render(&scope).unwrap();
    assert_eq!(out, Value::from("#1"));
    assert_eq!(instance.state().keys().len(), 1);
    assert_eq!(counter.disposed.load(Ordering::SeqCst), 2);

    instance.dispose();
    assert_eq!(counter.disposed.load(Ordering::SeqCst), 3);
    instance.dispose();
    assert_eq!(counter.disposed.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Variables
// =============================================================================

#[test]
fn test_typed_object_var_defaults_when_empty() {
    let source = "<c c:var=\"user {name: string, age: number}\"><c c:if=\"false\">x</c></c>\
                  <p>${user.name}|${user.age}</p>";
    assert_eq!(render(source, &Scope::default()), "<p>|0</p>");
}

#[test]
fn test_var_scoped_to_enclosing_element() {
    let source = "<div><c c:var=\"t\">x</c><p>${t}</p></div><p>${t}</p>";
    assert_eq!(render(source, &Scope::default()), "<div><p>x</p></div><p></p>");
}

#[test]
fn test_nested_var_restores_outer_value() {
    let scope = scope(&[("t", "outer".into())]);
    let source = "<div><c c:var=\"t\">inner</c>${t}</div>${t}";
    assert_eq!(render(source, &scope), "<div>inner</div>outer");
    assert_eq!(scope.get("t"), Some(Value::from("outer")));
}

#[test]
fn test_var_decode_error_reports_position() {
    let template = Template::parse("<p>a</p>\n<c c:var=\"n number\">abc</c>").unwrap();
    let err = template.render_to_string(&Scope::default()).unwrap_err();
    match err {
        RenderError::Decode { shape, line, .. } => {
            assert_eq!(shape, "number");
            assert_eq!(line, 2);
        }
        other => panic!("expected decode error, got {other}"),
    }
}

// =============================================================================
// Imports
// =============================================================================

#[test]
fn test_import_renders_with_arguments_and_children() {
    let template = with_importer(
        "<ui:card heading=\"${title}\"><p>body</p></ui:card>",
        MapImporter::new().with("ui:card", card()),
    );
    let out = template
        .render_to_string(&scope(&[("title", "Hi".into())]))
        .unwrap();
    assert_eq!(out, "<section><h2>Hi</h2><p>body</p></section>");
}

#[test]
fn test_import_named_argument_from_var() {
    let template = with_importer(
        "<ui:card><c c:var=\"heading\">Named</c></ui:card>",
        MapImporter::new().with("ui:card", card()),
    );
    assert_eq!(
        template.render_to_string(&Scope::default()).unwrap(),
        "<section><h2>Named</h2></section>"
    );
}

#[test]
fn test_hidden_named_argument_is_not_passed() {
    let template = with_importer(
        "<ui:card><c c:var=\"heading\" c:if=\"false\">Hidden</c></ui:card>",
        MapImporter::new().with("ui:card", card()),
    );
    assert_eq!(
        template.render_to_string(&Scope::default()).unwrap(),
        "<section><h2></h2></section>"
    );
}

#[test]
fn test_named_argument_from_chain() {
    let template = with_importer(
        "<ui:card>\
           <c c:var=\"heading\" c:if=\"v is string as s\">Hi ${s}</c>\
           <c c:var=\"heading\" c:else>Nobody</c>\
         </ui:card>",
        MapImporter::new().with("ui:card", card()),
    );
    assert_eq!(
        template
            .render_to_string(&scope(&[("v", "Ada".into())]))
            .unwrap(),
        "<section><h2>Hi Ada</h2></section>"
    );
    assert_eq!(
        template
            .render_to_string(&scope(&[("v", 1.0.into())]))
            .unwrap(),
        "<section><h2>Nobody</h2></section>"
    );
}

#[test]
fn test_import_scope_is_isolated() {
    let inner = Template::parse("<b>${secret}</b>").unwrap();
    let template = with_importer(
        "<ui:inner></ui:inner>",
        MapImporter::new().with("ui:inner", inner),
    );
    assert_eq!(
        template
            .render_to_string(&scope(&[("secret", "s".into())]))
            .unwrap(),
        "<b></b>"
    );
}

#[test]
fn test_unknown_import_argument_fails_before_render() {
    let result = Template::parse_with(
        "<ui:card title=\"x\"></ui:card>",
        &ParserOptions::default(),
        Shape::Any,
        &MapImporter::new().with("ui:card", card()),
    );
    let errors = result.unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors.to_string().contains("no argument 'title'"));
}

#[test]
fn test_import_metadata_propagates() {
    let template = with_importer(
        "<ui:count n=\"1\"/>",
        MapImporter::new().with("ui:count", Counter::default()),
    );
    let scope = Scope::default();
    template.render_to_string(&scope).unwrap();
    assert_eq!(scope.meta().get("rendered"), Some(&Value::Bool(true)));
}

#[test]
fn test_dry_run_skips_components() {
    let counter = Counter::default();
    let template = with_importer(
        "<p>${1 + 1}</p><ui:count n=\"1\"/>",
        MapImporter::new().with("ui:count", counter.clone()),
    );
    let out = template
        .render_to_string(&Scope::dry(BTreeMap::new()))
        .unwrap();
    assert_eq!(out, "<p>2</p>");
    assert_eq!(counter.created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_component_error_is_wrapped_with_import_site() {
    let template = with_importer(
        "<div>\n  <ui:broken></ui:broken>\n</div>",
        MapImporter::new().with("ui:broken", Broken),
    );
    let err = template.render_to_string(&Scope::default()).unwrap_err();
    match err {
        RenderError::Component {
            name, line, inner, ..
        } => {
            assert_eq!(name, "ui:broken");
            assert_eq!(line, 2);
            assert!(matches!(*inner, RenderError::Type { line: 7, .. }));
        }
        other => panic!("expected component error, got {other}"),
    }
}

#[test]
fn test_attrs_builtin_captures_arguments() {
    let template = Template::parse(
        "<c c:var=\"a\"><c:attrs id=\"main\" size=\"${2 * 2}\"/></c><p>${a.id}:${a.size}</p>",
    )
    .unwrap();
    assert_eq!(
        template.render_to_string(&Scope::default()).unwrap(),
        "<p>main:4</p>"
    );
}

// =============================================================================
// Text
// =============================================================================

#[test]
fn test_title_escaped_once() {
    assert_eq!(
        render(
            "<title>Tom &amp; Jerry</title><p>Tom &amp; Jerry</p>",
            &Scope::default()
        ),
        "<title>Tom &amp; Jerry</title><p>Tom &amp; Jerry</p>"
    );
}

#[test]
fn test_textarea_interpolates_and_escapes() {
    assert_eq!(
        render(
            "<textarea>&lt;${v}&gt;</textarea>",
            &scope(&[("v", "<b>".into())])
        ),
        "<textarea>&lt;&lt;b&gt;&gt;</textarea>"
    );
}

#[test]
fn test_literal_placeholder_syntax() {
    let scope = scope(&[("x", "X".into())]);
    assert_eq!(
        render("<p>&#36;{x} \\${x} ${x}</p>", &scope),
        "<p>${x} ${x} X</p>"
    );
    assert_eq!(
        render("<a title=\"&#36;{x}\">a</a>", &scope),
        "<a title=\"${x}\">a</a>"
    );
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_parse_errors_accumulate() {
    let errors = Template::parse("<p c:else>a</p>\n<div c:nope=\"1\"></div>\n<i c:for=\"in\"></i>")
        .unwrap_err();
    assert_eq!(errors.len(), 3);
    let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 2, 3]);
}

// =============================================================================
// Host data
// =============================================================================

#[test]
fn test_values_from_json() {
    let data: BTreeMap<String, Value> = serde_json::from_str(
        r#"{"user": {"name": "Ada", "langs": ["en", "fr"]}}"#,
    )
    .unwrap();
    let out = render(
        "<h1>${user.name}</h1><i c:for=\"l in user.langs\">${l}</i>",
        &Scope::new(data),
    );
    assert_eq!(out, "<h1>Ada</h1><i>en</i><i>fr</i>");
}
