use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use turbine::{Error, FileLoader, MemoryLoader, Object, Result, Set, Value};

fn render(set: &Set, name: &str, context: Value) -> Result<String> {
    set.render(name, HashMap::new(), context)
}

fn eval(source: &str, context: Value) -> Result<String> {
    let set = Set::new();
    set.parse_template("t", source)?;
    render(&set, "t", context)
}

#[derive(Clone)]
struct User {
    name: String,
    email: String,
}

impl Object for User {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "Name" => Some(Value::from(self.name.clone())),
            "Email" => Some(Value::from(self.email.clone())),
            _ => None,
        }
    }

    fn has_method(&self, name: &str) -> bool {
        name == "Format"
    }

    fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        match (name, args.first()) {
            ("Format", Some(Value::String(pattern))) => {
                Ok(Value::String(pattern.replace("%s", &self.name)))
            }
            _ => Err(Error::call(name, "no such method")),
        }
    }

    fn type_name(&self) -> &str {
        "user"
    }
}

fn jose() -> Value {
    Value::Object(Arc::new(User {
        name: "José Santos".to_string(),
        email: "email@example.com".to_string(),
    }))
}

#[test]
fn actions_and_literals() {
    assert_eq!(eval("hello {{\"world\"}}", Value::Nil).unwrap(), "hello world");
    assert_eq!(eval("{{true}} {{false}}", Value::Nil).unwrap(), "true false");
    assert_eq!(eval("{{14}} {{1.23}}", Value::Nil).unwrap(), "14 1.23");
    assert_eq!(eval("{* gone *}kept", Value::Nil).unwrap(), "kept");
}

#[test]
fn arithmetic_matrix() {
    let cases = [
        ("{{ 2+1 }}", "3"),
        ("{{ 2-1 }}", "1"),
        ("{{ 2*3 }}", "6"),
        ("{{ 7/2 }}", "3"),
        ("{{ 7.0/2 }}", "3.5"),
        ("{{ 7%3 }}", "1"),
        ("{{ 2+4*2+4 }}", "14"),
        ("{{ (2*5)%1 }}", "0"),
        ("{{ (2+4)*(2+4) }}", "36"),
        ("{{ 1*1.23 }}", "1.23"),
        ("{{ -3+5 }}", "2"),
    ];
    for (source, expected) in cases {
        assert_eq!(eval(source, Value::Nil).unwrap(), expected, "{}", source);
    }
}

#[test]
fn comparison_and_logic_matrix() {
    let cases = [
        ("{{ 1 == 1.0 }}", "true"),
        ("{{ 1 != 2 }}", "true"),
        ("{{ \"a\" < \"b\" }}", "true"),
        ("{{ 2 >= 2 }}", "true"),
        ("{{ 5 * 5 > 2 * 12.5 == 5 * 5 > 2 * 12.5 }}", "true"),
        ("{{ true && false }}", "false"),
        ("{{ true || false }}", "true"),
        ("{{ !true }}", "false"),
        ("{{ \"\" == \"\" && 0 == 0.0 }}", "true"),
    ];
    for (source, expected) in cases {
        assert_eq!(eval(source, Value::Nil).unwrap(), expected, "{}", source);
    }
}

#[test]
fn fields_on_context_data() {
    let context = Value::from(json!({
        "Title": "Hello",
        "Author": {"Name": "José"},
        "Tags": ["go", "rust"],
    }));
    assert_eq!(
        eval("{{.Title}} by {{.Author.Name}} [{{.Tags.0}}/{{.Tags.1}}]", context).unwrap(),
        "Hello by José [go/rust]"
    );
}

#[test]
fn object_fields_and_method_dispatch() {
    let set = Set::new();
    set.add_global("user", jose());
    set.load_template("t", r#"{{user.Name}} {{user.Email}} {{user.Format("Hello %s!")}}"#);
    assert_eq!(
        render(&set, "t", Value::Nil).unwrap(),
        "José Santos email@example.com Hello José Santos!"
    );
}

#[test]
fn method_colon_call() {
    let set = Set::new();
    set.add_global("user", jose());
    set.load_template("t", r#"{{user.Format: "%s"}}"#);
    assert_eq!(render(&set, "t", Value::Nil).unwrap(), "José Santos");
}

#[test]
fn builtin_pipeline_chain() {
    assert_eq!(
        eval(r#"{{"WORLD-" | lower | repeat: 2 | hasPrefix: "world-"}}"#, Value::Nil).unwrap(),
        "true"
    );
    assert_eq!(
        eval(r#"{{replace("a-b-c", "-", "+", 1)}}"#, Value::Nil).unwrap(),
        "a+b-c"
    );
}

#[test]
fn named_arguments_build_maps() {
    assert_eq!(
        eval(
            r#"{{ map(@name,"José", @email,"j@example.pt").email }}"#,
            Value::Nil
        )
        .unwrap(),
        "j@example.pt"
    );
}

#[test]
fn conditionals() {
    let source = "{{if .Count > 10}}many{{else if .Count > 0}}some{{else}}none{{end}}";
    assert_eq!(eval(source, Value::from(json!({"Count": 11}))).unwrap(), "many");
    assert_eq!(eval(source, Value::from(json!({"Count": 3}))).unwrap(), "some");
    assert_eq!(eval(source, Value::from(json!({"Count": 0}))).unwrap(), "none");
}

#[test]
fn pipeline_as_condition() {
    assert_eq!(
        eval(r#"{{if "ab" | hasPrefix: "a"}}yes{{else}}no{{end}}"#, Value::Nil).unwrap(),
        "yes"
    );
    assert_eq!(
        eval(r#"{{if "ab" | hasPrefix: "b"}}yes{{else}}no{{end}}"#, Value::Nil).unwrap(),
        "no"
    );
}

#[test]
fn range_over_sequences_and_mappings() {
    let users = Value::from(json!([
        {"Name": "Peter"},
        {"Name": "Paul"},
    ]));
    assert_eq!(
        eval("{{range u := .}}<h1>{{u.Name}}</h1>{{end}}", users.clone()).unwrap(),
        "<h1>Peter</h1><h1>Paul</h1>"
    );
    assert_eq!(
        eval("{{range i, u := .}}{{i}}:{{u.Name}} {{end}}", users.clone()).unwrap(),
        "0:Peter 1:Paul "
    );
    // bare range rebinds the context
    assert_eq!(
        eval("{{range .}}<h1>{{.Name}}</h1>{{end}}", users).unwrap(),
        "<h1>Peter</h1><h1>Paul</h1>"
    );

    let pairs = Value::from(json!({"a": 1, "b": 2}));
    assert_eq!(
        eval("{{range k, v := .}}{{k}}={{v}};{{end}}", pairs).unwrap(),
        "a=1;b=2;"
    );
}

#[test]
fn range_loop_variables_stay_scoped() {
    let err = eval(
        "{{range v := .}}{{v}}{{end}}{{v}}",
        Value::Sequence(vec![Value::Int(1)]),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UndefinedField(_)));
}

#[test]
fn short_circuit_skips_failing_right_operand() {
    assert_eq!(eval("{{ (2*5)==5 || true }}", Value::Nil).unwrap(), "true");
    // the right operands would fail if reached
    assert_eq!(eval("{{ false && missing }}", Value::Nil).unwrap(), "false");
    assert_eq!(eval("{{ true || missing }}", Value::Nil).unwrap(), "true");
}

#[test]
fn override_applies_to_inline_render_and_yield() {
    let set = Set::new();
    set.add_global("user", jose());
    set.load_template(
        "Base",
        r#"{{block hello "Buddy"}}Hello {{.}}{{end}},{{yield hello user.Name}}"#,
    );
    set.load_template(
        "child",
        r#"{{extends "Base"}}{{block hello "Buddy"}}Hey {{.}}{{end}}"#,
    );
    assert_eq!(
        render(&set, "child", Value::Nil).unwrap(),
        "Hey Buddy,Hey José Santos"
    );
}

#[test]
fn blocks_yield_and_context_rebinding() {
    assert_eq!(
        eval(
            r#"{{block hello "Buddy"}}Hello {{.}}{{end}}, {{yield hello "Pal"}}"#,
            Value::Nil
        )
        .unwrap(),
        "Hello Buddy, Hello Pal"
    );
}

#[test]
fn full_page_composition() {
    let set = Set::new();
    set.load_template(
        "layout",
        "<html><title>{{yield title}}</title><body>{{yield body}}</body></html>",
    );
    set.load_template("nav", r#"{{block navbar}}<nav>{{.Section}}</nav>{{end}}"#);
    set.load_template("footer", "<footer>(c) {{.Year}}</footer>");
    set.load_template(
        "home",
        concat!(
            r#"{{extends "layout"}}{{import "nav"}}"#,
            r#"{{block title}}Home{{end}}"#,
            r#"{{block body}}{{yield navbar}}<p>welcome</p>{{include "footer"}}{{end}}"#,
        ),
    );

    let context = Value::from(json!({"Section": "home", "Year": 2026}));
    assert_eq!(
        render(&set, "home", context).unwrap(),
        "<html><title>Home</title><body><nav>home</nav><p>welcome</p><footer>(c) 2026</footer></body></html>"
    );
}

#[test]
fn include_resolves_blocks_through_includers_imports() {
    let set = Set::new();
    set.load_template("widgets", r#"{{block greet "Pal"}}Hello {{.}}{{end}}"#);
    set.load_template("inner", "{{yield greet}}");
    set.load_template("outer", r#"{{import "widgets"}}{{include "inner"}}"#);
    assert_eq!(render(&set, "outer", Value::Nil).unwrap(), "Hello Pal");
}

#[test]
fn grandchild_override_wins() {
    let set = Set::new();
    set.load_template("base", "[{{yield slot}}]");
    set.load_template("mid", r#"{{extends "base"}}{{block slot}}mid{{end}}"#);
    set.load_template("leaf", r#"{{extends "mid"}}{{block slot}}leaf{{end}}"#);
    assert_eq!(render(&set, "leaf", Value::Nil).unwrap(), "[leaf]");
}

#[test]
fn variables_and_globals_resolution_order() {
    let set = Set::new();
    set.add_global("who", "global");
    set.load_template("t", "{{who}}");

    assert_eq!(render(&set, "t", Value::Nil).unwrap(), "global");

    let mut variables = HashMap::new();
    variables.insert("who".to_string(), Value::from("local"));
    assert_eq!(set.render("t", variables, Value::Nil).unwrap(), "local");
}

#[test]
fn error_surfacing() {
    assert!(matches!(
        eval("{{missing}}", Value::Nil).unwrap_err(),
        Error::UndefinedField(_)
    ));
    assert!(matches!(
        eval("{{yield ghost}}", Value::Nil).unwrap_err(),
        Error::UndefinedBlock(_)
    ));
    assert!(matches!(
        eval(r#"{{"a" / 1}}"#, Value::Nil).unwrap_err(),
        Error::TypeMismatch(_)
    ));
    assert!(matches!(
        eval("{{1 / 0}}", Value::Nil).unwrap_err(),
        Error::DivisionByZero
    ));
    assert!(matches!(
        eval("{{ 9223372036854775807 + 1 }}", Value::Nil).unwrap_err(),
        Error::TypeMismatch(_)
    ));
    assert!(matches!(
        eval(r#"{{map("odd")}}"#, Value::Nil).unwrap_err(),
        Error::Call { .. }
    ));
    assert!(matches!(
        eval("{{range 42}}x{{end}}", Value::Nil).unwrap_err(),
        Error::NotIterable(_)
    ));

    let set = Set::new();
    let err = render(&set, "nowhere", Value::Nil).unwrap_err();
    assert!(matches!(err, Error::UnresolvedTemplate(_)));
}

#[test]
fn recursion_limit_guards_self_include() {
    let set = Set::new();
    set.load_template("t", r#"x{{include "t"}}"#);
    assert!(matches!(
        render(&set, "t", Value::Nil).unwrap_err(),
        Error::RecursionLimit(_)
    ));
}

#[test]
fn file_loader_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("base.jet"), "({{yield body}})").unwrap();
    std::fs::write(
        dir.path().join("page.jet"),
        r#"{{extends "base"}}{{block body}}hello {{.}}{{end}}"#,
    )
    .unwrap();

    let set = Set::with_loader(FileLoader::new(dir.path()));
    assert_eq!(
        render(&set, "page", Value::from("disk")).unwrap(),
        "(hello disk)"
    );
}

#[test]
fn memory_loader_end_to_end() {
    let set = Set::with_loader(
        MemoryLoader::new().with_template("greet", "hi {{.}}"),
    );
    assert_eq!(render(&set, "greet", Value::from("there")).unwrap(), "hi there");
}

#[test]
fn concurrent_renders_share_one_set() {
    let set = Arc::new(Set::new());
    set.add_global("user", jose());
    set.load_template("profile", "{{user.Name}} #{{.}}");

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let set = set.clone();
            std::thread::spawn(move || render(&set, "profile", Value::Int(i)).unwrap())
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), format!("José Santos #{}", i));
    }
}

#[test]
fn render_to_custom_sink() {
    let set = Set::new();
    set.load_template("t", "a{{.}}c");
    let mut out = String::from(">> ");
    set.render_to("t", HashMap::new(), Value::from("b"), &mut out)
        .unwrap();
    assert_eq!(out, ">> abc");
}
