use turbine::{parse, Expression, Node};

/// Print a parsed template and check the printed form parses back to the
/// same tree.
fn roundtrip(source: &str) -> String {
    let first = parse("t", source).unwrap();
    let printed = first.to_string();
    let second =
        parse("t", &printed).unwrap_or_else(|e| panic!("reparse of {:?} failed: {}", printed, e));
    assert_eq!(first, second, "printed form: {:?}", printed);
    printed
}

#[test]
fn roundtrip_text_and_comments() {
    assert_eq!(roundtrip("hello world"), "hello world");
    assert_eq!(roundtrip("hello {*Buddy*} World"), "hello {*Buddy*} World");
    assert_eq!(roundtrip("{* multi\nline *}"), "{* multi\nline *}");
}

#[test]
fn roundtrip_expressions() {
    roundtrip("{{ 2+4*2+4 }}");
    roundtrip("{{ (2+4)*2 }}");
    roundtrip("{{ 2*5%1 }}");
    roundtrip("{{ -1.23 + -x }}");
    roundtrip("{{ !enabled || count > 0 && count <= max }}");
    roundtrip("{{ 5 * 5 > 2 * 12.5 == 5 * 5 > 2 * 12.5 }}");
    roundtrip(r#"{{ "escape \"this\"\n" }}"#);
    roundtrip("{{ user.profile.name }}{{ .Name }}{{ . }}{{ items.0 }}");
}

#[test]
fn roundtrip_statements() {
    roundtrip("{{if ok}}a{{end}}");
    roundtrip("{{if false}}a{{else if true}}b{{else}}c{{end}}");
    roundtrip("{{range users}}{{.Name}}{{end}}");
    roundtrip("{{range user := users}}<h1>{{user.Name}}</h1>{{end}}");
    roundtrip("{{range k, v := pairs}}{{k}}={{v}}{{else}}empty{{end}}");
    roundtrip(r#"{{block hello "Buddy"}}Hello {{.}}{{end}}{{yield hello}}"#);
    roundtrip(r#"{{include "partial"}}"#);
}

#[test]
fn roundtrip_composition_headers() {
    assert_eq!(
        roundtrip(r#"{{extends "base"}}{{block title}}Home{{end}}"#),
        r#"{{extends "base"}}{{block title}}Home{{end}}"#
    );
    // headers always print before body nodes
    assert_eq!(
        roundtrip(r#"a{{import "widgets"}}b{{yield badge}}"#),
        r#"{{import "widgets"}}ab{{yield badge}}"#
    );
}

#[test]
fn printing_normalizes_colon_calls() {
    assert_eq!(
        roundtrip(r#"{{repeat: "ab", 2}}"#),
        r#"{{repeat("ab", 2)}}"#
    );
}

#[test]
fn printing_keeps_float_literals_floats() {
    assert_eq!(roundtrip("{{ 1.0 + 2.5 }}"), "{{1.0 + 2.5}}");
}

#[test]
fn printing_keeps_named_arguments() {
    assert_eq!(
        roundtrip(r#"{{ map(@name,"José", @age,30) }}"#),
        r#"{{map(@name, "José", @age, 30)}}"#
    );
}

#[test]
fn pipelines_survive_printing() {
    let printed = roundtrip(r#"{{lower: "WORLD-" |upper|repeat: 2}}"#);
    assert_eq!(printed, r#"{{lower("WORLD-") | upper | repeat: 2}}"#);
}

#[test]
fn parse_reports_template_and_line() {
    let err = parse("views/home", "line one\n{{if x}}never closed").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("views/home"), "got: {}", message);
    assert!(message.contains("expected {{end}}"), "got: {}", message);
}

#[test]
fn parse_rejects_misplaced_composition() {
    assert!(parse("t", r#"{{if x}}{{extends "base"}}{{end}}"#).is_err());
    assert!(parse("t", r#"{{ 1 }}{{extends "base"}}"#).is_err());
    assert!(parse("t", r#"{{extends "base"}}{{ 1 }}"#).is_err());
}

#[test]
fn blocks_are_registered_on_the_template() {
    let template = parse(
        "t",
        r#"{{block header}}h{{end}}{{block footer "f"}}{{.}}{{end}}"#,
    )
    .unwrap();
    assert_eq!(template.blocks.len(), 2);
    assert!(template.blocks["header"].arg.is_none());
    assert!(matches!(
        template.blocks["footer"].arg,
        Some(Expression::Str(_))
    ));
}

#[test]
fn context_sugar_parses_as_field_access() {
    let template = parse("t", "{{ .Name }}").unwrap();
    match &template.nodes[0] {
        Node::Action(Expression::Field { object, name }) => {
            assert_eq!(**object, Expression::Context);
            assert_eq!(name, "Name");
        }
        other => panic!("expected field access, got {:?}", other),
    }
}
