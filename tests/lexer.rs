//! Delimiter scanning and tokenizer tests.

mod common;

use common::{texts, tokens_covering};
use doctags::{
    Attribute, DefaultGrammar, GrammarContext, GrammarError, Position, SourceLocation,
    TagDescriptor, TagGrammar, TokenKind, Value, find_tag_end, tokenize, tokenize_with,
};
use pretty_assertions::assert_eq;

// -----------------------------------------------------------
// find_tag_end: inline directives.
// -----------------------------------------------------------

#[test]
fn tag_end_in_a_heading() {
    let example = "# Testing {% #foo.bar baz=1 %}";
    let end = find_tag_end(example, 0);
    assert_eq!(end, Some(28));
    assert_eq!(&example[28..29], "%");
}

#[test]
fn tag_end_with_string() {
    let example = r#"# Testing {% #foo.bar baz="example" test=true %}"#;
    assert_eq!(find_tag_end(example, 0), Some(46));
}

#[test]
fn tag_end_with_object_literal() {
    let example = r#"# Testing {% #foo.bar baz={test: 1, foo: {test: "asdf{"}} %}"#;
    assert_eq!(find_tag_end(example, 0), Some(58));
}

#[test]
fn tag_end_in_containers() {
    assert_eq!(find_tag_end("{% foo %}", 0), Some(7));
    assert_eq!(find_tag_end("{% foo .bar.baz#test %}", 0), Some(21));
    assert_eq!(find_tag_end(r#"{% foo test="this is a test" %}"#, 0), Some(29));
}

#[test]
fn tag_end_missing_for_invalid_container() {
    assert_eq!(find_tag_end("{% foo .bar#baz", 0), None);
}

#[test]
fn tag_end_in_complex_container() {
    let example = r#"{% #foo .bar .baz test="this} is \"{test}\" a test" %} this is a test"#;
    assert_eq!(find_tag_end(example, 0), Some(52));
}

#[test]
fn tag_end_respects_start_offset() {
    let example = "{% a %} {% b %}";
    assert_eq!(find_tag_end(example, 0), Some(5));
    assert_eq!(find_tag_end(example, 7), Some(13));
}

// -----------------------------------------------------------
// find_tag_end: directives spanning lines.
// -----------------------------------------------------------

#[test]
fn tag_end_multiline_simple() {
    let example = "\n        {% test #foo.bar\n              baz=1 %}\n        ";
    let end = find_tag_end(example, 0);
    assert_eq!(end, Some(46));
    assert_eq!(&example[46..47], "%");
}

#[test]
fn tag_end_multiline_with_strings() {
    let cases = [
        (
            "\n        {% test #foo.bar\n              baz=\"this is a test\"\n              example=1 %}\n        ",
            85,
        ),
        (
            "\n        {% test #foo.bar\n              baz=\"this \\\"is a test\"\n              example=1 %}\n        ",
            87,
        ),
        (
            "\n        {% test #foo.bar\n              baz=\"this {is a test\"\n              example=1 %}\n        ",
            86,
        ),
        (
            "\n        {% test #foo.bar\n              baz=\"th\\\"is {is a \\\\te\\\"st\"\n              example=1 %}\n        ",
            92,
        ),
    ];
    for (example, expected) in cases {
        assert_eq!(find_tag_end(example, 0), Some(expected), "{example:?}");
    }
}

#[test]
fn tag_end_multiline_object_literal() {
    let example = "\n        {% test #foo.bar\n              foo={testing: \"this } is a test\", bar: {baz: 1}}\n              example=1 another=\"test}\" %}\n        ";
    assert_eq!(find_tag_end(example, 0), Some(129));
}

#[test]
fn tag_end_missing_without_close_delimiter() {
    let example = "\n        {test #foo.bar\n              foo={testing: \"this } is a test\", bar: {baz: 1}\n              example=1 another=\"test}\"}\n        ";
    assert_eq!(find_tag_end(example, 0), None);
}

// -----------------------------------------------------------
// tokenize.
// -----------------------------------------------------------

#[test]
fn tokenize_simple_example() {
    let input = r#"this is a {% foo blah="asdf" %}test{% /foo %} of template parsing"#;
    let tokens = tokens_covering(input);

    let spans: Vec<_> = tokens.iter().map(|t| (t.start, t.end, t.nesting)).collect();
    assert_eq!(
        spans,
        [(0, 10, 0), (10, 31, 1), (31, 35, 0), (35, 45, -1), (45, 65, 0)]
    );
    assert_eq!(texts(&tokens), ["this is a ", "test", " of template parsing"]);

    match &tokens[1].kind {
        TokenKind::TagOpen {
            directive,
            tag,
            attributes,
        } => {
            assert_eq!(tag, "foo");
            assert_eq!(directive.info, r#"{% foo blah="asdf" %}"#);
            assert!(directive.inline);
            assert_eq!(attributes, &[Attribute::plain("blah", "asdf")]);
        }
        other => panic!("expected tag_open, got {other:?}"),
    }
    match &tokens[3].kind {
        TokenKind::TagClose { directive, tag } => {
            assert_eq!(tag, "foo");
            assert_eq!(directive.info, "{% /foo %}");
        }
        other => panic!("expected tag_close, got {other:?}"),
    }
}

#[test]
fn tokenize_code_block_does_not_hang() {
    let input = "```\n{%a %b %c}\n```";
    let tokens = tokens_covering(input);
    assert_eq!(tokens.len(), 1);
    assert_eq!(texts(&tokens), [input]);
}

#[test]
fn tokenize_empty_input() {
    let tokens = tokens_covering("");
    assert_eq!(texts(&tokens), [""]);
}

#[test]
fn block_directives_absorb_their_lines() {
    let input = "{% note %}\nBody\n{% /note %}\n";
    let tokens = tokens_covering(input);
    assert_eq!(texts(&tokens), ["", "\nBody", "\n"]);

    let directives: Vec<_> = tokens
        .iter()
        .filter_map(|t| t.kind.directive())
        .map(|d| (d.lines, d.position, d.inline))
        .collect();
    assert_eq!(
        directives,
        [
            ([1, 2], Position { start: 0, end: 10 }, false),
            ([3, 4], Position { start: 0, end: 11 }, false),
        ]
    );
}

#[test]
fn indented_block_directive_keeps_column() {
    let input = "intro\n  {% aside %}\n";
    let tokens = tokens_covering(input);
    let directive = tokens[1].kind.directive().expect("directive");
    assert!(!directive.inline);
    assert_eq!(directive.position, Position { start: 2, end: 13 });
    assert_eq!(texts(&tokens), ["intro", "\n"]);
}

#[test]
fn self_closing_tag() {
    let tokens = tokens_covering(r#"See {% img src="a.png" /%} here"#);
    match &tokens[1].kind {
        TokenKind::Tag {
            tag, attributes, ..
        } => {
            assert_eq!(tag, "img");
            assert_eq!(attributes, &[Attribute::plain("src", "a.png")]);
        }
        other => panic!("expected tag, got {other:?}"),
    }
    assert_eq!(tokens[1].nesting, 0);
}

#[test]
fn multibyte_text_uses_byte_offsets() {
    let input = "héllo {% x /%} wörld";
    let tokens = tokens_covering(input);
    assert_eq!(tokens[1].start, 7);
    assert_eq!(tokens[1].span(input), "{% x /%}");
    assert_eq!(texts(&tokens), ["héllo ", " wörld"]);
}

#[test]
fn lines_count_text_newlines_only() {
    let input = "a\n{% foo\n  bar=1 %}\nb\n{% /foo %}";
    let tokens = tokens_covering(input);
    let lines: Vec<_> = tokens
        .iter()
        .filter_map(|t| t.kind.directive())
        .map(|d| d.lines)
        .collect();
    assert_eq!(lines, [[2, 3], [4, 5]]);
}

#[test]
fn invalid_directive_becomes_error_token() {
    let tokens = tokens_covering("text {% foo bar= %} more");
    match &tokens[1].kind {
        TokenKind::Error { directive, error } => {
            assert_eq!(directive.lines, [1, 2]);
            assert_eq!(error.location.start.line, 1);
            assert!(!error.message.is_empty());
        }
        other => panic!("expected error token, got {other:?}"),
    }
}

fn error_span(input: &str) -> (SourceLocation, SourceLocation) {
    let tokens = tokens_covering(input);
    tokens
        .iter()
        .find_map(|t| match &t.kind {
            TokenKind::Error { error, .. } => Some((error.location.start, error.location.end)),
            _ => None,
        })
        .expect("error token")
}

#[test]
fn error_position_counts_newlines_inside_directive() {
    let at = |line, character| SourceLocation { line, character };
    assert_eq!(error_span("{% foo\n bar= %}"), (at(2, 5), at(2, 5)));
    assert_eq!(error_span("x\n{% foo\n bar=\n %}"), (at(3, 5), at(3, 5)));
}

#[test]
fn column_restarts_after_newline_inside_directive() {
    let tokens = tokens_covering("{% a\n b=1 %} {% c %}");
    let directive = tokens[3].kind.directive().expect("second directive");
    assert_eq!(directive.position, Position { start: 8, end: 15 });
}

#[test]
fn many_directives_on_one_line() {
    let input = "{% x /%}".repeat(20_000);
    let tokens = tokens_covering(&input);
    assert_eq!(tokens.len(), 40_001);
    let last = tokens[tokens.len() - 2].kind.directive().expect("directive");
    assert_eq!(last.lines, [1, 2]);
    assert_eq!(last.position, Position { start: 159_992, end: 160_000 });
    assert!(last.inline);
}

#[test]
fn first_line_offsets_line_numbers() {
    let tokens = tokenize_with("x\n{% a %}", 10, &DefaultGrammar).expect("tokenize");
    let directive = tokens[1].kind.directive().expect("directive");
    assert_eq!(directive.lines, [12, 13]);
}

#[test]
fn tokens_serialize_with_type_tag() {
    let tokens = tokenize(r#"{% foo blah="asdf" %}"#).expect("tokenize");
    let json = serde_json::to_value(&tokens[1]).expect("serialize");
    assert_eq!(json["type"], "tag_open");
    assert_eq!(json["tag"], "foo");
    assert_eq!(json["map"], serde_json::json!([1, 2]));
    assert_eq!(json["attributes"][0]["type"], "plain");
    assert_eq!(json["attributes"][0]["value"], "asdf");
    assert_eq!(json["nesting"], 1);
}

// -----------------------------------------------------------
// Pluggable grammars.
// -----------------------------------------------------------

struct Failing;

impl TagGrammar for Failing {
    fn parse(&self, _input: &str, _context: &GrammarContext) -> Result<TagDescriptor, GrammarError> {
        Err(GrammarError::Other("grammar exploded".into()))
    }
}

#[test]
fn non_syntax_grammar_failure_is_fatal() {
    let err = tokenize_with("one\ntwo {% x %}", 0, &Failing).expect_err("should fail");
    assert_eq!(err.line, 2);
    assert_eq!(err.offset, 8);
    assert!(err.to_string().contains("grammar exploded"));
}

struct Uppercase;

impl TagGrammar for Uppercase {
    fn parse(&self, input: &str, _context: &GrammarContext) -> Result<TagDescriptor, GrammarError> {
        Ok(TagDescriptor::SelfClosing {
            name: input.to_uppercase(),
            attributes: vec![Attribute::plain("raw", Value::from(input))],
        })
    }
}

#[test]
fn custom_grammar_receives_trimmed_body() {
    let tokens = tokenize_with("{%   shout  %}", 0, &Uppercase).expect("tokenize");
    match &tokens[1].kind {
        TokenKind::Tag { tag, .. } => assert_eq!(tag, "SHOUT"),
        other => panic!("expected tag, got {other:?}"),
    }
}
