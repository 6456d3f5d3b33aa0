//! Every semantic diagnostic has at least one input that provokes it.

use sinc::compile_to_asm;

fn error_for(source: &str) -> String {
    compile_to_asm(source)
        .expect_err("expected a compile error")
        .to_string()
}

#[test]
fn undefined_symbol() {
    let message = error_for("let x = 1;");
    assert!(message.contains("could not find 'x' in symbol table"));
}

#[test]
fn duplicate_symbol_in_same_scope() {
    let message = error_for("alloc int x;\nalloc int x;");
    assert!(message.contains("'x' already in symbol table"));
}

#[test]
fn incompatible_types_in_assignment() {
    let message = error_for("alloc int x;\nalloc string s: \"hi\";\nlet x = s;");
    assert!(message.contains("cannot match 'int' and 'string'"));
}

#[test]
fn incompatible_types_in_binary_expression() {
    let message = error_for("alloc int x: 1;\nalloc string s: \"hi\";\nalloc int y: x + s;");
    assert!(message.contains("types in binary expression do not match"));
}

#[test]
fn const_requires_initialization() {
    let message = error_for("alloc const int x;");
    assert!(message.contains("must be initialized in allocation"));
}

#[test]
fn const_assignment_rejected() {
    let message = error_for("alloc const int x: 1;\nlet x = 2;");
    assert!(message.contains("const-qualified"));
}

#[test]
fn const_pointer_initializer_rejected() {
    let message = error_for("alloc int v: 1;\nalloc const int c: $v;");
    assert!(message.contains("pointers or addresses"));
}

#[test]
fn dereferencing_a_non_pointer() {
    let message = error_for("alloc int x: 1;\nlet *x = 2;");
    assert!(message.contains("whose type is not ptr<...>"));
}

#[test]
fn indexing_a_non_indexable_type() {
    let message = error_for("alloc int x: 1;\nlet x[0] = 2;");
    assert!(message.contains("cannot index variables of this type"));
}

#[test]
fn string_index_assignment_forbidden() {
    let message = error_for("alloc string s: \"hi\";\nlet s[0] = \"x\";");
    assert!(message.contains("index assignment on strings is forbidden"));
}

#[test]
fn dynamic_memory_use_after_free() {
    let message = error_for("alloc dynamic int x: 5;\nfree x;\nfree x;");
    assert!(message.contains("already been freed"));
}

#[test]
fn wrong_argument_count() {
    let message =
        error_for("def int add(alloc int a, alloc int b) { return a + b; }\n@add(1, 2, 3);");
    assert!(message.contains("too many arguments"));
}

#[test]
fn missing_argument_without_default() {
    let message =
        error_for("def int add(alloc int a, alloc int b) { return a + b; }\n@add(1);");
    assert!(message.contains("not enough arguments"));
}

#[test]
fn default_parameters_must_be_trailing() {
    let message = error_for("def int f(alloc int a: 1, alloc int b) { return b; }");
    assert!(message.contains("default arguments must be declared last"));
}

#[test]
fn return_outside_function() {
    let message = error_for("return 1;");
    assert!(message.contains("outside of a function"));
}

#[test]
fn call_of_unknown_function() {
    let message = error_for("@missing(1);");
    assert!(message.contains("cannot locate function"));
}

#[test]
fn argument_type_mismatch() {
    let message = error_for(
        "def int f(alloc int a) { return a; }\nalloc string s: \"x\";\nalloc int r: @f(s);",
    );
    assert!(message.contains("does not match the type of the formal parameter"));
}

#[test]
fn definition_inside_function_rejected() {
    let message =
        error_for("def void outer() { def void inner() { pass; } return; }");
    assert!(message.contains("must be in the global scope"));
}

#[test]
fn array_initializer_length_mismatch() {
    let message = error_for("alloc array<3, int> a: { 1, 2 };");
    assert!(message.contains("expected 3"));
}

#[test]
fn array_initializer_must_be_a_list() {
    let message = error_for("alloc array<3, int> a: 1;");
    assert!(message.contains("initializer list"));
}

#[test]
fn parser_unexpected_end_of_file() {
    let message = compile_to_asm("alloc int x")
        .expect_err("expected a parse error")
        .to_string();
    assert!(message.contains("expected"));
}
