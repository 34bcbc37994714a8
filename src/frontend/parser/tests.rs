use proptest::prelude::*;

use super::Parser;
use crate::frontend::ast::AstPrinter;

fn parse_and_print_expression(input: &str) -> String {
    let mut parser = Parser::new_for_tests(input);
    let expr = parser
        .parse_expr()
        .expect("expression parses")
        .expect("input is an expression");
    AstPrinter::new(parser.symbols(), parser.strings()).source_expr(&expr)
}

fn error_messages(input: &str) -> Vec<String> {
    let parser = Parser::new("test.usc", input);
    parser.errors().iter().map(|e| e.msg.clone()).collect()
}

fn parse_valid(input: &str) -> Parser<'_> {
    let parser = Parser::new("test.usc", input);
    assert!(
        parser.is_valid(),
        "unexpected errors: {:?}",
        parser.errors()
    );
    parser
}

// ---- expressions ----

#[test]
fn addition_is_left_associative() {
    assert_eq!(parse_and_print_expression("1 + 2 + 3"), "((1 + 2) + 3)");
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(parse_and_print_expression("1 + 2 * 3"), "(1 + (2 * 3))");
    assert_eq!(parse_and_print_expression("1 * 2 + 3"), "((1 * 2) + 3)");
}

#[test]
fn parentheses_override_precedence() {
    assert_eq!(parse_and_print_expression("(1 + 2) * 3"), "((1 + 2) * 3)");
}

#[test]
fn mixed_arithmetic_operations() {
    assert_eq!(
        parse_and_print_expression("1 + 2 * 3 - 4 / 5"),
        "((1 + (2 * 3)) - (4 / 5))"
    );
}

#[test]
fn comparison_binds_looser_than_arithmetic() {
    assert_eq!(parse_and_print_expression("1 + 2 < 3"), "((1 + 2) < 3)");
}

#[test]
fn logical_or_is_left_associative() {
    assert_eq!(
        parse_and_print_expression("1 && 2 || 3"),
        "((1 && 2) || 3)"
    );
}

#[test]
fn logical_and_chains_nest_right() {
    assert_eq!(
        parse_and_print_expression("1 && 2 && 3"),
        "(1 && (2 && 3))"
    );
}

#[test]
fn not_applies_to_a_factor() {
    assert_eq!(parse_and_print_expression("!5"), "!5");
    assert_eq!(parse_and_print_expression("!(1 + 2)"), "!(1 + 2)");
}

#[test]
fn char_constants_evaluate_to_their_byte() {
    assert_eq!(parse_and_print_expression("'A'"), "65");
    assert_eq!(parse_and_print_expression("'\\n'"), "10");
}

#[test]
fn constant_out_of_range_is_an_error() {
    let errors = error_messages("int main() { return 99999999999; }");
    assert!(
        errors.iter().any(|e| e.contains("Invalid constant")),
        "got {:?}",
        errors
    );
}

// ---- programs and the tree dump ----

#[test]
fn simple_program_tree_dump() {
    let parser = parse_valid("int main() { int x; x = 1 + 2; return x; }");
    let printer = AstPrinter::new(parser.symbols(), parser.strings());
    let dump = printer.dump(parser.root().expect("program parsed"));
    let expected = "\
Program:
---Function: int main
------CompoundStmt:
---------Decl: int x
---------AssignStmt: x
------------BinaryMath +:
---------------ConstantExpr: 1
---------------ConstantExpr: 2
---------ReturnStmt:
------------IdentExpr: x
";
    assert_eq!(dump, expected);
}

#[test]
fn implicit_conversions_are_inserted_on_char_reads() {
    let parser = parse_valid("int main() { char c; int i; c = 65; i = c + 1; return i; }");
    let printer = AstPrinter::new(parser.symbols(), parser.strings());
    let dump = printer.dump(parser.root().expect("program parsed"));
    assert!(dump.contains("ToIntExpr"), "got:\n{}", dump);
}

#[test]
fn trailing_semicolon_after_expression_statement_is_eaten_blindly() {
    // The expression-statement rule consumes the next token without
    // checking it, so a missing semicolon makes it swallow the `return`
    // keyword and the function is left without a return statement.
    let parser = Parser::new("test.usc", "int main() { 1 + 2 return 0; }");
    assert!(!parser.is_valid());
    assert!(parser
        .errors()
        .iter()
        .any(|e| e.msg.contains("non-void functions to end with a return")));
}

#[test]
fn function_calls_parse_as_expression_statements() {
    let parser = parse_valid("void f() { } int main() { f(); return 0; }");
    let printer = AstPrinter::new(parser.symbols(), parser.strings());
    let dump = printer.dump(parser.root().expect("program parsed"));
    assert!(dump.contains("FuncExpr: f"), "got:\n{}", dump);
}

#[test]
fn void_function_without_return_gets_a_synthetic_one() {
    let parser = parse_valid("void f() { int x; x = 1; }");
    let printer = AstPrinter::new(parser.symbols(), parser.strings());
    let dump = printer.dump(parser.root().expect("program parsed"));
    assert!(dump.contains("ReturnStmt: (empty)"), "got:\n{}", dump);
}

// ---- semantic errors ----

#[test]
fn semantic_errors_accumulate_in_order() {
    let errors = error_messages("int main() { int x; x = \"hi\"; y = 3; return; }");
    assert!(errors.len() >= 3, "got {:?}", errors);
    assert_eq!(errors[0], "Cannot assign an expression of type char[] to int");
    assert_eq!(errors[1], "Use of undeclared identifier 'y'");
    assert_eq!(errors[2], "Invalid empty return in non-void function");
}

#[test]
fn no_ast_errors_for_valid_program() {
    parse_valid(
        "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\n\
         int main() { return fib(10); }",
    );
}

#[test]
fn redeclaration_in_same_scope_is_an_error() {
    let errors = error_messages("int main() { int x; int x; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Invalid redeclaration of identifier 'x'")),
        "got {:?}",
        errors
    );
}

#[test]
fn shadowing_in_a_nested_scope_is_allowed() {
    parse_valid("int main() { int x; x = 1; { int x; x = 2; } return x; }");
}

#[test]
fn main_must_return_int_and_take_no_arguments() {
    let errors = error_messages("void main(int a) { }");
    assert!(
        errors.iter().any(|e| e.contains("'main' must return an int")),
        "got {:?}",
        errors
    );
    assert!(
        errors
            .iter()
            .any(|e| e.contains("'main' cannot take any arguments")),
        "got {:?}",
        errors
    );
}

#[test]
fn function_redeclaration_is_an_error() {
    let errors = error_messages("int f() { return 0; } int f() { return 1; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Invalid redeclaration of function 'f'")),
        "got {:?}",
        errors
    );
}

#[test]
fn int_array_requires_a_constant_size() {
    let errors = error_messages("int main() { int a[]; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Int arrays must have a defined constant size")),
        "got {:?}",
        errors
    );
}

#[test]
fn array_bounds_are_checked() {
    let errors = error_messages("int main() { int a[0]; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("min of 1 and a max of 65536")),
        "got {:?}",
        errors
    );
    let errors = error_messages("int main() { int a[65537]; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("min of 1 and a max of 65536")),
        "got {:?}",
        errors
    );
}

#[test]
fn char_array_takes_its_size_from_the_initializer() {
    let parser = parse_valid("int main() { char s[] = \"hi\"; return 0; }");
    let printer = AstPrinter::new(parser.symbols(), parser.strings());
    let dump = printer.dump(parser.root().expect("program parsed"));
    // "hi" plus the NUL terminator
    assert!(dump.contains("Decl: char[3] s"), "got:\n{}", dump);
}

#[test]
fn char_array_too_small_for_string_is_an_error() {
    let errors = error_messages("int main() { char s[2] = \"hi\"; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Declared array cannot fit string")),
        "got {:?}",
        errors
    );
}

#[test]
fn int_array_initializer_is_rejected() {
    let errors = error_messages("int main() { int a[4] = 1; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("does not allow assignment of int array declarations")),
        "got {:?}",
        errors
    );
}

#[test]
fn array_reassignment_is_rejected() {
    let errors =
        error_messages("int main() { char a[4]; char b[] = \"x\"; a = b; return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Reassignment of arrays is not allowed")),
        "got {:?}",
        errors
    );
}

#[test]
fn call_arity_is_checked() {
    let errors =
        error_messages("int f(int a, int b) { return a; } int main() { return f(1); }");
    assert!(
        errors.iter().any(|e| e.contains("requires 2 arguments")),
        "got {:?}",
        errors
    );

    let errors =
        error_messages("int f(int a) { return a; } int main() { return f(1, 2); }");
    assert!(
        errors.iter().any(|e| e.contains("takes only 1 arguments")),
        "got {:?}",
        errors
    );
}

#[test]
fn printf_first_argument_must_be_a_string() {
    let errors = error_messages("int main() { printf(3); return 0; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("The first parameter to printf must be a char[]")),
        "got {:?}",
        errors
    );
}

#[test]
fn printf_sets_the_need_printf_flag() {
    let parser = parse_valid("int main() { printf(\"hi\\n\"); return 0; }");
    assert!(parser.need_printf());
}

#[test]
fn missing_return_in_non_void_function() {
    let errors = error_messages("int main() { int x; x = 1; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("non-void functions to end with a return")),
        "got {:?}",
        errors
    );
}

#[test]
fn subscript_of_a_non_array_is_an_error() {
    let errors = error_messages("int main() { int x; x = 1; return x[0]; }");
    assert!(
        errors.iter().any(|e| e.contains("'x' is not an array")),
        "got {:?}",
        errors
    );
}

#[test]
fn call_of_a_non_function_is_an_error() {
    let errors = error_messages("int main() { int x; x = 1; return x(); }");
    assert!(
        errors.iter().any(|e| e.contains("'x' is not a function")),
        "got {:?}",
        errors
    );
}

#[test]
fn invalid_symbol_is_reported_and_skipped() {
    let errors = error_messages("int main() { int x; x = 1 # 2; return x; }");
    assert!(
        errors.iter().any(|e| e.contains("Invalid symbol: #")),
        "got {:?}",
        errors
    );
}

#[test]
fn binary_op_on_array_operand_is_an_error() {
    let errors = error_messages("int main() { char s[] = \"a\"; return 1 + s; }");
    assert!(
        errors
            .iter()
            .any(|e| e.contains("Cannot perform op between type int and char[]")),
        "got {:?}",
        errors
    );
}

#[test]
fn error_display_shows_line_and_caret() {
    let parser = Parser::new("bad.usc", "int main() {\n\tint x;\n\tx = y;\n\treturn x;\n}\n");
    assert!(!parser.is_valid());

    let mut out = Vec::new();
    parser.write_errors(&mut out).expect("writing errors");
    let text = String::from_utf8(out).expect("utf8");

    let mut lines = text.lines();
    let header = lines.next().expect("header line");
    assert!(
        header.starts_with("bad.usc:3:") && header.contains("error: Use of undeclared identifier 'y'"),
        "got {:?}",
        header
    );
    assert_eq!(lines.next(), Some("\tx = y;"));
    // Tabs in the source line are preserved so the caret aligns.
    let caret = lines.next().expect("caret line");
    assert!(caret.starts_with('\t') && caret.ends_with('^'), "got {:?}", caret);
}

// ---- parse/print/parse round-trips ----

fn roundtrip(source: &str) {
    let first = parse_valid(source);
    let printed = AstPrinter::new(first.symbols(), first.strings())
        .source_program(first.root().expect("program parsed"));

    let second = Parser::new("test.usc", &printed);
    assert!(
        second.is_valid(),
        "re-parse of {:?} failed: {:?}",
        printed,
        second.errors()
    );
    let reprinted = AstPrinter::new(second.symbols(), second.strings())
        .source_program(second.root().expect("program parsed"));
    assert_eq!(printed, reprinted);
}

#[test]
fn roundtrip_arithmetic_and_control_flow() {
    roundtrip(
        "int main() { int i; int s; i = 0; s = 0; \
         while (i < 10) { s = s + i; i = i + 1; } \
         if (s > 20) return s; else return 0; }",
    );
}

#[test]
fn roundtrip_arrays_and_strings() {
    roundtrip(
        "int sum(int v[], int n) { int i; int s; i = 0; s = 0; \
         while (i < n) { s = s + v[i]; i = i + 1; } return s; }\n\
         int main() { int a[4]; char s[] = \"hi\\n\"; a[0] = 1; \
         printf(s); return sum(&a[0], 4); }",
    );
}

#[test]
fn roundtrip_logicals_and_inc_dec() {
    roundtrip(
        "int main() { int a; int b; a = 1; b = 0; \
         if (a != 0 && b == 0 || !a) { b = ++a; } else { b = --a; } return b; }",
    );
}

proptest! {
    // Parsing the printed form of a parsed expression is a fixed point.
    #[test]
    fn expression_print_parse_roundtrip(source in arb_expr_source()) {
        let printed = parse_and_print_expression(&source);
        let reprinted = parse_and_print_expression(&printed);
        prop_assert_eq!(printed, reprinted);
    }
}

fn arb_expr_source() -> impl Strategy<Value = String> {
    let leaf = (0..1000i32).prop_map(|n| n.to_string());
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({} + {})", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({} - {})", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({} * {})", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({} < {})", a, b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({} && {})", a, b)),
            inner.prop_map(|a| format!("!({})", a)),
        ]
    })
}
