//! End-to-end scenarios driving the interpreter the way an embedding host
//! would: source in, values and printed output out.

use std::cell::RefCell;
use std::rc::Rc;

use mote_core::{CellRef, Context};

/// A context whose printer appends into a shared buffer.
fn capture_ctx() -> (Context, Rc<RefCell<String>>) {
    let out = Rc::new(RefCell::new(String::new()));
    let sink = Rc::clone(&out);
    let ctx = Context::open(
        64 * 1024,
        4096,
        Box::new(move |s| sink.borrow_mut().push_str(s)),
    );
    (ctx, out)
}

fn run(source: &str) -> (Context, CellRef, String) {
    let (mut ctx, out) = capture_ctx();
    let env = ctx.make_env();
    ctx.persist(env);
    let v = ctx.run(Some(env), source);
    let printed = out.borrow().clone();
    (ctx, v, printed)
}

#[test]
fn test_addition_formats_as_a_plain_integer() {
    let (mut ctx, v, _) = run("(+ 1 2)");
    assert_eq!(ctx.format(v), "3");
}

#[test]
fn test_bind_then_square() {
    let (ctx, v, _) = run("(= x 10)(* x x)");
    assert_eq!(ctx.as_number(v), Some(100.0));
}

#[test]
fn test_list_append_grows_the_length() {
    let (ctx, v, _) = run("(= xs [1 2 3])(# xs 4)($ xs)");
    assert_eq!(ctx.as_number(v), Some(4.0));
}

#[test]
fn test_named_function_application() {
    let (ctx, v, _) = run("(= sq ' x (* x x))(sq 7)");
    assert_eq!(ctx.as_number(v), Some(49.0));
}

#[test]
fn test_counting_loop_prints_each_index() {
    let (_, _, printed) = run("(= i 0)(^ (< i 3) ((, i)(; )(= i (+ i 1))))");
    assert_eq!(printed, "0\n1\n2\n");
}

#[test]
fn test_conditional_selects_the_false_branch() {
    let (ctx, v, _) = run("(? (< 2 1) 100 200)");
    assert_eq!(ctx.as_number(v), Some(200.0));
}

#[test]
fn test_print_emits_formatted_values() {
    let (_, _, printed) = run("(, 1.5)(;)(, \"hi\")(;)(, ~)");
    assert_eq!(printed, "1.5\nhi\n<nil>");
}

#[test]
fn test_suppressed_branch_prints_nothing() {
    let (_, _, printed) = run("(? 0 ((, \"skipped\")(;)) (, \"taken\"))");
    assert_eq!(printed, "taken");
}

#[test]
fn test_foreach_prints_list_elements_in_order() {
    let (_, _, printed) = run("(% [\"a\" \"b\" \"c\"] s ((, s)(;)))");
    assert_eq!(printed, "a\nb\nc\n");
}

#[test]
fn test_list_reads_come_back_in_order() {
    let (ctx, v, _) = run("(= xs [10 20 30])(. xs 0)");
    assert_eq!(ctx.as_number(v), Some(10.0));
    let (ctx, v, _) = run("(= xs [10 20 30])(+ (. xs 1) (. xs 2))");
    assert_eq!(ctx.as_number(v), Some(50.0));
}

#[test]
fn test_block_env_survives_as_a_value() {
    let (ctx, v, _) = run("(= point {(= x 3)(= y 4)})(+ (. point x) (. point y))");
    assert_eq!(ctx.as_number(v), Some(7.0));
}

#[test]
fn test_state_persists_across_runs() {
    let (mut ctx, out) = capture_ctx();
    let env = ctx.make_env();
    ctx.persist(env);
    ctx.run(Some(env), "(= total 0)");
    ctx.run(Some(env), "(= total (+ total 5))");
    let v = ctx.run(Some(env), "total");
    assert_eq!(ctx.as_number(v), Some(5.0));
    assert!(out.borrow().is_empty());
}

#[test]
fn test_functions_defined_in_one_run_apply_in_the_next() {
    let (mut ctx, _) = capture_ctx();
    let env = ctx.make_env();
    ctx.persist(env);
    ctx.run(Some(env), "(= double ' n (* n 2))");
    let v = ctx.run(Some(env), "(double 21)");
    assert_eq!(ctx.as_number(v), Some(42.0));
}

#[test]
fn test_recursive_function() {
    let (ctx, v, _) = run("(= fac ' n (? (< n 2) 1 (* n (fac (- n 1)))))(fac 6)");
    assert_eq!(ctx.as_number(v), Some(720.0));
}
