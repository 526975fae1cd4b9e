//! End-to-end scenarios against the public `Runtime` surface: the concrete
//! scenarios and boundary behaviors this crate's design notes enumerate.

use std::sync::Arc;
use std::time::Duration;

use ylisp::{Cell, CellRef, NativeKind, Runtime, RuntimeConfig, YlError};

fn demo_runtime() -> Runtime {
    let runtime = Runtime::init(RuntimeConfig {
        pool_capacity: 4096,
        ..RuntimeConfig::default()
    })
    .expect("runtime init");
    register_demo_natives(&runtime);
    runtime
}

fn as_double(cell: &Cell) -> ylisp::YlResult<f64> {
    match cell {
        Cell::Double(d) => Ok(*d),
        _ => Err(YlError::func_invalid_param("expected a number")),
    }
}

fn register_demo_natives(runtime: &Runtime) {
    runtime
        .register_native(1, "add", 0, None, NativeKind::Ordinary, "sums its arguments", Box::new(|ctx| {
            let mut total = 0.0;
            for &a in ctx.args {
                total += as_double(ctx.pool.get(a))?;
            }
            ctx.pool.alloc_double(total)
        }))
        .unwrap();

    runtime
        .register_native(1, "mul", 0, None, NativeKind::Ordinary, "multiplies its arguments", Box::new(|ctx| {
            let mut total = 1.0;
            for &a in ctx.args {
                total *= as_double(ctx.pool.get(a))?;
            }
            ctx.pool.alloc_double(total)
        }))
        .unwrap();

    runtime
        .register_native(1, "eq", 2, Some(2), NativeKind::Ordinary, "numeric equality", Box::new(|ctx| {
            let a = as_double(ctx.pool.get(ctx.args[0]))?;
            let b = as_double(ctx.pool.get(ctx.args[1]))?;
            Ok(if a == b { CellRef::True } else { CellRef::Nil })
        }))
        .unwrap();

    runtime
        .register_native(1, "sleep", 1, Some(1), NativeKind::Ordinary, "sleeps N milliseconds, checkpointing throughout", Box::new(|ctx| {
            let millis = as_double(ctx.pool.get(ctx.args[0]))? as u64;
            let step = Duration::from_millis(5);
            let mut remaining = Duration::from_millis(millis);
            while remaining > Duration::ZERO {
                let slice = step.min(remaining);
                std::thread::sleep(slice);
                remaining -= slice;
                ctx.context.checkpoint()?;
            }
            Ok(CellRef::Nil)
        }))
        .unwrap();
}

#[test]
fn scenario_arithmetic() {
    let rt = demo_runtime();
    assert_eq!(rt.interpret("(add 1 2 3)").unwrap(), "6.000000");
}

#[test]
fn scenario_quoting() {
    let rt = demo_runtime();
    assert_eq!(rt.interpret("'(a b c)").unwrap(), "(a b c)");
}

#[test]
fn scenario_lambda() {
    let rt = demo_runtime();
    assert_eq!(rt.interpret("((lambda (x y) (add x y)) 10 20)").unwrap(), "30.000000");
}

#[test]
fn scenario_macro_redefinition_changes_future_expansions() {
    let rt = demo_runtime();
    rt.interpret("(mset 'twice (mlambda (e) (add e e)))").unwrap();
    assert_eq!(rt.interpret("(twice 5)").unwrap(), "10.000000");
    rt.interpret("(mset 'twice (mlambda (e) (mul e e)))").unwrap();
    assert_eq!(rt.interpret("(twice 5)").unwrap(), "25.000000");
}

#[test]
fn scenario_lexical_shadowing_does_not_escape_the_lambda() {
    let rt = demo_runtime();
    rt.interpret("(set 'x 1)").unwrap();
    assert_eq!(rt.interpret("((lambda (x) x) 2)").unwrap(), "2.000000");
    assert_eq!(rt.interpret("x").unwrap(), "1.000000");
}

#[test]
fn scenario_completion_over_a_shared_prefix() {
    let rt = demo_runtime();
    rt.interpret("(set 'foo 1) (set 'foobar 2) (set 'foobaz 3)").unwrap();
    assert_eq!(
        rt.complete(b"foob"),
        ylisp::CompletionResult::Extended(b"a".to_vec())
    );
    assert_eq!(rt.complete(b"fooba"), ylisp::CompletionResult::Branch);
    assert_eq!(rt.candidates(b"foob"), vec!["foobar", "foobaz"]);
}

#[test]
fn scenario_cancellation_kills_a_busy_loop_within_one_safe_point() {
    let rt = Arc::new(demo_runtime());
    let worker = Arc::clone(&rt);
    let (id, join) = worker.interpret_async("(while (eq 1 1) (sleep 1))".to_string());

    // Give the loop a chance to enter its sleep-induced safe point before
    // asking it to stop.
    std::thread::sleep(Duration::from_millis(20));

    let caller = rt.interpret_async("nil".to_string()).0;
    rt.kill(caller, id).unwrap();

    let result = join.join().expect("worker thread panicked");
    assert!(matches!(result, Err(YlError::Killed)));
    assert!(rt.live_contexts().is_empty() || !rt.live_contexts().contains(&id));
}

#[test]
fn boundary_empty_stream_evaluates_nothing() {
    let rt = demo_runtime();
    assert_eq!(rt.interpret("").unwrap(), "nil");
}

#[test]
fn boundary_whitespace_and_comments_only() {
    let rt = demo_runtime();
    assert_eq!(rt.interpret("  \n ; nothing here\n").unwrap(), "nil");
}

#[test]
fn boundary_unmatched_close_paren_is_syntax_paren() {
    let rt = demo_runtime();
    let err = rt.interpret(")").unwrap_err();
    assert!(matches!(err, YlError::SyntaxParen { .. }));
}

#[test]
fn boundary_cond_with_no_true_clause_is_nil() {
    let rt = demo_runtime();
    assert_eq!(rt.interpret("(cond)").unwrap(), "nil");
}

#[test]
fn boundary_empty_and_or_argument_lists_are_rejected() {
    let rt = demo_runtime();
    assert!(matches!(rt.interpret("(and)").unwrap_err(), YlError::FuncInvalidParam { .. }));
    assert!(matches!(rt.interpret("(or)").unwrap_err(), YlError::FuncInvalidParam { .. }));
}

#[test]
fn boundary_unset_then_lookup_fails_undefined() {
    let rt = demo_runtime();
    rt.interpret("(set 'y 1)").unwrap();
    rt.interpret("(unset 'y)").unwrap();
    assert!(matches!(rt.interpret("y").unwrap_err(), YlError::EvalUndefined { .. }));
}
