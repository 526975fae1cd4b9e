use std::io::{self, Read};

use clap::Parser;
use serde::Serialize;
use ylisp::{Mode, NativeKind, Runtime, RuntimeConfig, YlError};

/// Evaluate YLISP source and emit a JSON result.
#[derive(Parser, Debug)]
#[command(name = "ylisp-cli", about = "Evaluate YLISP source and emit a JSON result")]
struct Args {
    /// Read source from a file instead of stdin.
    #[arg(long)]
    file: Option<std::path::PathBuf>,

    /// Fixed cell pool capacity.
    #[arg(long, default_value_t = 65_536)]
    pool_capacity: usize,

    /// Maximum evaluator recursion depth.
    #[arg(long, default_value_t = 1000)]
    max_depth: usize,

    /// Percent pool occupancy that triggers a full mark-and-sweep.
    #[arg(long, default_value_t = 80)]
    gc_trigger_percent: u8,

    /// Abort the process on a fatal error instead of reporting it.
    #[arg(long)]
    batch: bool,
}

#[derive(Serialize)]
#[serde(tag = "status")]
enum Outcome {
    Ok { value: String },
    Err { error: YlError },
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let source = if let Some(path) = args.file {
        std::fs::read_to_string(&path).unwrap_or_else(|e| {
            eprintln!("error reading file: {e}");
            std::process::exit(1);
        })
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).unwrap_or_else(|e| {
            eprintln!("error reading stdin: {e}");
            std::process::exit(1);
        });
        buf
    };

    let config = RuntimeConfig {
        pool_capacity: args.pool_capacity,
        max_eval_depth: args.max_depth,
        gc_trigger_percent: args.gc_trigger_percent,
        mode: if args.batch { Mode::Batch } else { Mode::Repl },
        ..RuntimeConfig::default()
    };

    let runtime = Runtime::init(config).unwrap_or_else(|e| {
        eprintln!("failed to initialize runtime: {e:?}");
        std::process::exit(1);
    });

    register_demo_natives(&runtime).unwrap_or_else(|e| {
        eprintln!("failed to register native functions: {e:?}");
        std::process::exit(1);
    });

    let outcome = match runtime.interpret(&source) {
        Ok(value) => Outcome::Ok { value },
        Err(error) => Outcome::Err { error },
    };

    // Always exits 0; the outcome, success or failure, travels in the JSON.
    let json = serde_json::to_string(&outcome).expect("Outcome is always serializable");
    println!("{json}");
}

/// Registers the small set of arithmetic and demo natives used to exercise
/// this crate from the command line. A real embedding supplies its own
/// native-function library through the same [`Runtime::register_native`]
/// surface; these are not part of the library crate itself.
fn register_demo_natives(runtime: &Runtime) -> ylisp::YlResult<()> {
    use ylisp::Cell;

    fn as_double(cell: &Cell) -> ylisp::YlResult<f64> {
        match cell {
            Cell::Double(d) => Ok(*d),
            _ => Err(YlError::func_invalid_param("expected a number")),
        }
    }

    runtime.register_native(1, "add", 0, None, NativeKind::Ordinary, "sums its arguments", Box::new(|ctx| {
        let mut total = 0.0;
        for &a in ctx.args {
            total += as_double(ctx.pool.get(a))?;
        }
        ctx.pool.alloc_double(total)
    }))?;

    runtime.register_native(1, "sub", 1, None, NativeKind::Ordinary, "subtracts the rest from the first", Box::new(|ctx| {
        let mut acc = as_double(ctx.pool.get(ctx.args[0]))?;
        for &a in &ctx.args[1..] {
            acc -= as_double(ctx.pool.get(a))?;
        }
        ctx.pool.alloc_double(acc)
    }))?;

    runtime.register_native(1, "mul", 0, None, NativeKind::Ordinary, "multiplies its arguments", Box::new(|ctx| {
        let mut total = 1.0;
        for &a in ctx.args {
            total *= as_double(ctx.pool.get(a))?;
        }
        ctx.pool.alloc_double(total)
    }))?;

    runtime.register_native(1, "div", 2, Some(2), NativeKind::Ordinary, "divides two numbers", Box::new(|ctx| {
        let a = as_double(ctx.pool.get(ctx.args[0]))?;
        let b = as_double(ctx.pool.get(ctx.args[1]))?;
        if b == 0.0 {
            return Err(YlError::func_invalid_param("division by zero"));
        }
        ctx.pool.alloc_double(a / b)
    }))?;

    runtime.register_native(1, "eq", 2, Some(2), NativeKind::Ordinary, "numeric equality", Box::new(|ctx| {
        let a = as_double(ctx.pool.get(ctx.args[0]))?;
        let b = as_double(ctx.pool.get(ctx.args[1]))?;
        Ok(if a == b { ylisp::CellRef::True } else { ylisp::CellRef::Nil })
    }))?;

    runtime.register_native(1, "sleep", 1, Some(1), NativeKind::Ordinary, "sleeps for N milliseconds, checkpointing throughout", Box::new(|ctx| {
        let millis = as_double(ctx.pool.get(ctx.args[0]))? as u64;
        let step = std::time::Duration::from_millis(10);
        let mut remaining = std::time::Duration::from_millis(millis);
        while remaining > std::time::Duration::ZERO {
            let slice = step.min(remaining);
            std::thread::sleep(slice);
            remaining -= slice;
            ctx.context.checkpoint()?;
        }
        Ok(ylisp::CellRef::Nil)
    }))?;

    Ok(())
}
