use std::io::{self, IsTerminal};

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use iota::eval::Interp;
use iota::stream::Stream;

/// The standard library, loaded unless `--bootstrap` or `--no-bootstrap`
/// says otherwise.
const BUILTIN_BOOTSTRAP: &str = include_str!("../bootstrap.l");

const DEFAULT_HEAP_SIZE: usize = 1_000_000;

/// Stack of the evaluation thread. Deeper recursion continues on segments
/// the evaluator allocates as it goes.
const STACK_SIZE: usize = 64 * 1024 * 1024;
const MAX_DEPTH: usize = 50_000;

#[derive(Parser)]
#[command(name = "iota", about = "iota: a small Lisp with a mark-sweep heap")]
struct Cli {
    /// Source files to evaluate, in order, after the bootstrap library
    files: Vec<String>,

    /// Evaluate an expression, print its value and exit
    #[arg(short, long)]
    eval: Option<String>,

    /// Heap capacity in cells
    #[arg(long, default_value_t = DEFAULT_HEAP_SIZE)]
    heap_size: usize,

    /// Load this library file instead of the built-in bootstrap
    #[arg(long, conflicts_with = "no_bootstrap")]
    bootstrap: Option<String>,

    /// Start without any library
    #[arg(long)]
    no_bootstrap: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().filter_or("IOTA_LOG", "warn")).init();

    let worker = std::thread::Builder::new()
        .name("iota".into())
        .stack_size(STACK_SIZE)
        .spawn(move || run(cli));

    let code = match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            eprintln!("Error: interpreter thread panicked");
            101
        }
        Err(e) => {
            eprintln!("Error: cannot start interpreter thread: {e}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> i32 {
    let mut interp = match Interp::new(cli.heap_size) {
        Ok(interp) => interp,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };
    interp.max_depth = MAX_DEPTH;

    if !cli.no_bootstrap {
        let loaded = match &cli.bootstrap {
            Some(path) => interp.load_file(path).map(|_| ()),
            None => {
                log::info!("loading built-in bootstrap library");
                interp.eval_str(BUILTIN_BOOTSTRAP).map(|_| ())
            }
        };
        if let Err(e) = loaded {
            eprintln!("Error in bootstrap: {e}");
            return 1;
        }
    }

    for file in &cli.files {
        if let Err(e) = interp.load_file(file) {
            eprintln!("Error in {file}: {e}");
            return 1;
        }
    }

    if let Some(expr) = &cli.eval {
        return match interp.eval_str(expr) {
            Ok(val) => {
                println!("{}", interp.print(val));
                0
            }
            Err(e) => {
                eprintln!("Error: {e}");
                1
            }
        };
    }

    if !cli.files.is_empty() {
        return 0;
    }

    if io::stdin().is_terminal() {
        run_interactive(&mut interp)
    } else {
        run_piped(&mut interp)
    }
}

/// Interactive REPL: accumulate lines until parens are balanced.
fn run_interactive(interp: &mut Interp) -> i32 {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error: cannot start line editor: {e}");
            return 1;
        }
    };

    println!(
        "iota ({} of {} cells free). Ctrl-D to exit.",
        interp.heap.free_count(),
        interp.heap.capacity()
    );

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "=> " } else { "   " };
        match rl.readline(prompt) {
            Ok(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
                if paren_depth(&buffer) > 0 {
                    continue;
                }

                let input = std::mem::take(&mut buffer);
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);
                eval_and_print(interp, input);
            }
            Err(ReadlineError::Interrupted) => {
                if buffer.is_empty() {
                    break;
                }
                buffer.clear();
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        }
    }
    0
}

/// Piped mode: read forms one at a time from the `*stdin*` stream object.
fn run_piped(interp: &mut Interp) -> i32 {
    let stdin = interp.stdin;
    loop {
        let form = match interp.read(stdin) {
            Ok(form) if form == interp.eof => return 0,
            Ok(form) => form,
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        };
        match interp.eval(form, interp.global_env) {
            Ok(val) => println!("{}", interp.print(val)),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}

/// Evaluate every form in `input`, printing each value or error.
fn eval_and_print(interp: &mut Interp, input: &str) {
    let stream = match interp.heap.make_stream(Stream::from_bytes(input)) {
        Ok(stream) => interp.heap.root(stream),
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };
    loop {
        match interp.read(stream.get()) {
            Ok(form) if form == interp.eof => break,
            Ok(form) => match interp.eval(form, interp.global_env) {
                Ok(val) => println!("{}", interp.print(val)),
                Err(e) => eprintln!("Error: {e}"),
            },
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }
}

/// Open-paren balance of `input`, ignoring strings, comments and
/// character literals.
fn paren_depth(input: &str) -> i32 {
    let mut depth = 0;
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            '#' => {
                if chars.next() == Some('\\') {
                    chars.next();
                }
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    depth
}
