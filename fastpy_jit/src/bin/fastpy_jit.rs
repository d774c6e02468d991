//! Thin manual-testing harness for `fastpy_jit`.
//!
//! Compiles one function definition, specializes it against a comma-separated
//! list of example arguments, and prints the resolved monomorphic signature
//! and the call's result.
//!
//! Usage:
//!   fastpy-jit input.py -- 2,3
//!   fastpy-jit -e "def add(a, b):\n    return a + b\n" -- 2,3
//!
//! Not a production CLI (§6 of the governing design notes): array arguments
//! aren't expressible on the command line, so only integer and float
//! examples are supported here.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use fastpy_jit::{compile, FastpyError, HostValue};

struct Args {
    input_file: Option<String>,
    code: Option<String>,
    example_args: Option<String>,
    show_help: bool,
}

impl Args {
    fn parse() -> Self {
        let raw: Vec<String> = env::args().collect();
        let mut parsed = Args { input_file: None, code: None, example_args: None, show_help: false };
        let mut i = 1;
        while i < raw.len() {
            match raw[i].as_str() {
                "-h" | "--help" => parsed.show_help = true,
                "-e" | "--eval" => {
                    i += 1;
                    if i < raw.len() {
                        parsed.code = Some(raw[i].clone());
                    }
                }
                "--" => {
                    i += 1;
                    if i < raw.len() {
                        parsed.example_args = Some(raw[i].clone());
                    }
                }
                arg if !arg.starts_with('-') && parsed.input_file.is_none() && parsed.code.is_none() => {
                    parsed.input_file = Some(arg.to_string());
                }
                other => eprintln!("unknown option: {other}"),
            }
            i += 1;
        }
        parsed
    }
}

fn print_help() {
    println!(
        "fastpy-jit — compile and specialize one function, then run it once\n\n\
         USAGE:\n    \
         fastpy-jit <input.py> -- <args>\n    \
         fastpy-jit -e <source> -- <args>\n\n\
         OPTIONS:\n    \
         -h, --help     Show this help message\n    \
         -e, --eval     Compile a source string instead of a file\n    \
         --             Everything after this is a comma-separated list of\n                   \
         example arguments, each either an integer or a float literal\n\n\
         EXAMPLE:\n    \
         fastpy-jit -e \"def add(a, b):\\n    return a + b\\n\" -- 2,3"
    );
}

fn parse_example_arg(text: &str) -> Result<HostValue<'static>, String> {
    let text = text.trim();
    if text.contains('.') {
        text.parse::<f64>().map(HostValue::F64).map_err(|e| format!("`{text}` isn't a float: {e}"))
    } else {
        text.parse::<i64>().map(HostValue::I64).map_err(|e| format!("`{text}` isn't an integer: {e}"))
    }
}

fn main() {
    let args = Args::parse();
    if args.show_help {
        print_help();
        return;
    }

    let source = if let Some(code) = &args.code {
        code.replace("\\n", "\n")
    } else if let Some(file) = &args.input_file {
        if !Path::new(file).exists() {
            eprintln!("error: file '{file}' not found");
            process::exit(1);
        }
        fs::read_to_string(file).unwrap_or_else(|e| {
            eprintln!("error reading '{file}': {e}");
            process::exit(1);
        })
    } else {
        eprintln!("error: no input file or -e source provided");
        eprintln!("use --help for usage information");
        process::exit(1);
    };

    let example_args: Vec<HostValue> = match &args.example_args {
        Some(list) if !list.trim().is_empty() => {
            match list.split(',').map(parse_example_arg).collect::<Result<Vec<_>, _>>() {
                Ok(vs) => vs,
                Err(e) => {
                    eprintln!("error parsing example arguments: {e}");
                    process::exit(1);
                }
            }
        }
        _ => Vec::new(),
    };

    let specializable = match compile(&source) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("compile error: {}", render_error(&e));
            process::exit(1);
        }
    };

    match specializable.call(&example_args) {
        Ok(result) => {
            println!("function: {}", specializable.name());
            println!("arguments: {example_args:?}");
            println!("result: {result:?}");
        }
        Err(e) => {
            eprintln!("call error: {}", render_error(&e));
            process::exit(1);
        }
    }
}

fn render_error(e: &FastpyError) -> String {
    format!("{e}")
}
