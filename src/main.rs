//! CLI tool to inspect directives in tag-annotated documents.

use std::fs;
use std::io;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        eprintln!("Usage: doctags <command> [files...]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  tokens  Print the token stream of each file as JSON");
        eprintln!("  check   Report directive errors and unbalanced tags");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  doctags tokens page.md");
        eprintln!("  RUST_LOG=debug doctags check docs/*.md");
        return ExitCode::from(2);
    }

    let command = args[1].as_str();
    let files = &args[2..];

    if !matches!(command, "tokens" | "check") {
        eprintln!("Unknown command: {command}");
        return ExitCode::from(2);
    }

    if files.is_empty() {
        eprintln!("Error: no files specified");
        return ExitCode::from(2);
    }

    let mut had_error = false;

    for path in files {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{path}: {e}");
                had_error = true;
                continue;
            }
        };

        let ok = if command == "tokens" {
            print_tokens(path, &content)
        } else {
            check(path, &content)
        };
        had_error |= !ok;
    }

    if had_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_tokens(path: &str, content: &str) -> bool {
    let tokens = match doctags::tokenize(content) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{path}: {e}");
            return false;
        }
    };
    match serde_json::to_string_pretty(&tokens) {
        Ok(json) => {
            println!("{json}");
            true
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            false
        }
    }
}

fn check(path: &str, content: &str) -> bool {
    let ast = match doctags::parse_str(content) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("{path}: {e}");
            return false;
        }
    };

    let mut errors = 0usize;
    for node in ast.root().walk() {
        for error in &node.errors {
            errors += 1;
            match error.location {
                Some(loc) => eprintln!(
                    "{path}:{}:{}: {}",
                    loc.start.line, loc.start.character, error.message
                ),
                None => eprintln!("{path}: {}", error.message),
            }
        }
    }

    if errors == 0 {
        let nodes = ast.tree().len();
        eprintln!("{path}: valid ({nodes} node(s))");
        true
    } else {
        false
    }
}
