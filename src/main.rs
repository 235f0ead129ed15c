// ABOUTME: CLI driver over the lunite library: run/build/clean/version + REPL

use clap::{Parser as ClapParser, Subcommand};
use lunite::{config, Interpreter};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(name = "lunite", version = config::VERSION, about = config::WELCOME_SUBTITLE)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Lunite script file.
    Run { file: PathBuf },
    /// Package a script into a standalone artifact (out of scope, stub only).
    Build { file: PathBuf },
    /// Remove a build output directory, if present.
    Clean,
    /// Print the interpreter version.
    Version,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match args.command {
        Some(Command::Run { file }) => run_file(&file),
        Some(Command::Build { file }) => build_stub(&file),
        Some(Command::Clean) => clean(),
        Some(Command::Version) => {
            println!("lunite {}", config::VERSION);
            ExitCode::SUCCESS
        }
        None => repl(),
    }
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot read '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let file = path.to_string_lossy().into_owned();
    let interp = Interpreter::new();
    match interp.run_source(&source, &file) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_stub(file: &PathBuf) -> ExitCode {
    eprintln!(
        "lunite build: '{}' not packaged -- building a standalone artifact is a file-copy \
         plus external-tool step outside this interpreter's scope",
        file.display()
    );
    ExitCode::FAILURE
}

fn clean() -> ExitCode {
    let dir = PathBuf::from("build");
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            eprintln!("lunite clean: {}", e);
            return ExitCode::FAILURE;
        }
        println!("removed {}", dir.display());
    } else {
        println!("nothing to clean");
    }
    ExitCode::SUCCESS
}

fn repl() -> ExitCode {
    println!("{} v{}", config::WELCOME_MESSAGE, config::VERSION);
    println!("{}", config::WELCOME_SUBTITLE);

    let interp = Interpreter::new();
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("failed to start line editor: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let history_path = history_path();
    if let Some(path) = &history_path {
        let _ = editor.load_history(path);
    }

    let mut statement_count = 0usize;
    loop {
        match read_statement(&mut editor) {
            Ok(Some(source)) => {
                if source.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(source.as_str());
                statement_count += 1;
                let label = format!("<repl:{}>", statement_count);
                match interp.run_source(&source, &label) {
                    Ok(value) => {
                        if !matches!(value, lunite::Value::Null) {
                            println!("{}", value);
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = editor.save_history(path);
    }
    ExitCode::SUCCESS
}

/// Reads one top-level statement from the REPL, accumulating lines until `{`
/// `}` braces balance, mirroring the base crate's balanced-delimiter
/// `find_expr_end` but tracking curly braces instead of parens.
fn read_statement(editor: &mut DefaultEditor) -> Result<Option<String>, ReadlineError> {
    let mut buffer = String::new();
    let mut depth: i64 = 0;

    loop {
        let prompt = if depth == 0 { ">> " } else { ".. " };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => return Ok(Some(String::new())),
            Err(ReadlineError::Eof) => return Ok(None),
            Err(e) => return Err(e),
        };

        if depth == 0 && buffer.is_empty() {
            let trimmed = line.trim();
            if trimmed == "exit" || trimmed == "quit" {
                return Ok(None);
            }
            if trimmed == "help" {
                println!("{}", config::HELP_TEXT);
                return Ok(Some(String::new()));
            }
        }

        depth += brace_delta(&line);
        buffer.push_str(&line);
        buffer.push('\n');

        if depth <= 0 {
            return Ok(Some(buffer));
        }
    }
}

/// Counts `{`/`}` outside of string literals and line comments, so braces
/// embedded in either don't desynchronize the REPL's depth tracker.
fn brace_delta(line: &str) -> i64 {
    let mut delta = 0i64;
    let mut in_string: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match in_string {
            Some(quote) => {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    in_string = None;
                }
            }
            None => match c {
                '"' | '\'' => in_string = Some(c),
                '~' if chars.peek() == Some(&'~') => break,
                '{' => delta += 1,
                '}' => delta -= 1,
                _ => {}
            },
        }
    }
    delta
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".lunite_history"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brace_delta_balances_simple_block() {
        assert_eq!(brace_delta("if x > 1 {"), 1);
        assert_eq!(brace_delta("}"), -1);
    }

    #[test]
    fn brace_delta_ignores_braces_in_strings() {
        assert_eq!(brace_delta(r#"out("{not a block}");"#), 0);
    }

    #[test]
    fn brace_delta_ignores_comments() {
        assert_eq!(brace_delta("x = 1; ~~ a { comment"), 0);
    }
}
