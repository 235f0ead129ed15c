// ABOUTME: Configuration and constants for the Lunite interpreter

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const WELCOME_MESSAGE: &str = "LUNITE";
pub const WELCOME_SUBTITLE: &str = "A small C-braced scripting language, interpreted in Rust";

/// Maximum nested user-function/method/lambda call depth. The evaluator is a
/// plain recursive tree-walk (no tail-call optimization, per spec), so a
/// runaway recursive program must fail with a located `Function` error
/// instead of overflowing the native stack.
pub const MAX_CALL_DEPTH: usize = 512;

/// Default extension appended to a Lunite import path when absent.
pub const MODULE_EXTENSION: &str = "luna";

pub const HELP_TEXT: &str = r#"
Lunite REPL

Enter a statement or expression. A trailing `{` opens a block that
continues across lines until braces balance.

Ctrl-D or an empty "exit" statement ends the session.
"#;
