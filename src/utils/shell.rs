//! Shell escaping and quoting utilities.

use std::path::Path;

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    // Characters that require quoting
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote and join multiple arguments into one command line.
///
/// The result is what a POSIX shell parses back into exactly `args`.
pub fn quote_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build `wrapper... <command>` where the command becomes a single argument,
/// e.g. `sh -l -c 'cd /data && ls'`.
pub fn wrap_command<S: AsRef<str>>(wrapper: &[S], command: &str) -> String {
    let mut args: Vec<&str> = wrapper.iter().map(|w| w.as_ref()).collect();
    args.push(command);
    quote_args(&args)
}

/// Quote a filesystem path only when the shell needs it.
pub fn quote_path_arg(path: &Path) -> String {
    quote_arg(&path.to_string_lossy())
}
