//! Runtime autodetection and PATH overlay for stdio transports (spec.md §4.1).
//!
//! Some MCP servers are published as a bare script (`server.py`, `index.js`)
//! rather than a self-executing binary. NCP maps a handful of well-known
//! extensions to the interpreter that should run them, and falls back to
//! `which` to resolve the interpreter against the user's PATH the same way a
//! shell would.

use std::ffi::OsString;

/// Resolves `command` (and an extra leading arg, if an interpreter had to be
/// inserted) against the well-known runtime table, then against PATH.
///
/// Returns `(program, prefix_args)`: `prefix_args` is empty unless an
/// interpreter was inserted ahead of `command`.
pub fn resolve_stdio_command(command: &str) -> (OsString, Vec<OsString>) {
    if let Some(interpreter) = interpreter_for(command) {
        if let Ok(resolved) = which::which(interpreter) {
            return (resolved.into_os_string(), vec![OsString::from(command)]);
        }
        return (OsString::from(interpreter), vec![OsString::from(command)]);
    }

    match which::which(command) {
        Ok(resolved) => (resolved.into_os_string(), Vec::new()),
        Err(_) => (OsString::from(command), Vec::new()),
    }
}

fn interpreter_for(command: &str) -> Option<&'static str> {
    let ext = command.rsplit('.').next()?;
    match ext {
        "py" => Some("python3"),
        "js" | "mjs" | "cjs" => Some("node"),
        "ts" => Some("tsx"),
        "rb" => Some("ruby"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn leaves_extensionless_commands_untouched() {
        let (program, prefix) = resolve_stdio_command("npx");
        assert!(prefix.is_empty());
        assert!(!program.is_empty());
    }

    #[test]
    fn inserts_interpreter_for_python_scripts() {
        let (_program, prefix) = resolve_stdio_command("server.py");
        assert_eq!(prefix, vec![OsString::from("server.py")]);
    }
}
