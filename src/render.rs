//! Output renderers.
//!
//! Each renderer builds the complete output in memory and only returns it
//! once every entry has been rendered, so a failure never leaves half a list
//! of variables on stdout.

use crate::error::{ExtractError, Result};
use crate::model::{Value, VariableSet};
use crate::provider::RawToolOutput;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::warn;

/// Presentation selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderFormat {
    /// `key: "value"` lines
    #[default]
    Structured,
    /// `export KEY="value"` lines
    EnvExport,
    /// Raw tool output
    Debug,
}

impl RenderFormat {
    /// Pick the format from the `--debug` / `--env` flags.
    ///
    /// `--debug` wins when both are given.
    pub fn from_flags(debug: bool, env: bool) -> Self {
        match (debug, env) {
            (true, true) => {
                warn!("--debug and --env both given, using --debug");
                RenderFormat::Debug
            }
            (true, false) => RenderFormat::Debug,
            (false, true) => RenderFormat::EnvExport,
            (false, false) => RenderFormat::Structured,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RenderFormat::Structured => "structured",
            RenderFormat::EnvExport => "env",
            RenderFormat::Debug => "debug",
        }
    }
}

/// One `key: value` line per variable.
///
/// Strings are double-quoted with JSON escaping, which YAML also reads.
/// Keys outside `[A-Za-z0-9_.-]` are quoted the same way so every line
/// splits back into one key and one value.
pub fn render_structured(variables: &VariableSet) -> String {
    let mut out = String::new();
    for entry in variables {
        let rendered = match &entry.value {
            Value::String(s) => quote_json(s),
            other => other.to_string(),
        };
        let _ = writeln!(out, "{}: {}", structured_key(&entry.key), rendered);
    }
    out
}

fn structured_key(key: &str) -> Cow<'_, str> {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if plain {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(quote_json(key))
    }
}

/// One `export KEY=value` line per variable, safe to `eval` or `source`.
///
/// Lists have no unambiguous environment form and fail the whole render.
pub fn render_env(variables: &VariableSet) -> Result<String> {
    let mut out = String::new();
    let mut seen: HashMap<String, &str> = HashMap::new();

    for entry in variables {
        let name = env_name(&entry.key);
        if let Some(previous) = seen.insert(name.clone(), &entry.key) {
            warn!(
                name = %name,
                first = previous,
                second = %entry.key,
                "two keys map to the same environment variable, the last one wins"
            );
        }

        let rendered = match &entry.value {
            Value::String(s) => shell_quote(s),
            Value::Null => String::new(),
            Value::Bool(_) | Value::Integer(_) | Value::BigInt(_) | Value::Float(_) => {
                entry.value.to_string()
            }
            Value::Sequence(_) => {
                return Err(ExtractError::UnsupportedValueType {
                    key: entry.key.clone(),
                    kind: entry.value.kind(),
                    format: RenderFormat::EnvExport.name(),
                })
            }
        };
        let _ = writeln!(out, "export {}={}", name, rendered);
    }

    Ok(out)
}

/// Raw tool stdout, plus a commented notice when the tool wrote to stderr.
pub fn render_debug(raw: &RawToolOutput) -> String {
    let mut out = raw.stdout.clone();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }

    let stderr = raw.stderr.trim_end();
    if !stderr.is_empty() {
        out.push_str("# tool stderr:\n");
        for line in stderr.lines() {
            let _ = writeln!(out, "# {}", line);
        }
    }
    out
}

/// Environment variable name for a flattened key.
///
/// Upper-cases the key and collapses every run of non-alphanumeric
/// characters into one underscore. A leading digit gets an underscore prefix.
/// A key with no ASCII letter or digit at all becomes `VAR_`, since a bare
/// `_` is overwritten by the shell after every command.
pub fn env_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    let mut in_run = false;

    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
            in_run = false;
        } else if !in_run {
            name.push('_');
            in_run = true;
        }
    }

    if !name.bytes().any(|b| b.is_ascii_alphanumeric()) {
        warn!(key = %key, "key has no ASCII letters or digits, exporting it as VAR_");
        return "VAR_".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Double-quote a value for POSIX shells.
///
/// Inside double quotes only `\`, `"`, `$` and `` ` `` are special.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn quote_json(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
