// Exit code interpretation (pluggable per platform / external tool)

use std::collections::HashMap;
use tracing::warn;

/// Maps a process return code to an extra human-readable hint
pub trait ExitCodeInterpreter: Send + Sync {
    fn hint(&self, code: i32) -> Option<String>;
}

/// Interpreter that never adds a hint
pub struct NoExitCodeHints;

impl ExitCodeInterpreter for NoExitCodeHints {
    fn hint(&self, _code: i32) -> Option<String> {
        None
    }
}

/// Table-driven interpreter, built from `bus.exit_code_hints`
#[derive(Debug, Clone, Default)]
pub struct ExitCodeHintTable {
    hints: HashMap<i32, String>,
}

impl ExitCodeHintTable {
    /// Build from string keys as they appear in configuration.
    ///
    /// Keys may be signed (`-21`) or the unsigned 32-bit form some tools
    /// report (`4294967275`); both normalise to the same code.
    pub fn from_config(raw: &HashMap<String, String>) -> Self {
        let mut hints = HashMap::new();
        for (key, hint) in raw {
            match key.trim().parse::<i64>().ok().and_then(normalize_exit_code) {
                Some(code) => {
                    hints.insert(code, hint.clone());
                }
                None => warn!(key = %key, "Ignoring exit code hint with invalid code"),
            }
        }
        Self { hints }
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

impl ExitCodeInterpreter for ExitCodeHintTable {
    fn hint(&self, code: i32) -> Option<String> {
        self.hints.get(&code).cloned()
    }
}

/// Fold a raw return code into the signed 32-bit range.
///
/// Values in `i32` range pass through; values in `(i32::MAX, u32::MAX]`
/// are reinterpreted as two's complement. Anything else is rejected.
pub fn normalize_exit_code(raw: i64) -> Option<i32> {
    if let Ok(code) = i32::try_from(raw) {
        return Some(code);
    }
    u32::try_from(raw).ok().map(|unsigned| unsigned as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unsigned_return_code() {
        assert_eq!(normalize_exit_code(4_294_967_275), Some(-21));
        assert_eq!(normalize_exit_code(-21), Some(-21));
        assert_eq!(normalize_exit_code(1), Some(1));
        assert_eq!(normalize_exit_code(1 << 40), None);
    }

    #[test]
    fn test_table_lookup_uses_normalised_code() {
        let mut raw = HashMap::new();
        raw.insert("4294967275".to_string(), "needs different parameters".to_string());
        raw.insert("abc".to_string(), "ignored".to_string());

        let table = ExitCodeHintTable::from_config(&raw);
        assert_eq!(table.len(), 1);
        assert_eq!(table.hint(-21).as_deref(), Some("needs different parameters"));
        assert_eq!(table.hint(1), None);
        assert_eq!(NoExitCodeHints.hint(-21), None);
    }
}
