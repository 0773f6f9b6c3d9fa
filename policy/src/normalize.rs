//! Action string normalization.
//!
//! Incoming actions and rule actions are folded to a canonical
//! `verb:noun` form before matching, so `"Read File"`, `"read-file"`,
//! `"read_file"`, `"readFile"`, and `"read:file"` all land on
//! `read:file`.

/// Normalize an action string to `verb:noun`.
///
/// Rules, in order:
/// 1. anything already containing `:` is only lowercased;
/// 2. a camelCase boundary (lowercase letter followed by uppercase)
///    becomes a word break;
/// 3. `-` and `_` become word breaks, everything is lowercased;
/// 4. one remaining token is returned as-is (`"read"` → `"read"`, kept
///    single so the verb-fallback in the matcher can apply);
/// 5. two or more tokens become `first:second` — tokens past the second
///    are dropped (`"send email notification"` → `"send:email"`).
///
/// The function is idempotent.
pub fn normalize_action(action: &str) -> String {
    let action = action.trim();

    if action.contains(':') {
        return action.to_lowercase();
    }

    let mut spaced = String::with_capacity(action.len() + 4);
    let mut prev_lower = false;
    for ch in action.chars() {
        if prev_lower && ch.is_ascii_uppercase() {
            spaced.push(' ');
        }
        prev_lower = ch.is_ascii_lowercase();
        spaced.push(ch);
    }

    let flattened = spaced.to_lowercase().replace(['-', '_'], " ");
    let mut tokens = flattened.split_whitespace();

    match (tokens.next(), tokens.next()) {
        (None, _) => String::new(),
        (Some(single), None) => single.to_string(),
        (Some(verb), Some(noun)) => format!("{verb}:{noun}"),
    }
}
