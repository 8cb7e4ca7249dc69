//! Message template rendering with `{variable}` placeholders.

use std::collections::HashMap;

/// Substitutes `{variable}` placeholders from `vars`. Placeholders with no
/// matching variable are left verbatim; rendering never fails.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        // Scan for the matching close brace.
        let mut end = None;
        for (i, c2) in template[start + 1..].char_indices() {
            match c2 {
                '}' => {
                    end = Some(start + 1 + i);
                    break;
                }
                // A nested open brace means this was not a placeholder.
                '{' => break,
                _ => {}
            }
        }
        match end {
            Some(end) => {
                let key = &template[start + 1..end];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&template[start..=end]),
                }
                // Skip past the placeholder.
                while let Some(&(i, _)) = chars.peek() {
                    if i > end {
                        break;
                    }
                    chars.next();
                }
            }
            None => out.push(c),
        }
    }

    out
}
