//! `LIKE` pattern construction. Every character `LIKE` treats specially is
//! escaped with a backslash; dialects append the matching `ESCAPE` clause.

const SPECIAL: [char; 5] = ['\\', '_', '%', '[', ']'];

/// Escapes `\ _ % [ ]`.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Inverse of [`escape`].
#[cfg(test)]
pub fn unescape(pattern: &str) -> String {
    let mut text = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                text.push(next);
            }
        } else {
            text.push(ch);
        }
    }
    text
}

/// `%text%`
pub fn contains(text: &str) -> String {
    format!("%{}%", escape(text))
}

/// `text%`
pub fn starts_with(text: &str) -> String {
    format!("{}%", escape(text))
}

/// `%text`
pub fn ends_with(text: &str) -> String {
    format!("%{}", escape(text))
}
