/// Quote- and parenthesis-aware scanning over script text.
///
/// Conditions and actions are delimited by bare characters (`&`, `;`, `>`,
/// `,`, `:`) that may also appear inside string literals or call
/// arguments. Everything here only reports positions at parenthesis
/// depth zero and outside quotes.

/// Walk `text`, calling `visit(byte_offset, ch)` for every character that
/// sits outside quotes at parenthesis depth zero. Stops early when
/// `visit` returns false.
fn walk_top_level(text: &str, mut visit: impl FnMut(usize, char) -> bool) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => {
                if !visit(i, c) {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Offset of the first top-level occurrence of any of `targets`.
pub(crate) fn find_top_level(text: &str, targets: &[char]) -> Option<usize> {
    let mut found = None;
    walk_top_level(text, |i, c| {
        if targets.contains(&c) {
            found = Some(i);
            false
        } else {
            true
        }
    });
    found
}

/// Offsets of every top-level `>` that is not the start of `>=`.
pub(crate) fn arrow_positions(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    walk_top_level(text, |i, c| {
        if c == '>' && bytes.get(i + 1) != Some(&b'=') {
            found.push(i);
        }
        true
    });
    found
}

/// Split on top-level separators, trimming pieces and dropping empty ones.
pub(crate) fn split_top_level<'a>(text: &'a str, separators: &[char]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    walk_top_level(text, |i, c| {
        if separators.contains(&c) {
            pieces.push(&text[start..i]);
            start = i + c.len_utf8();
        }
        true
    });
    pieces.push(&text[start..]);
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Given text that starts right after an opening `(`, return the part
/// inside the parentheses and the remainder after the matching `)`.
pub(crate) fn split_parenthesized(text: &str) -> Option<(&str, &str)> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[..i], &text[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_outside_quotes_and_parens() {
        let pieces = split_top_level("a=1; b=max(1;2) & name='x;y'", &['&', ';']);
        assert_eq!(pieces, vec!["a=1", "b=max(1;2)", "name='x;y'"]);
    }

    #[test]
    fn drops_empty_pieces() {
        assert_eq!(split_top_level(";; x=1 ;", &[';']), vec!["x=1"]);
        assert!(split_top_level("   ", &[';']).is_empty());
    }

    #[test]
    fn arrows_skip_comparisons() {
        assert_eq!(arrow_positions("a>=1>b"), vec![4]);
        assert_eq!(arrow_positions("(a>b)>c>>d"), vec![5, 7, 8]);
        assert_eq!(arrow_positions("'>'>x"), vec![3]);
    }

    #[test]
    fn matching_paren() {
        assert_eq!(split_parenthesized("a(b)c)rest"), Some(("a(b)c", "rest")));
        assert_eq!(split_parenthesized("')'x)"), Some(("')'x", "")));
        assert_eq!(split_parenthesized("open"), None);
    }

    #[test]
    fn first_top_level() {
        assert_eq!(find_top_level("f(a:b):c", &[':']), Some(6));
        assert_eq!(find_top_level("abc", &[':']), None);
    }
}
