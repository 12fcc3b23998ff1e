use std::borrow::Cow;

use htmlescape::decode_html;

/// Longest entity body (between `&` and `;`) worth trying to decode.
const MAX_ENTITY_LEN: usize = 32;

/// Decodes HTML character references once.
///
/// Publishers frequently double-encode text (`&amp;amp;`), so feed text goes
/// through this after XML decoding. Unknown or malformed references, and
/// bare ampersands, are kept as written rather than failing the whole string.
///
/// # Examples
///
/// ```
/// use gator::util::unescape_html;
///
/// assert_eq!(unescape_html("Foo &amp; Bar"), "Foo & Bar");
/// assert_eq!(unescape_html("&amp;amp;"), "&amp;");
/// assert_eq!(unescape_html("Q&A &bogus; &#39;ok&#39;"), "Q&A &bogus; 'ok'");
/// ```
pub fn unescape_html(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    // Fast path: every reference is well-formed
    if let Ok(decoded) = decode_html(s) {
        return Cow::Owned(decoded);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];

        let decoded = entity_end(candidate)
            .and_then(|end| decode_html(&candidate[..end]).ok().map(|d| (d, end)));

        match decoded {
            Some((text, end)) => {
                out.push_str(&text);
                rest = &candidate[end..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Byte offset just past the `;` closing the reference that starts `s`.
fn entity_end(s: &str) -> Option<usize> {
    s.char_indices()
        .skip(1)
        .take(MAX_ENTITY_LEN + 1)
        .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '#'))
        .filter(|&(i, c)| c == ';' && i > 1)
        .map(|(i, _)| i + 1)
}
