#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! - Text nodes: `&`, `<`, `>` and `\r`
//! - Attribute values: `&`, `<`, `"`, `\t`, `\n` and `\r`
//! - PI data: `\r`

#[derive(Clone, Copy)]
enum Context {
    Text,
    Attr,
}

fn escape(s: &str, ctx: Context) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        let replacement = match (ch, ctx) {
            ('&', _) => "&amp;",
            ('<', _) => "&lt;",
            ('\r', _) => "&#xD;",
            ('>', Context::Text) => "&gt;",
            ('"', Context::Attr) => "&quot;",
            ('\t', Context::Attr) => "&#x9;",
            ('\n', Context::Attr) => "&#xA;",
            _ => {
                out.push(ch);
                continue;
            }
        };
        out.push_str(replacement);
    }
    out
}

pub fn escape_text(s: &str) -> String {
    escape(s, Context::Text)
}

pub fn escape_attr(s: &str) -> String {
    escape(s, Context::Attr)
}

pub fn escape_pi(s: &str) -> String {
    s.replace('\r', "&#xD;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a&b<c>d\"e"), "a&amp;b&lt;c&gt;d\"e");
        assert_eq!(escape_text("line\rend\n"), "line&#xD;end\n");
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr("a>b\"c"), "a>b&quot;c");
        assert_eq!(escape_attr("a\tb\nc\rd"), "a&#x9;b&#xA;c&#xD;d");
    }
}
