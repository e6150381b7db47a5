use include_dir::{Dir, include_dir};

/// Embedded web UI: page templates under `pages/`, everything served from
/// `/static/` under `assets/`.
static STATIC_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/static");

/**
    Render a tool page, filling the `{{error}}` slot. With no error the slot
    collapses to nothing; with one it becomes the flash block the original
    pages reserved for failed runs.
*/
pub fn render_page(name: &str, error: Option<&str>) -> String {
    let template = STATIC_DIR
        .get_file(format!("pages/{}.html", name))
        .and_then(|f| f.contents_utf8())
        .expect("page embedded at build time");

    let slot = match error {
        Some(msg) => format!("<div class=\"flash\">{}</div>", escape_html(msg)),
        None => String::new(),
    };

    template.replace("{{error}}", &slot)
}

/// Look up an embedded static asset by its `/static/` sub-path.
pub fn asset(path: &str) -> Option<&'static [u8]> {
    STATIC_DIR
        .get_file(format!("assets/{}", path))
        .map(|f| f.contents())
}

/// Minimal HTML escaping for error text interpolated into pages.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_page_without_error() {
        let html = render_page("compress", None);
        assert!(!html.contains("{{error}}"));
        assert!(!html.contains("class=\"flash\""));
    }

    #[test]
    fn test_render_page_with_error() {
        let html = render_page("convert", Some("ffmpeg said <no>"));
        assert!(html.contains("class=\"flash\""));
        assert!(html.contains("ffmpeg said &lt;no&gt;"));
    }

    #[test]
    fn test_asset_lookup() {
        assert!(asset("style.css").is_some());
        assert!(asset("convert.js").is_some());
        assert!(asset("missing.css").is_none());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }
}
