// src/utils/html.rs

/// Cleans admin-authored text with ammonia before it is stored.
///
/// Whitelist based: harmless markup (<b>, <p>, <code>) survives, while
/// <script>, <iframe> and event-handler attributes are stripped together with
/// their content. Candidates receive question text as stored, so this is the
/// only barrier against stored XSS in whatever renders it.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Same as [`clean_html`], trimmed, for optional fields. Blank becomes `None`.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input
        .map(|s| clean_html(s.trim()))
        .filter(|s| !s.is_empty())
}
