use url::Url;

pub const MAX_CONTENT_CHARS: usize = 2000;

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Channel endpoint for an HTTP base url: same host, ws/wss scheme, `/ws` path.
pub fn ws_url(base_url: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&normalize_url(base_url))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always an allowed scheme change
    let _ = url.set_scheme(scheme);
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

/// Cleans message text before it leaves the client or enters the database.
/// Returns the reason as text when the content cannot be sent.
pub fn sanitize_content(input: &str) -> Result<String, String> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    if cleaned.is_empty() {
        return Err("message is empty".into());
    }
    if cleaned.chars().count() > MAX_CONTENT_CHARS {
        return Err(format!("message exceeds {} characters", MAX_CONTENT_CHARS));
    }
    Ok(cleaned)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_trims() {
        assert_eq!(normalize_url(" chat.example.com/ "), "https://chat.example.com");
        assert_eq!(normalize_url("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn ws_url_maps_scheme_and_path() {
        assert_eq!(ws_url("http://127.0.0.1:9000").unwrap().as_str(), "ws://127.0.0.1:9000/ws");
        assert_eq!(ws_url("https://chat.example.com/base/").unwrap().as_str(), "wss://chat.example.com/base/ws");
    }

    #[test]
    fn sanitize_strips_controls_and_rejects_blank() {
        assert_eq!(sanitize_content("  hi\u{0007} there\n ").unwrap(), "hi there");
        assert_eq!(sanitize_content("a\nb").unwrap(), "a\nb");
        assert!(sanitize_content("   ").is_err());
        assert!(sanitize_content(&"x".repeat(MAX_CONTENT_CHARS + 1)).is_err());
    }
}
