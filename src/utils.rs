use url::Url;

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Scheme + host (+ port) of the configured backend, used to absolutize
/// root-relative avatar paths.
pub fn api_origin(base_url: &str) -> Option<String> {
    let url = Url::parse(base_url).ok()?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_adds_scheme_and_trims() {
        assert_eq!(normalize_url("  portal.example.edu/ "), "https://portal.example.edu");
        assert_eq!(normalize_url("http://localhost:8000/"), "http://localhost:8000");
    }

    #[test]
    fn api_origin_drops_path() {
        assert_eq!(
            api_origin("https://portal.example.edu/api/v1").as_deref(),
            Some("https://portal.example.edu")
        );
        assert_eq!(
            api_origin("http://localhost:8000/api").as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(api_origin("not a url"), None);
    }
}
