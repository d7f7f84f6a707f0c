//! Avatar path resolution. The backend has returned avatar paths in at least
//! five different shapes over time; this module is the single place that
//! absorbs them. Structured as an ordered rule list so a new shape is one new
//! rule, not another nested conditional.

/// Context the resolver would otherwise read from browser globals: the API
/// origin for absolutizing relative paths and the protocol for
/// protocol-relative URLs.
#[derive(Debug, Clone)]
pub struct AvatarContext {
    pub api_origin: Option<String>,
    pub protocol: String,
}

impl Default for AvatarContext {
    fn default() -> Self {
        Self { api_origin: None, protocol: "https".to_string() }
    }
}

type Rule = fn(&str, &AvatarContext) -> Option<String>;

// Checked in order; first applicable rule wins. `relative_path` always
// applies, so the list is total.
const RULES: &[Rule] = &[data_or_blob_uri, absolute_http_url, protocol_relative, relative_path];

/// Rewrite a raw avatar path/URL from the backend into a fetchable URL.
/// Pure string transform, never fails; empty input yields `None`.
pub fn resolve_avatar_src(raw: Option<&str>, ctx: &AvatarContext) -> Option<String> {
    let input = raw?.trim();
    if input.is_empty() {
        return None;
    }
    RULES.iter().find_map(|rule| rule(input, ctx))
}

fn data_or_blob_uri(input: &str, _ctx: &AvatarContext) -> Option<String> {
    if input.starts_with("data:") || input.starts_with("blob:") {
        Some(input.to_string())
    } else {
        None
    }
}

// Known wrong absolute prefixes the backend has emitted, each rewritten to
// the canonical /storage/ prefix.
const WRONG_ABSOLUTE_PREFIXES: &[&str] = &["/api/storage/", "/storage/app/public/"];

fn absolute_http_url(input: &str, _ctx: &AvatarContext) -> Option<String> {
    if !(input.starts_with("http://") || input.starts_with("https://")) {
        return None;
    }
    let mut out = input.to_string();
    // Rewriting one wrong prefix can expose another (/api/storage/app/public/),
    // so repeat until the URL is stable.
    loop {
        let Some((pos, prefix)) = WRONG_ABSOLUTE_PREFIXES
            .iter()
            .find_map(|p| out.find(p).map(|pos| (pos, *p)))
        else {
            break;
        };
        out = format!("{}/storage/{}", &out[..pos], &out[pos + prefix.len()..]);
    }
    Some(out)
}

fn protocol_relative(input: &str, ctx: &AvatarContext) -> Option<String> {
    if input.starts_with("//") {
        Some(format!("{}:{}", ctx.protocol, input))
    } else {
        None
    }
}

// Folder names uploads land under when the backend omits the storage/ prefix.
const UPLOAD_FOLDERS: &[&str] = &["avatars", "uploads", "profile_pictures", "profiles", "images"];

fn looks_like_file(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if last_segment.contains('.') {
        return true;
    }
    UPLOAD_FOLDERS.iter().any(|folder| path.starts_with(&format!("{}/", folder)))
}

fn relative_path(input: &str, ctx: &AvatarContext) -> Option<String> {
    let mut path = input.trim_start_matches('/');
    for prefix in ["storage/app/public/", "public/"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            path = rest;
            break;
        }
    }
    let path = if !path.starts_with("storage/") && looks_like_file(path) {
        format!("storage/{}", path)
    } else {
        path.to_string()
    };
    match &ctx.api_origin {
        Some(origin) => Some(format!("{}/{}", origin.trim_end_matches('/'), path)),
        None => Some(format!("/{}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AvatarContext {
        AvatarContext {
            api_origin: Some("https://portal.example.edu".into()),
            protocol: "https".into(),
        }
    }

    #[test]
    fn empty_and_whitespace_yield_none() {
        assert_eq!(resolve_avatar_src(None, &ctx()), None);
        assert_eq!(resolve_avatar_src(Some(""), &ctx()), None);
        assert_eq!(resolve_avatar_src(Some("   "), &ctx()), None);
    }

    #[test]
    fn data_and_blob_uris_pass_through() {
        let data = "data:image/png;base64,AAAA";
        assert_eq!(resolve_avatar_src(Some(data), &ctx()).as_deref(), Some(data));
        let blob = "blob:https://portal.example.edu/x";
        assert_eq!(resolve_avatar_src(Some(blob), &ctx()).as_deref(), Some(blob));
    }

    #[test]
    fn wrong_absolute_prefixes_are_rewritten() {
        assert_eq!(
            resolve_avatar_src(Some("https://h/api/storage/avatars/a.png"), &ctx()).as_deref(),
            Some("https://h/storage/avatars/a.png")
        );
        assert_eq!(
            resolve_avatar_src(Some("https://h/storage/app/public/avatars/a.png"), &ctx())
                .as_deref(),
            Some("https://h/storage/avatars/a.png")
        );
        // Stacked wrong prefixes still converge.
        assert_eq!(
            resolve_avatar_src(Some("https://h/api/storage/app/public/a.png"), &ctx()).as_deref(),
            Some("https://h/storage/a.png")
        );
    }

    #[test]
    fn normalized_absolute_urls_are_untouched_and_idempotent() {
        let url = "https://h/storage/avatars/a.png";
        let once = resolve_avatar_src(Some(url), &ctx()).unwrap();
        assert_eq!(once, url);
        let twice = resolve_avatar_src(Some(&once), &ctx()).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn protocol_relative_gets_context_protocol() {
        assert_eq!(
            resolve_avatar_src(Some("//cdn.example.edu/a.png"), &ctx()).as_deref(),
            Some("https://cdn.example.edu/a.png")
        );
    }

    #[test]
    fn relative_paths_get_storage_and_origin() {
        assert_eq!(
            resolve_avatar_src(Some("avatars/a.png"), &ctx()).as_deref(),
            Some("https://portal.example.edu/storage/avatars/a.png")
        );
        assert_eq!(
            resolve_avatar_src(Some("storage/app/public/avatars/a.png"), &ctx()).as_deref(),
            Some("https://portal.example.edu/storage/avatars/a.png")
        );
        assert_eq!(
            resolve_avatar_src(Some("public/avatars/a.png"), &ctx()).as_deref(),
            Some("https://portal.example.edu/storage/avatars/a.png")
        );
        // Already storage-prefixed: no double prefix.
        assert_eq!(
            resolve_avatar_src(Some("storage/avatars/a.png"), &ctx()).as_deref(),
            Some("https://portal.example.edu/storage/avatars/a.png")
        );
    }

    #[test]
    fn upload_folder_without_extension_still_counts_as_file() {
        assert_eq!(
            resolve_avatar_src(Some("uploads/abc123"), &ctx()).as_deref(),
            Some("https://portal.example.edu/storage/uploads/abc123")
        );
        // Not file-like: left alone apart from the origin prefix.
        assert_eq!(
            resolve_avatar_src(Some("some/random/dir"), &ctx()).as_deref(),
            Some("https://portal.example.edu/some/random/dir")
        );
    }

    #[test]
    fn no_origin_falls_back_to_root_relative() {
        let ctx = AvatarContext::default();
        assert_eq!(
            resolve_avatar_src(Some("avatars/a.png"), &ctx).as_deref(),
            Some("/storage/avatars/a.png")
        );
    }
}
