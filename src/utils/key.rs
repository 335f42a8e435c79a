use crate::models::UploadRequest;
use uuid::Uuid;

/// Derives the storage key for `request`.
///
/// An explicit key is returned untouched. Otherwise the name comes from the
/// basename of the source path, then the descriptor, then a random token,
/// and `directory_prefix` replaces its directory when the two differ.
pub fn resolve_key(request: &UploadRequest<'_>, directory_prefix: Option<&str>) -> String {
    if let Some(key) = request
        .explicit_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
    {
        return key.to_string();
    }

    let name = request
        .source_path
        .as_deref()
        .map(|path| basename(&normalize(path)).to_string())
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            request
                .source_descriptor
                .as_deref()
                .map(normalize)
                .filter(|name| !name.trim().is_empty())
        })
        .unwrap_or_else(generate_name);

    apply_prefix(&name, directory_prefix)
}

pub fn generate_name() -> String {
    Uuid::new_v4().to_string()
}

fn normalize(name: &str) -> String {
    name.trim().replace('\\', "/")
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

fn split(name: &str) -> (&str, &str) {
    match name.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", name),
    }
}

fn apply_prefix(name: &str, directory_prefix: Option<&str>) -> String {
    let (dir, base) = split(name);
    let dir = match directory_prefix.map(|p| p.trim().trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() && prefix != dir => prefix.replace('\\', "/"),
        _ => dir.to_string(),
    };

    let base = if base.is_empty() {
        generate_name()
    } else {
        base.to_string()
    };

    if dir.is_empty() {
        base
    } else {
        format!("{}/{}", dir, base)
    }
}

/// MIME type for a key, by extension only.
pub fn content_type_for(name: &str) -> String {
    let extension = basename(name)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let mime_type = match extension.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "md" | "markdown" => "text/markdown",
        "xml" => "application/xml",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => return mime::APPLICATION_OCTET_STREAM.to_string(),
    };

    mime_type.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UploadRequest<'static> {
        UploadRequest::from_bytes("")
    }

    #[test]
    fn test_explicit_key_wins() {
        let req = request()
            .with_key("a/b.txt")
            .with_path("/tmp/x/report.csv")
            .with_descriptor("form.bin");
        assert_eq!(resolve_key(&req, Some("uploads")), "a/b.txt");
    }

    #[test]
    fn test_blank_explicit_key_is_ignored() {
        let req = request().with_key("").with_path("/tmp/r.csv");
        assert_eq!(resolve_key(&req, None), "r.csv");

        let req = request().with_key("   ");
        let key = resolve_key(&req, Some("uploads"));
        assert!(key.starts_with("uploads/"));
        assert!(key.len() > "uploads/".len());
    }

    #[test]
    fn test_path_basename_with_prefix() {
        let req = request().with_path("/tmp/x/report.csv");
        assert_eq!(resolve_key(&req, Some("uploads")), "uploads/report.csv");
        assert_eq!(resolve_key(&req, None), "report.csv");
    }

    #[test]
    fn test_windows_path_is_normalized() {
        let req = request().with_path("C:\\Users\\me\\photo.png");
        assert_eq!(resolve_key(&req, Some("img/")), "img/photo.png");
    }

    #[test]
    fn test_descriptor_keeps_directory_without_prefix() {
        let req = request().with_descriptor("docs/q1/summary.pdf");
        assert_eq!(resolve_key(&req, None), "docs/q1/summary.pdf");
        assert_eq!(resolve_key(&req, Some("docs/q1")), "docs/q1/summary.pdf");
        assert_eq!(resolve_key(&req, Some("archive")), "archive/summary.pdf");
    }

    #[test]
    fn test_blank_path_falls_through_to_descriptor() {
        let req = request().with_path("   ").with_descriptor("notes.txt");
        assert_eq!(resolve_key(&req, None), "notes.txt");
    }

    #[test]
    fn test_generated_names_are_unique() {
        let req = request().with_descriptor("  ");
        let first = resolve_key(&req, None);
        let second = resolve_key(&req, None);
        assert!(!first.is_empty());
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        let prefixed = resolve_key(&request(), Some("uploads"));
        assert!(prefixed.starts_with("uploads/"));
        assert!(prefixed.len() > "uploads/".len());
    }

    #[test]
    fn test_trailing_slash_never_yields_empty_basename() {
        let req = request().with_descriptor("folder/");
        let key = resolve_key(&req, None);
        assert!(key.starts_with("folder/"));
        assert!(key.len() > "folder/".len());
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for("uploads/report.csv"), "text/csv");
        assert_eq!(content_type_for("IMG.JPG"), "image/jpeg");
        assert_eq!(content_type_for("a.tar.gz"), "application/gzip");
        assert_eq!(content_type_for("dir.v2/noext"), "application/octet-stream");
        assert_eq!(content_type_for("Makefile"), "application/octet-stream");
    }
}
