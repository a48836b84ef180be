//! File naming for browser-style downloads.
//!
//! A saved response is named the way a browser would name it: the
//! Content-Disposition filename, else the last URL path segment, with an
//! extension implied by the Content-Type when the name has none.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Suffix for a download still being written.
pub const PARTIAL_SUFFIX: &str = ".crdownload";

/// Guesses a file extension from a Content-Type header.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" | "application/x-pdf" => ".pdf",
        "text/html" | "application/xhtml+xml" => ".html",
        "text/plain" => ".txt",
        "application/xml" | "text/xml" => ".xml",
        _ => ".bin",
    }
}

/// Extracts the filename from a Content-Disposition header.
///
/// Handles `filename="a.pdf"`, `filename=a.pdf` and RFC 5987 `filename*=UTF-8''a.pdf`.
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();
    if let Some(stripped) = value.strip_prefix('"') {
        return stripped.find('"').map(|end| stripped[..end].to_string());
    }
    let end = value.find(';').unwrap_or(value.len());
    let filename = value[..end].trim();
    (!filename.is_empty()).then(|| filename.to_string())
}

/// Replaces characters that are invalid on common filesystems.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Name a browser would give the response body of `url`.
#[must_use]
pub fn download_filename(
    url: &Url,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let from_header = content_disposition
        .and_then(parse_content_disposition)
        .map(|name| sanitize_filename(&name));
    let from_url = || {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|last| !last.is_empty())
            .map(|last| sanitize_filename(&last))
    };
    let name = from_header
        .or_else(from_url)
        .unwrap_or_else(|| "download".to_string());

    if Path::new(&name).extension().is_some() {
        return name;
    }
    let extension = content_type.map_or(".bin", extension_from_content_type);
    format!("{name}{extension}")
}

/// Returns `dir/filename`, adding `_1`, `_2`, ... before the extension if taken.
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let base_path = dir.join(filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };

    (1..1000)
        .map(|i| dir.join(format!("{stem}_{i}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| {
            let stamp = chrono::Utc::now().timestamp_millis();
            dir.join(format!("{stem}_{stamp}{ext}"))
        })
}

/// Path of the in-progress file for `target`.
#[must_use]
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}
