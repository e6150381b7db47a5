use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use tokio_util::io::ReaderStream;

use crate::media::{AudioFormat, Quality};
use crate::store::{ALLOWED_EXTENSIONS, MediaStore};

use super::{AppState, assets};

/// Collected multipart form: uploaded files in arrival order plus the
/// plain text fields.
struct FormData {
    files: Vec<(String, String, Bytes)>,
    values: HashMap<String, String>,
}

impl FormData {
    fn file(&self, field: &str) -> Option<(&str, &Bytes)> {
        self.files
            .iter()
            .find(|(name, _, _)| name == field)
            .map(|(_, filename, data)| (filename.as_str(), data))
    }

    fn files(&self, field: &str) -> Vec<(&str, &Bytes)> {
        self.files
            .iter()
            .filter(|(name, _, _)| name == field)
            .map(|(_, filename, data)| (filename.as_str(), data))
            .collect()
    }

    fn value(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormData, String> {
    let mut form = FormData {
        files: Vec::new(),
        values: HashMap::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Invalid form data: {}", e))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(filename) = field.file_name() {
            let filename = filename.to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| format!("Failed to read upload: {}", e))?;
            form.files.push((name, filename, data));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| format!("Failed to read form field: {}", e))?;
            form.values.insert(name, value);
        }
    }

    Ok(form)
}

/// Check one uploaded file before anything touches the disk.
fn validate_upload(filename: &str, data: &Bytes) -> Result<(), String> {
    if filename.is_empty() {
        return Err("No file selected.".to_string());
    }
    if !MediaStore::allowed_file(filename) {
        return Err(format!(
            "Unsupported file type for '{}'. Allowed: {}.",
            filename,
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    if data.is_empty() {
        return Err("Uploaded file is empty.".to_string());
    }
    Ok(())
}

fn file_stem(name: &str) -> String {
    FsPath::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string())
}

/// Re-render a tool page with the error text in the flash slot.
fn page_error(page: &'static str, status: StatusCode, msg: &str) -> Response {
    eprintln!("[server] {}: {}", page, msg);
    (status, Html(assets::render_page(page, Some(msg)))).into_response()
}

// ── Pages ────────────────────────────────────────────────────────────────

pub async fn index() -> Html<String> {
    Html(assets::render_page("index", None))
}

pub async fn compress_page() -> Html<String> {
    Html(assets::render_page("compress", None))
}

pub async fn convert_page() -> Html<String> {
    Html(assets::render_page("convert", None))
}

pub async fn merge_page() -> Html<String> {
    Html(assets::render_page("merge", None))
}

pub async fn static_asset(Path(path): Path<String>) -> Result<Response, StatusCode> {
    let body = assets::asset(&path).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .body(Body::from(body))
        .unwrap())
}

// ── Tools ────────────────────────────────────────────────────────────────

/// Compress endpoint: re-encode to a quality preset or toward a target size.
pub async fn compress(State(state): State<AppState>, multipart: Multipart) -> Response {
    const PAGE: &str = "compress";

    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(msg) => return page_error(PAGE, StatusCode::BAD_REQUEST, &msg),
    };

    let Some((filename, data)) = form.file("video") else {
        return page_error(PAGE, StatusCode::BAD_REQUEST, "No video file provided.");
    };
    if let Err(msg) = validate_upload(filename, data) {
        return page_error(PAGE, StatusCode::BAD_REQUEST, &msg);
    }

    let quality = match form.value("quality") {
        Some(raw) => match Quality::parse(raw) {
            Some(q) => q,
            None => {
                return page_error(
                    PAGE,
                    StatusCode::BAD_REQUEST,
                    &format!("Unknown quality '{}'.", raw),
                );
            }
        },
        None => Quality::default(),
    };

    let target_size = match form.value("target_size") {
        Some(raw) => match raw.parse::<u64>() {
            Ok(mb) if mb > 0 => Some(mb),
            _ => {
                return page_error(
                    PAGE,
                    StatusCode::BAD_REQUEST,
                    "Target size must be a positive number of megabytes.",
                );
            }
        },
        None => None,
    };

    let filename = filename.to_string();
    let input = match state.store.save_upload(&filename, data).await {
        Ok(path) => path,
        Err(e) => {
            return page_error(
                PAGE,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to store upload: {}", e),
            );
        }
    };

    let out_name = MediaStore::unique_name(&format!("{}_compressed.mp4", file_stem(&filename)));
    let output = state.store.processed_path(&out_name);

    println!(
        "[server] compress: {} ({} bytes, quality={}, target={:?})",
        filename,
        data.len(),
        quality,
        target_size
    );

    match state
        .transcoder
        .compress(&input, &output, quality, target_size)
        .await
    {
        Ok(()) => Redirect::to(&format!("/download/{}", out_name)).into_response(),
        Err(e) => page_error(PAGE, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// Convert endpoint: extract the audio track into the chosen format.
pub async fn convert(State(state): State<AppState>, multipart: Multipart) -> Response {
    const PAGE: &str = "convert";

    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(msg) => return page_error(PAGE, StatusCode::BAD_REQUEST, &msg),
    };

    let Some((filename, data)) = form.file("video") else {
        return page_error(PAGE, StatusCode::BAD_REQUEST, "No video file provided.");
    };
    if let Err(msg) = validate_upload(filename, data) {
        return page_error(PAGE, StatusCode::BAD_REQUEST, &msg);
    }

    let format = match form.value("format").and_then(AudioFormat::parse) {
        Some(format) => format,
        None => {
            return page_error(
                PAGE,
                StatusCode::BAD_REQUEST,
                "Choose an output format (mp3, wav, aac or m4a).",
            );
        }
    };

    let filename = filename.to_string();
    let input = match state.store.save_upload(&filename, data).await {
        Ok(path) => path,
        Err(e) => {
            return page_error(
                PAGE,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to store upload: {}", e),
            );
        }
    };

    let out_name = MediaStore::unique_name(&format!(
        "{}.{}",
        file_stem(&filename),
        format.extension()
    ));
    let output = state.store.processed_path(&out_name);

    println!(
        "[server] convert: {} -> {}",
        filename,
        format.extension()
    );

    match state.transcoder.convert(&input, &output, format).await {
        Ok(()) => Redirect::to(&format!("/download/{}", out_name)).into_response(),
        Err(e) => page_error(PAGE, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// Merge endpoint: concatenate the uploads in the order they arrived.
pub async fn merge(State(state): State<AppState>, multipart: Multipart) -> Response {
    const PAGE: &str = "merge";

    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(msg) => return page_error(PAGE, StatusCode::BAD_REQUEST, &msg),
    };

    // Browsers submit an empty-named file part when nothing is selected.
    let uploads: Vec<(&str, &Bytes)> = form
        .files("videos")
        .into_iter()
        .filter(|(filename, _)| !filename.is_empty())
        .collect();

    if uploads.len() < 2 {
        return page_error(
            PAGE,
            StatusCode::BAD_REQUEST,
            "Select at least two videos to merge.",
        );
    }
    for (filename, data) in &uploads {
        if let Err(msg) = validate_upload(filename, data) {
            return page_error(PAGE, StatusCode::BAD_REQUEST, &msg);
        }
    }

    let mut inputs: Vec<PathBuf> = Vec::with_capacity(uploads.len());
    for (filename, data) in &uploads {
        match state.store.save_upload(filename, data).await {
            Ok(path) => inputs.push(path),
            Err(e) => {
                return page_error(
                    PAGE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("Failed to store upload: {}", e),
                );
            }
        }
    }

    let out_name = MediaStore::unique_name("merged.mp4");
    let output = state.store.processed_path(&out_name);

    println!("[server] merge: {} files", inputs.len());

    match state.transcoder.merge(&inputs, &output).await {
        Ok(()) => Redirect::to(&format!("/download/{}", out_name)).into_response(),
        Err(e) => page_error(PAGE, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

// ── Downloads ────────────────────────────────────────────────────────────

/// Stream a processed file as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, StatusCode> {
    let path = state
        .store
        .resolve_download(&filename)
        .ok_or(StatusCode::NOT_FOUND)?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StatusCode::NOT_FOUND
        } else {
            eprintln!("[server] Error opening file {:?}: {}", path, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&filename))
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                filename.replace(['"', '\\'], "_")
            ),
        )
        .body(body)
        .unwrap())
}

/// Content type by file extension, for downloads and embedded assets alike.
fn content_type_for(name: &str) -> &'static str {
    let ext = FsPath::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "m4a" => "audio/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "flv" => "video/x-flv",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.mp4"), "video/mp4");
        assert_eq!(content_type_for("a.M4A"), "audio/mp4");
        assert_eq!(content_type_for("a.webm"), "video/webm");
        assert_eq!(content_type_for("style.css"), "text/css");
        assert_eq!(content_type_for("weird.bin"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("holiday.mp4"), "holiday");
        assert_eq!(file_stem("archive.tar.mp4"), "archive.tar");
        assert_eq!(file_stem(""), "video");
    }

    #[test]
    fn test_validate_upload() {
        let data = Bytes::from_static(b"x");
        assert!(validate_upload("clip.mp4", &data).is_ok());
        assert!(validate_upload("", &data).is_err());
        assert!(validate_upload("clip.txt", &data).is_err());
        assert!(validate_upload("clip.mp4", &Bytes::new()).is_err());
    }
}
