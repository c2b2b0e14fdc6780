//! Browser front-end: one video upload, a markdown panel and a frame gallery.
//!
//! Routes:
//!   GET  /                 - upload form
//!   POST /analyze          - multipart upload, re-renders the page with results
//!   POST /api/analyze      - multipart upload, JSON result
//!   GET  /api/metrics      - session counters
//!   GET  /frames/:filename - preview JPEGs from the working directory

use crate::analysis::Analyzer;
use crate::config::Settings;
use crate::error::MediaError;
use crate::metrics::Metrics;
use crate::tool::{run_blocking, SessionReport, SwimAnalysisTool};
use crate::workdir::parse_frame_index;
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pulldown_cmark::{html, Event, Options, Parser};
use serde::Serialize;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const PAGE_TITLE: &str = "Swim Technique Analysis";
pub const PAGE_DESCRIPTION: &str =
    "Upload a swimming video and get an analysis of the swimmer's technique.";

/// Multipart field carrying the video.
pub const UPLOAD_FIELD: &str = "video";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub analyzer: Arc<dyn Analyzer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(settings: Settings, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            settings: Arc::new(settings),
            analyzer,
            metrics: Metrics::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze_form))
        .route("/api/analyze", post(analyze_json))
        .route("/api/metrics", get(metrics))
        .route("/frames/:filename", get(serve_frame))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.settings.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

#[derive(Debug)]
enum UploadError {
    Rejected(StatusCode, String),
    Session(MediaError),
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        // 413 when the body limit trips, 400 for malformed multipart
        let status = e.status();
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Upload exceeds the size limit".to_string()
        } else {
            e.body_text()
        };
        UploadError::Rejected(status, message)
    }
}

impl From<MediaError> for UploadError {
    fn from(e: MediaError) -> Self {
        UploadError::Session(e)
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Session(MediaError::Io(e))
    }
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            UploadError::Rejected(status, _) => *status,
            UploadError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            UploadError::Rejected(_, msg) => msg.clone(),
            UploadError::Session(e) => e.to_string(),
        }
    }
}

/// Stream the upload to disk and run one session on it.
async fn run_upload(state: &AppState, mut multipart: Multipart) -> Result<SessionReport, UploadError> {
    let mut spooled = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            spooled = Some(spool_field(field).await?);
            break;
        }
    }

    let spool = spooled.ok_or_else(|| {
        UploadError::Rejected(
            StatusCode::BAD_REQUEST,
            format!("Missing '{}' file field", UPLOAD_FIELD),
        )
    })?;

    // A fresh tool per upload: the working directory is reset every time
    let settings = Arc::clone(&state.settings);
    let analyzer = Arc::clone(&state.analyzer);
    let tool = run_blocking(move || SwimAnalysisTool::new(&settings, analyzer))
        .await?
        .with_metrics(Arc::clone(&state.metrics));
    let report = tool.process_video(spool.path()).await?;
    Ok(report)
}

/// Write the field to a temp file chunk by chunk; the suffix is sniffed from the first chunk.
async fn spool_field(mut field: Field<'_>) -> Result<NamedTempFile, UploadError> {
    let file_name = field.file_name().map(str::to_string);
    let head = field.chunk().await?.unwrap_or_default();
    let suffix = upload_suffix(file_name.as_deref(), &head);

    let (spool, file) = run_blocking(move || {
        let spool = tempfile::Builder::new()
            .prefix("swim-upload-")
            .suffix(&suffix)
            .tempfile()?;
        let file = spool.reopen()?;
        Ok((spool, file))
    })
    .await?;

    let mut writer = tokio::fs::File::from_std(file);
    let mut received = head.len();
    writer.write_all(&head).await?;
    while let Some(chunk) = field.chunk().await? {
        received += chunk.len();
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;

    info!(
        "Received upload {} ({} bytes)",
        file_name.as_deref().unwrap_or("<unnamed>"),
        received
    );
    Ok(spool)
}

/// File suffix for the spooled upload, sniffed from content first.
fn upload_suffix(file_name: Option<&str>, bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Video {
            warn!("Upload looks like {} rather than video", kind.mime_type());
        }
        return format!(".{}", kind.extension());
    }

    file_name
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn frame_url(path: &std::path::Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("/frames/{}", name))
}

async fn index() -> Html<String> {
    Html(render_page(&PageOutputs::default()))
}

async fn analyze_form(State(state): State<AppState>, multipart: Multipart) -> Response {
    match run_upload(&state, multipart).await {
        Ok(report) => {
            let outputs = PageOutputs {
                analysis_html: Some(markdown_to_html(&report.analysis)),
                frames: report.preview_paths.iter().filter_map(|p| frame_url(p)).collect(),
                error: None,
            };
            Html(render_page(&outputs)).into_response()
        }
        Err(e) => {
            let outputs = PageOutputs {
                error: Some(e.message()),
                ..PageOutputs::default()
            };
            (e.status(), Html(render_page(&outputs))).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
    pub frames: Vec<String>,
    pub total_frames: usize,
    pub analyzed_frames: Vec<usize>,
}

async fn analyze_json(State(state): State<AppState>, multipart: Multipart) -> Response {
    match run_upload(&state, multipart).await {
        Ok(report) => Json(AnalyzeResponse {
            frames: report.preview_paths.iter().filter_map(|p| frame_url(p)).collect(),
            analysis: report.analysis,
            total_frames: report.total_frames,
            analyzed_frames: report.analyzed_frames,
        })
        .into_response(),
        Err(e) => (
            e.status(),
            Json(serde_json::json!({ "error": e.message() })),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    Json(state.metrics.snapshot()).into_response()
}

async fn serve_frame(Path(filename): Path<String>, State(state): State<AppState>) -> Response {
    // Only frame_<n>.jpg names, nothing that could walk out of the directory
    if parse_frame_index(&filename).is_none() {
        warn!(filename = %filename, "Rejected frame request");
        return (StatusCode::BAD_REQUEST, "Invalid frame name").into_response();
    }

    let path = state.settings.output_dir.join(&filename);
    debug!(path = %path.display(), "Serving frame");

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                // names repeat across sessions
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "Frame not found").into_response()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read frame");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read frame").into_response()
        }
    }
}

/// Render model output; raw HTML in the reply is shown as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });
    html::push_html(&mut out, events);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

#[derive(Debug, Default)]
struct PageOutputs {
    analysis_html: Option<String>,
    frames: Vec<String>,
    error: Option<String>,
}

const PAGE_STYLE: &str = r#"
body { font-family: system-ui, sans-serif; background: #fff; color: #111; margin: 0 auto; max-width: 1100px; padding: 24px; }
h1 { margin-bottom: 4px; }
.description { color: #555; margin-top: 0; }
.columns { display: flex; gap: 24px; align-items: flex-start; }
.panel { border: 1px solid #ddd; border-radius: 6px; padding: 12px; }
.panel label { display: block; font-size: 13px; color: #555; margin-bottom: 8px; }
.upload video { width: 480px; height: 350px; background: #000; display: block; margin-bottom: 8px; }
.outputs { flex: 1; display: flex; flex-direction: column; gap: 16px; }
.gallery { display: grid; grid-template-columns: repeat(4, 1fr); gap: 6px; max-height: 240px; overflow-y: auto; }
.gallery img { width: 100%; object-fit: cover; }
.error { color: #b00020; white-space: pre-wrap; }
button { background: #111; color: #fff; border: 0; border-radius: 4px; padding: 8px 16px; cursor: pointer; }
"#;

const PAGE_SCRIPT: &str = r#"
document.getElementById('video-input').addEventListener('change', function (e) {
  var file = e.target.files[0];
  if (file) { document.getElementById('video-preview').src = URL.createObjectURL(file); }
});
"#;

fn render_page(outputs: &PageOutputs) -> String {
    let analysis = match (&outputs.error, &outputs.analysis_html) {
        (Some(error), _) => format!(r#"<p class="error">{}</p>"#, escape_html(error)),
        (None, Some(html)) => html.clone(),
        (None, None) => String::new(),
    };

    let gallery: String = outputs
        .frames
        .iter()
        .map(|url| format!(r#"<img src="{0}" alt="{0}">"#, escape_html(url)))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<h1>{title}</h1>
<p class="description">{description}</p>
<div class="columns">
  <form class="panel upload" method="post" action="/analyze" enctype="multipart/form-data">
    <label for="video-input">Upload a swimming video</label>
    <video id="video-preview" controls></video>
    <input id="video-input" type="file" name="{field}" accept="video/*" required>
    <button type="submit">Submit</button>
  </form>
  <div class="outputs">
    <div class="panel" id="result_markdown">
      <label>Analysis</label>
      {analysis}
    </div>
    <div class="panel">
      <label>Sample frame preview</label>
      <div class="gallery">{gallery}</div>
    </div>
  </div>
</div>
<script>{script}</script>
</body>
</html>
"#,
        title = PAGE_TITLE,
        description = PAGE_DESCRIPTION,
        style = PAGE_STYLE,
        field = UPLOAD_FIELD,
        analysis = analysis,
        gallery = gallery,
        script = PAGE_SCRIPT,
    )
}
