//! Request routing, static files and `/generate`

use super::artifact::Artifact;
use super::query::{parse_query, RenderRequest};
use crate::Renderer;
use log::{debug, error, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response};

/// Everything a request handler needs. Owned by the server, shared by reference
/// across request tasks.
pub struct AppContext {
    pub public_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_dimension: u32,
    pub renderer: Arc<dyn Renderer>,
}

/// Dispatch one request and send its response.
pub fn handle(request: Request, ctx: &AppContext) {
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, q),
        None => (url.as_str(), ""),
    };
    debug!("{:?} {}", request.method(), path);

    if !matches!(request.method(), Method::Get | Method::Head) {
        return send(request, text_response(405, "Method Not Allowed"));
    }

    if path == "/generate" {
        generate(request, query, ctx)
    } else {
        serve_static(request, path, ctx)
    }
}

fn generate(request: Request, query: &str, ctx: &AppContext) {
    let render_request = match RenderRequest::from_params(&parse_query(query), ctx.max_dimension) {
        Ok(r) => r,
        Err(e) => return send(request, text_response(400, &e.to_string())),
    };
    let format = render_request.options.format;

    let artifact = match Artifact::reserve(&ctx.output_dir, format) {
        Ok(a) => a,
        Err(e) => {
            error!("Error generating image: cannot prepare {}: {}", ctx.output_dir.display(), e);
            return send(request, text_response(500, "Error generating image"));
        }
    };

    if let Err(e) = ctx
        .renderer
        .render(&render_request.html, artifact.path(), &render_request.options)
    {
        error!("Error generating image: {}", e);
        // partial output goes before the client hears back
        drop(artifact);
        return send(request, text_response(500, "Error generating image"));
    }

    let file = match File::open(artifact.path()) {
        Ok(f) => f,
        Err(e) => {
            error!("Error generating image: cannot open {}: {}", artifact.path().display(), e);
            return send(request, text_response(500, "Error generating image"));
        }
    };

    send(request, with_content_type(Response::from_file(file), format.mime_type()));
    // `artifact` drops here and deletes the file whether or not the send succeeded
}

fn serve_static(request: Request, path: &str, ctx: &AppContext) {
    let Some(file_path) = resolve_static(&ctx.public_dir, path) else {
        return send(request, text_response(404, "Not Found"));
    };

    match File::open(&file_path) {
        Ok(file) => {
            let response = with_content_type(Response::from_file(file), static_content_type(&file_path));
            send(request, response)
        }
        Err(e) => {
            warn!("Failed to open static file {}: {}", file_path.display(), e);
            send(request, text_response(404, "Not Found"))
        }
    }
}

/// Map a URL path onto a file under `root`.
///
/// The path is percent-decoded; `..` and anything else that could escape the
/// root is rejected. Directories resolve to their `index.html`.
pub fn resolve_static(root: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(url_path).ok()?;

    let mut resolved = root.to_path_buf();
    for segment in decoded.split('/').filter(|s| !s.is_empty()) {
        if segment.contains('\\') {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => resolved.push(part),
            (Some(Component::CurDir), None) => {}
            _ => return None,
        }
    }

    if resolved.is_dir() {
        resolved.push("index.html");
    }
    resolved.is_file().then_some(resolved)
}

/// Content type for a static file, by extension
pub fn static_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn text_response(status: u16, body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    with_content_type(Response::from_string(body), "text/plain; charset=utf-8").with_status_code(status)
}

fn with_content_type<R: Read>(response: Response<R>, content_type: &str) -> Response<R> {
    match Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn send<R: Read>(request: Request, response: Response<R>) {
    if let Err(e) = request.respond(response) {
        warn!("Failed to send response: {}", e);
    }
}
