//! HTTP response handlers.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::compiler::CompilerError;
use crate::utils::mime::types::{JSON, PLAIN};

/// Outcome of a deferred request, sent once its future completes.
pub enum Reply {
    Data(Arc<[u8]>, &'static str),
    Json(serde_json::Result<Vec<u8>>),
    Error(CompilerError),
}

impl Reply {
    pub fn send(self, request: Request) -> Result<()> {
        match self {
            Reply::Data(data, content_type) => respond_data(request, data, content_type),
            Reply::Json(body) => respond_json(request, body?),
            Reply::Error(error) => respond_error(request, &error),
        }
    }
}

/// Body of `GET /status`, checked by the React Native CLI.
pub const STATUS_BODY: &str = "packager-status:running";

/// Respond with compiled or raw file content.
pub fn respond_data(request: Request, data: Arc<[u8]>, content_type: &'static str) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 200, content_type, data.len());
    }

    let length = data.len();
    let response = Response::new(
        StatusCode(200),
        vec![make_header("Content-Type", content_type)],
        Cursor::new(data),
        Some(length),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Map an orchestrator error to 404 (not found family) or 500.
pub fn respond_error(request: Request, error: &CompilerError) -> Result<()> {
    let status = if error.is_not_found() { 404 } else { 500 };
    if status == 500 {
        crate::log!("error"; "{}", error);
    } else {
        crate::debug!("serve"; "{}", error);
    }
    send_body(request, status, PLAIN, error.to_string().into_bytes())
}

pub fn respond_status(request: Request) -> Result<()> {
    respond_data(request, Arc::from(STATUS_BODY.as_bytes()), PLAIN)
}

pub fn respond_json(request: Request, body: Vec<u8>) -> Result<()> {
    send_body(request, 200, JSON, body)
}

pub fn respond_bad_request(request: Request, message: &str) -> Result<()> {
    send_body(request, 400, PLAIN, message.as_bytes().to_vec())
}

pub fn respond_method_not_allowed(request: Request) -> Result<()> {
    send_body(request, 405, PLAIN, b"405 Method Not Allowed".to_vec())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &'static str, length: usize) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(make_header("Content-Type", content_type))
        .with_header(Header::from_bytes("Content-Length", length.to_string()).unwrap());
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, status, content_type, body.len());
    }
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).unwrap()
}
