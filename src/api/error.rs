use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("gateway error: {0}")]
    GatewayError(String),
    #[error("gateway reported 404: {0}")]
    NotFound(String),
    #[error("invalid response ({1}): {0}")]
    InvalidResponse(String, String),
    #[error("database unreachable: {0}")]
    DatabaseUnreachable(String),
    #[error("database refused credentials: {0}")]
    DatabaseAuth(String),
    #[error("database rejected batch: {0}")]
    MalformedBatch(String),
    #[error("notification failed: {0}")]
    NotifyError(String),
    #[error("format error")]
    FormatError,
    #[error("internal error")]
    InternalError,
}

fn html(status: Status, error: String) -> response::Result<'static> {
    Response::build()
        .status(status)
        .sized_body(error.len(), Cursor::new(error))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Error::GatewayError(s) | Error::NotFound(s) | Error::InvalidResponse(_, s) => html(
                Status::BadGateway,
                format!("<html><body><h3>502 Bad Gateway</h3>Error while polling the PVS gateway: <code>{}</code></body></html>", s),
            ),
            Error::DatabaseUnreachable(s) => html(
                Status::ServiceUnavailable,
                format!("<html><body><h3>503 Service Unavailable</h3>Database unreachable: <code>{}</code></body></html>", s),
            ),
            _ => html(
                Status::InternalServerError,
                format!(
                    "<html><body><h3>Unknown exception</h3><code>{:?}</code></body></html>",
                    self
                ),
            ),
        }
    }
}
