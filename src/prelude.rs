pub use crate::config::{RouteConfig, ServerConfig};
pub use crate::error::Result;
pub use crate::http::*;

pub use mio::{
    Events, Interest, Poll, Token,
    event::Event,
    net::TcpListener,
    net::TcpStream,
};
pub use proxy_log::{debug, errors, info, trace, warn};
pub use std::collections::HashMap;
pub use std::fs::{self, File, OpenOptions};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::os::unix::fs::MetadataExt;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant, SystemTime};

pub use std::{fmt, io, process::Command, str::FromStr};

pub use crate::cgi::{run_cgi, CgiError, CgiOutput};
pub use crate::connection::{ActiveAction, Connection};
pub use crate::handlers::{handle_delete, handle_get, handle_post};
pub use crate::router::RoutingError;
pub use crate::upload::{Upload, UploadError};

pub const READ_BUF_SIZE: usize = 4096;

// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;
pub const HTTP_UNSUPPORTED_MEDIA_TYPE: u16 = 415;

// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const HTTP_GATEWAY_TIMEOUT: u16 = 504;

pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_NO_CONTENT: u16 = 204;
pub const HTTP_MOVED_PERMANENTLY: u16 = 301;
pub const HTTP_FOUND: u16 = 302;

pub const HEADER_CAP: usize = 8 * 1024;
pub const CGI_TIMEOUT: Duration = Duration::from_secs(3);
