//! Request body reading and parsing.
//!
//! Bodies are read up to the configured limit and parsed by content type:
//!
//! | Content type | Result |
//! |---|---|
//! | `application/json`, `*/*+json` | `RequestBody::Json` |
//! | `application/x-www-form-urlencoded` | `RequestBody::Form` |
//! | `multipart/form-data` | `RequestBody::Form` plus uploaded files |
//! | `text/*` | `RequestBody::Text` |
//! | anything else | `RequestBody::Raw` |

use bytes::Bytes;
use futures_util::stream;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use mime::Mime;
use serde_json::{Map, Value};
use trellis_core::{RequestBody, UploadedFile};

use crate::error::BodyError;

/// A parsed request body and any uploaded files.
#[derive(Debug, Default)]
pub struct ParsedBody {
    /// The body.
    pub body: RequestBody,
    /// Files from a multipart body.
    pub files: Vec<UploadedFile>,
}

/// Reads `body` into memory, failing past `limit` bytes.
pub async fn read<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge { limit }),
        Err(err) => Err(BodyError::Read(err.to_string())),
    }
}

/// Parses `bytes` according to `content_type`.
pub async fn parse(content_type: Option<&str>, bytes: Bytes) -> Result<ParsedBody, BodyError> {
    if bytes.is_empty() {
        return Ok(ParsedBody::default());
    }

    let Some(content_type) = content_type else {
        return Ok(raw(bytes));
    };
    let Ok(mime) = content_type.parse::<Mime>() else {
        return Ok(raw(bytes));
    };

    let body = match (mime.type_(), mime.subtype()) {
        (mime::MULTIPART, mime::FORM_DATA) => return multipart(content_type, bytes).await,
        (_, mime::JSON) => RequestBody::Json(serde_json::from_slice(&bytes)?),
        _ if mime.suffix() == Some(mime::JSON) => RequestBody::Json(serde_json::from_slice(&bytes)?),
        (mime::APPLICATION, mime::WWW_FORM_URLENCODED) => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)?;
            let mut form = Map::new();
            for (name, value) in pairs {
                insert_field(&mut form, name, Value::String(value));
            }
            RequestBody::Form(form)
        }
        (mime::TEXT, _) => RequestBody::Text(String::from_utf8_lossy(&bytes).into_owned()),
        _ => return Ok(raw(bytes)),
    };

    Ok(ParsedBody {
        body,
        files: Vec::new(),
    })
}

fn raw(bytes: Bytes) -> ParsedBody {
    ParsedBody {
        body: RequestBody::Raw(bytes),
        files: Vec::new(),
    }
}

async fn multipart(content_type: &str, bytes: Bytes) -> Result<ParsedBody, BodyError> {
    let boundary = multer::parse_boundary(content_type)?;
    let source = stream::once(async move { Ok::<_, std::io::Error>(bytes) });
    let mut multipart = multer::Multipart::new(source, boundary);

    let mut form = Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_owned);
        let field_type = field.content_type().map(ToString::to_string);

        match file_name {
            Some(file_name) => {
                let mut file = UploadedFile::new(name, field.bytes().await?).with_file_name(file_name);
                if let Some(field_type) = field_type {
                    file = file.with_content_type(field_type);
                }
                files.push(file);
            }
            None => {
                let text = field.text().await?;
                insert_field(&mut form, name, Value::String(text));
            }
        }
    }

    tracing::trace!(fields = form.len(), files = files.len(), "multipart body parsed");
    Ok(ParsedBody {
        body: RequestBody::Form(form),
        files,
    })
}

/// Repeated names collect into an array.
fn insert_field(form: &mut Map<String, Value>, name: String, value: Value) {
    match form.get_mut(&name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            form.insert(name, value);
        }
    }
}
