//! Request descriptors and the builder that produces them.
//!
//! A [`RequestDescriptor`] is a fully resolved call: method, path with all
//! positional arguments substituted, ordered query parameters and headers,
//! and an optional body. Descriptors are built per call with
//! [`RequestDescriptor::builder`] and handed to the
//! [`PartnerClient`](crate::PartnerClient).

use crate::{Error, Result};
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Query parameter carrying the page offset.
pub const OFFSET_PARAM: &str = "offset";

/// Query parameter carrying the page size.
pub const SIZE_PARAM: &str = "size";

mod sealed {
    pub trait Sealed {}
}

/// A value that can be substituted into a path template.
///
/// Only implemented for types whose textual form does not depend on the
/// host's locale, so a path built on one machine is the path built on any
/// other.
pub trait PathArg: sealed::Sealed {
    /// Formats the value for a path segment.
    fn to_path_segment(&self) -> String;
}

macro_rules! impl_path_arg {
    ($($t:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}
            impl PathArg for $t {
                fn to_path_segment(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_path_arg!(
    str, String, bool, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    Uuid,
);

impl<T: PathArg + ?Sized> sealed::Sealed for &T {}

impl<T: PathArg + ?Sized> PathArg for &T {
    fn to_path_segment(&self) -> String {
        (**self).to_path_segment()
    }
}

/// How a collection request is paged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// Index-based paging through `offset` and `size` query parameters.
    Offset { offset: u32, size: u32 },
    /// Seek-based paging through an opaque continuation token header.
    Continuation(String),
}

/// A body attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON value, encoded by the call's converter at send time.
    Json(serde_json::Value),
    /// Pre-encoded bytes sent as-is.
    Raw { content: Bytes, content_type: String },
    /// A multipart form, rebuilt for every attempt.
    Multipart(Vec<MultipartPart>),
}

/// One part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// A fully resolved call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    continuation_token: Option<String>,
    path_already_built: bool,
    cancellation: Option<CancellationToken>,
}

impl RequestDescriptor {
    /// Starts building a request for `method` against `template`.
    ///
    /// # Examples
    ///
    /// ```
    /// use partner_client::RequestDescriptor;
    /// use http::Method;
    ///
    /// let request = RequestDescriptor::builder(Method::GET, "customers/{0}/subscriptions/{1}")
    ///     .arg("cust-1")
    ///     .arg(42)
    ///     .query("status", "active")
    ///     .query("status", "suspended")
    ///     .build()?;
    ///
    /// assert_eq!(request.path(), "customers/cust-1/subscriptions/42");
    /// assert_eq!(request.query().len(), 2);
    /// # Ok::<(), partner_client::Error>(())
    /// ```
    pub fn builder(method: Method, template: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            template: template.into(),
            args: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            pagination: None,
            path_already_built: false,
            cancellation: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The resolved path. For already-built paths this may be an absolute URI.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order, duplicates included.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Extra headers in insertion order, duplicates included.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Seek-pagination token to send in the continuation header.
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    pub fn is_path_already_built(&self) -> bool {
        self.path_already_built
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Resolves the absolute URL of this request.
    ///
    /// Templated paths are placed under `base` and `api_version`, then the
    /// query parameters are appended in order. Already-built paths (link URIs)
    /// are used verbatim: absolute URIs as-is, relative ones joined to `base`,
    /// and no query parameters are added.
    pub fn resolve_url(&self, base: &Url, api_version: &str) -> Result<Url> {
        if self.path_already_built {
            return match Url::parse(&self.path) {
                Ok(url) => Ok(url),
                Err(url::ParseError::RelativeUrlWithoutBase) => Ok(base.join(&self.path)?),
                Err(e) => Err(e.into()),
            };
        }

        let path = self.path.trim_start_matches('/');
        let version = api_version.trim_matches('/');
        let relative = if version.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", version, path)
        };

        let mut url = base.join(&relative)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Fluent builder for [`RequestDescriptor`].
#[derive(Debug)]
#[must_use]
pub struct RequestBuilder {
    method: Method,
    template: String,
    args: Vec<String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    pagination: Option<Pagination>,
    path_already_built: bool,
    cancellation: Option<CancellationToken>,
}

impl RequestBuilder {
    /// Appends the next positional argument (`{0}`, then `{1}`, ...).
    pub fn arg(mut self, value: impl PathArg) -> Self {
        self.args.push(value.to_path_segment());
        self
    }

    /// Appends a query parameter. Repeated keys are kept.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header. Repeated keys are kept and all reach the wire.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attaches a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if `body` cannot be represented as JSON.
    pub fn json_body<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value =
            serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    /// Attaches pre-encoded bytes.
    pub fn raw_body(mut self, content: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Raw {
            content: content.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// Adds a file part to a multipart form body.
    pub fn multipart_file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let part = MultipartPart {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            content: content.into(),
        };
        match &mut self.body {
            Some(RequestBody::Multipart(parts)) => parts.push(part),
            _ => self.body = Some(RequestBody::Multipart(vec![part])),
        }
        self
    }

    /// Pages the request by offset/size or continuation token.
    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Marks the template as a finished path (a hypermedia link URI).
    ///
    /// No substitution is performed and query parameters are never appended,
    /// since the URI already carries them.
    pub fn path_already_built(mut self) -> Self {
        self.path_already_built = true;
        self
    }

    /// Attaches a token that aborts the call when cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Resolves the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] for a malformed template, a placeholder
    /// without an argument, an argument without a placeholder, an empty
    /// argument, a `.` or `..` argument, one containing `/`, `?`, `#` or a
    /// control character, and a zero page size. Other characters in
    /// arguments are percent-encoded.
    pub fn build(self) -> Result<RequestDescriptor> {
        let mut query = self.query;
        let mut continuation_token = None;

        match self.pagination {
            Some(Pagination::Offset { offset, size }) => {
                if size == 0 {
                    return Err(Error::Argument("page size must be greater than zero".to_string()));
                }
                query.push((OFFSET_PARAM.to_string(), offset.to_string()));
                query.push((SIZE_PARAM.to_string(), size.to_string()));
            }
            Some(Pagination::Continuation(token)) => {
                if token.is_empty() {
                    return Err(Error::Argument(
                        "continuation token must not be empty".to_string(),
                    ));
                }
                continuation_token = Some(token);
            }
            None => {}
        }

        let path = if self.path_already_built {
            if self.template.is_empty() {
                return Err(Error::Argument("link URI must not be empty".to_string()));
            }
            if !query.is_empty() {
                tracing::debug!(
                    path = %self.template,
                    dropped = query.len(),
                    "Ignoring query parameters for an already-built path"
                );
                query.clear();
            }
            self.template
        } else {
            format_template(&self.template, &self.args)?
        };

        Ok(RequestDescriptor {
            method: self.method,
            path,
            query,
            headers: self.headers,
            body: self.body,
            continuation_token,
            path_already_built: self.path_already_built,
            cancellation: self.cancellation,
        })
    }
}

/// Substitutes `{0}`, `{1}`, ... in `template`. `{{` and `}}` are literal braces.
///
/// Each argument lands as exactly one percent-encoded path segment.
fn format_template(template: &str, args: &[String]) -> Result<String> {
    let mut segments = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        if arg.is_empty() {
            return Err(Error::Argument(format!("path argument {} is empty", index)));
        }
        if arg == "." || arg == ".." {
            return Err(Error::Argument(format!(
                "path argument {} is a dot segment: {:?}",
                index, arg
            )));
        }
        if arg.contains(['/', '?', '#']) || arg.chars().any(char::is_control) {
            return Err(Error::Argument(format!(
                "path argument {} contains a reserved character: {:?}",
                index, arg
            )));
        }
        segments.push(urlencoding::encode(arg));
    }

    let mut out = String::with_capacity(template.len());
    let mut used = vec![false; args.len()];
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        _ => {
                            return Err(Error::Argument(format!(
                                "malformed placeholder in path template {:?}",
                                template
                            )))
                        }
                    }
                }
                let index: usize = digits.parse().map_err(|_| {
                    Error::Argument(format!("empty placeholder in path template {:?}", template))
                })?;
                let segment = segments.get(index).ok_or_else(|| {
                    Error::Argument(format!(
                        "path template {:?} references argument {} but only {} were supplied",
                        template,
                        index,
                        args.len()
                    ))
                })?;
                used[index] = true;
                out.push_str(segment);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(Error::Argument(format!(
                    "unmatched '}}' in path template {:?}",
                    template
                )))
            }
            other => out.push(other),
        }
    }

    if let Some(unused) = used.iter().position(|u| !u) {
        return Err(Error::Argument(format!(
            "path argument {} is not referenced by template {:?}",
            unused, template
        )));
    }

    Ok(out)
}
