//! Response writers the renderer can target

use std::io;

use http::{HeaderMap, StatusCode};

/// A byte sink that may also expose response headers.
///
/// When `headers_mut` returns `None` the CSP only reaches the page through
/// the `{{ csp }}` meta tag.
pub trait ResponseWriter: io::Write {
    fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        None
    }
}

impl ResponseWriter for Vec<u8> {}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        (**self).headers_mut()
    }
}

/// A buffered HTTP response with mutable headers
#[derive(Debug, Default)]
pub struct Response {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header value as a string, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Convert into an `http::Response` with status 200
    pub fn into_http(self) -> http::Response<Vec<u8>> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = StatusCode::OK;
        *response.headers_mut() = self.headers;
        response
    }
}

impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for Response {
    fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        Some(&mut self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plain_buffer_has_no_headers() {
        let mut out: Vec<u8> = Vec::new();
        assert!(out.headers_mut().is_none());
    }

    #[test]
    fn test_response_collects_body_and_headers() {
        let mut response = Response::new();
        response.write_all(b"<p>hi</p>").unwrap();
        response
            .headers_mut()
            .unwrap()
            .insert("x-test", "1".parse().unwrap());
        assert_eq!(response.body_str(), Some("<p>hi</p>"));
        assert_eq!(response.header("x-test"), Some("1"));

        let http = response.into_http();
        assert_eq!(http.status(), StatusCode::OK);
        assert_eq!(http.body().as_slice(), b"<p>hi</p>");
    }
}
