use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use kernel::FileProperties;

/// File content with the stored content headers attached.
pub struct FileReply {
    data: Vec<u8>,
    file: FileProperties,
    whole: bool,
}

impl FileReply {
    /// `whole` tells whether `data` is the complete file, which is the only
    /// case the stored Content-MD5 describes.
    #[must_use]
    pub fn new(data: Vec<u8>, file: FileProperties, whole: bool) -> Self {
        Self { data, file, whole }
    }

    fn name_from_path(&self) -> &str {
        let path = &self.file.path;
        if let Some(ix) = path.rfind(&['\\', '/']) {
            &path[ix + 1..]
        } else {
            path
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let stored = &self.file.headers;

        let content_type = stored
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        insert(&mut headers, header::CONTENT_TYPE, content_type);

        match &stored.content_disposition {
            Some(disposition) => insert(&mut headers, header::CONTENT_DISPOSITION, disposition),
            None => {
                let attachment = format!(r#"attachment; filename="{}""#, self.name_from_path());
                insert(&mut headers, header::CONTENT_DISPOSITION, &attachment);
            }
        }
        if let Some(encoding) = &stored.content_encoding {
            insert(&mut headers, header::CONTENT_ENCODING, encoding);
        }
        if let Some(language) = &stored.content_language {
            insert(&mut headers, header::CONTENT_LANGUAGE, language);
        }
        if let Some(cache_control) = &stored.cache_control {
            insert(&mut headers, header::CACHE_CONTROL, cache_control);
        }
        if self.whole {
            if let Some(md5) = &stored.content_md5 {
                insert(&mut headers, HeaderName::from_static("content-md5"), md5);
            }
        }
        insert(&mut headers, header::ETAG, &self.file.etag);
        insert(
            &mut headers,
            header::LAST_MODIFIED,
            &self
                .file
                .last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        );
        insert(
            &mut headers,
            header::CONTENT_LENGTH,
            &self.data.len().to_string(),
        );
        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(val) = HeaderValue::from_str(value) {
        headers.insert(name, val);
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let headers = self.headers();
        let mut res = Body::from(self.data).into_response();
        res.headers_mut().extend(headers);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kernel::{FileHeaders, Metadata};
    use rstest::rstest;

    fn properties(path: &str, headers: FileHeaders) -> FileProperties {
        FileProperties {
            path: path.to_owned(),
            length: 3,
            headers,
            last_modified: Utc::now(),
            etag: "\"0xABC\"".to_owned(),
            metadata: Metadata::new(),
            copy: None,
        }
    }

    #[rstest]
    #[case("", "")]
    #[case("file.ext", "file.ext")]
    #[case("dir/file.ext", "file.ext")]
    #[case("dir1/dir2/file.ext", "file.ext")]
    #[trace]
    fn name_from_path(#[case] path: &str, #[case] expected: &str) {
        // Arrange
        let reply = FileReply::new(Vec::new(), properties(path, FileHeaders::default()), true);

        // Act
        let name = reply.name_from_path();

        // Assert
        assert_eq!(name, expected);
    }

    #[test]
    fn stored_headers_are_returned() {
        // Arrange
        let headers = FileHeaders {
            content_type: Some("text/plain".to_owned()),
            content_language: Some("en".to_owned()),
            content_md5: Some("rL0Y20zC+Fzt72VPzMSk2A==".to_owned()),
            ..FileHeaders::default()
        };
        let reply = FileReply::new(b"foo".to_vec(), properties("d/f.txt", headers), true);

        // Act
        let response = reply.into_response();

        // Assert
        let h = response.headers();
        assert_eq!(h[header::CONTENT_TYPE], "text/plain");
        assert_eq!(h[header::CONTENT_LANGUAGE], "en");
        assert_eq!(h[header::CONTENT_DISPOSITION], r#"attachment; filename="f.txt""#);
        assert_eq!(h["content-md5"], "rL0Y20zC+Fzt72VPzMSk2A==");
        assert_eq!(h[header::CONTENT_LENGTH], "3");
    }

    #[test]
    fn partial_reads_omit_md5() {
        // Arrange
        let headers = FileHeaders {
            content_md5: Some("rL0Y20zC+Fzt72VPzMSk2A==".to_owned()),
            ..FileHeaders::default()
        };
        let reply = FileReply::new(b"f".to_vec(), properties("f", headers), false);

        // Act
        let response = reply.into_response();

        // Assert
        assert!(response.headers().get("content-md5").is_none());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    }
}
