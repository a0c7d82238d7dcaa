use url::Url;
use core::fmt;
use std::ops::Add;

const SEP: char = '/';

/// Service URI built segment by segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    url: Url,
}

impl Resource {
    #[must_use]
    pub fn new(uri: &str) -> Option<Resource> {
        let base = Url::parse(uri).ok()?;
        if base.cannot_be_a_base() {
            return None;
        }
        Some(Resource { url: base })
    }

    #[must_use]
    pub fn from_url(url: Url) -> Option<Resource> {
        if url.cannot_be_a_base() {
            None
        } else {
            Some(Resource { url })
        }
    }

    /// Appends `path` split at `/`; a trailing `/` is kept.
    pub fn append_path(&mut self, path: &str) -> &mut Self {
        if let Some(segments) = self.url.path_segments() {
            let p = segments
                .chain(path.split(SEP))
                .filter(|x| !x.is_empty())
                .fold(String::new(), |s, x| {
                    let mut y = s.add(x);
                    y.push(SEP);
                    y
                });

            let path_to_set = if path.chars().next_back().unwrap_or_default() == SEP {
                &p
            } else {
                &p[..p.len().saturating_sub(1)]
            };
            self.url.set_path(path_to_set);
        } else {
            let r = self.url.join(path);
            if let Ok(u) = r {
                self.url = u;
            }
        }
        self
    }

    /// Appends one segment verbatim; `/` inside it is percent-encoded.
    pub fn push_segment(&mut self, segment: &str) -> &mut Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn new_correct_some() {
        // Arrange

        // Act
        let r = Resource::new("http://localhost");

        // Assert
        assert!(r.is_some());
    }

    #[rstest]
    #[case("http/localhost")]
    #[case("mailto:ops@example.com")]
    #[trace]
    fn new_incorrect_none(#[case] uri: &str) {
        // Act
        let r = Resource::new(uri);

        // Assert
        assert!(r.is_none());
    }

    #[rstest]
    #[case("http://localhost", "x", "http://localhost/x")]
    #[case("http://localhost", "/x", "http://localhost/x")]
    #[case("http://localhost", "/x/", "http://localhost/x/")]
    #[case("http://localhost", "x/", "http://localhost/x/")]
    #[case("http://localhost", "/x/y/", "http://localhost/x/y/")]
    #[case("http://localhost/", "x", "http://localhost/x")]
    #[case("http://localhost/", "x/y", "http://localhost/x/y")]
    #[case("http://localhost/x", "y", "http://localhost/x/y")]
    #[case("http://localhost/x/", "/y/", "http://localhost/x/y/")]
    #[case("http://127.0.0.1:5000", "api", "http://127.0.0.1:5000/api")]
    #[case(
        "https://acc.file.core.windows.net/",
        "api/acc",
        "https://acc.file.core.windows.net/api/acc"
    )]
    #[trace]
    fn append_path_tests(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        // Arrange
        let mut r = Resource::new(base).unwrap();

        // Act
        r.append_path(path);

        // Assert
        assert_eq!(r.to_string().as_str(), expected);
    }

    #[test]
    fn append_path_twice() {
        // Arrange
        let mut r = Resource::new("http://localhost").unwrap();

        // Act
        r.append_path("x").append_path("y");

        // Assert
        assert_eq!(r.to_string().as_str(), "http://localhost/x/y");
    }

    #[rstest]
    #[case("http://localhost", "s1", "http://localhost/s1")]
    #[case("http://localhost/api/", "s1", "http://localhost/api/s1")]
    #[case("http://localhost/api", "a/b", "http://localhost/api/a%2Fb")]
    #[case("http://localhost/api", "a b", "http://localhost/api/a%20b")]
    #[trace]
    fn push_segment_tests(#[case] base: &str, #[case] segment: &str, #[case] expected: &str) {
        // Arrange
        let mut r = Resource::new(base).unwrap();

        // Act
        r.push_segment(segment);

        // Assert
        assert_eq!(r.to_string().as_str(), expected);
    }
}
