use kernel::{MAX_SHARE_QUOTA_GB, Metadata, ServiceProperties};

use crate::domain::{Result, StorageError};

const MAX_COMPONENT_LEN: usize = 255;
const MAX_METADATA_SIZE: usize = 8 * 1024;
const MAX_RETENTION_DAYS: u32 = 365;
const INVALID_CHARS: &[char] = &['"', '\\', '/', ':', '|', '<', '>', '*', '?'];

pub fn share_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(StorageError::InvalidName {
            name: name.to_owned(),
            reason,
        })
    };
    if !(2..=63).contains(&name.len()) {
        return invalid("share names must be from 2 through 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("share names may contain only lowercase letters, digits and dashes");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("share names must start and end with a letter or digit");
    }
    if name.contains("--") {
        return invalid("share names may not contain consecutive dashes");
    }
    Ok(())
}

pub fn component(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(StorageError::InvalidName {
            name: name.to_owned(),
            reason,
        })
    };
    if name.is_empty() || name.len() > MAX_COMPONENT_LEN {
        return invalid("names must be from 1 through 255 characters long");
    }
    if name == "." || name == ".." {
        return invalid("relative components are not allowed");
    }
    if name
        .chars()
        .any(|c| c.is_control() || INVALID_CHARS.contains(&c))
    {
        return invalid("name contains a forbidden character");
    }
    Ok(())
}

/// Drops empty segments and validates every remaining component.
pub fn normalize_path(path: &str) -> Result<String> {
    let mut normalized = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        component(segment)?;
        if !normalized.is_empty() {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    Ok(normalized)
}

pub fn metadata(metadata: &Metadata) -> Result<()> {
    let mut size = 0;
    for (key, value) in metadata {
        let mut chars = key.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StorageError::InvalidMetadata(format!(
                "`{key}` is not a valid metadata name"
            )));
        }
        size += key.len() + value.len();
    }
    if size > MAX_METADATA_SIZE {
        return Err(StorageError::InvalidMetadata(format!(
            "metadata takes {size} bytes, at most {MAX_METADATA_SIZE} are allowed"
        )));
    }
    Ok(())
}

pub fn quota(quota: u32) -> Result<()> {
    if (1..=MAX_SHARE_QUOTA_GB).contains(&quota) {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(format!(
            "quota must be from 1 through {MAX_SHARE_QUOTA_GB} GiB, got {quota}"
        )))
    }
}

pub fn service_properties(properties: &ServiceProperties) -> Result<()> {
    for metrics in [&properties.hour_metrics, &properties.minute_metrics] {
        if let Some(days) = metrics.retention_days {
            if !(1..=MAX_RETENTION_DAYS).contains(&days) {
                return Err(StorageError::InvalidInput(format!(
                    "retention must be from 1 through {MAX_RETENTION_DAYS} days, got {days}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::MetricsProperties;
    use rstest::rstest;

    #[rstest]
    #[case("abc", true)]
    #[case("share-1", true)]
    #[case("filebasics0a1b2c", true)]
    #[case("s1", true)]
    #[case("s", false)]
    #[case("Share", false)]
    #[case("-share", false)]
    #[case("share-", false)]
    #[case("sh--are", false)]
    #[case("sh_are", false)]
    #[trace]
    fn share_names(#[case] name: &str, #[case] valid: bool) {
        // Act
        let result = share_name(name);

        // Assert
        assert_eq!(result.is_ok(), valid);
    }

    #[rstest]
    #[case("file.txt", true)]
    #[case("dir-0a1b", true)]
    #[case("with space", true)]
    #[case("..", false)]
    #[case("a:b", false)]
    #[case("a*b", false)]
    #[case("a\\b", false)]
    #[case("tab\there", false)]
    #[trace]
    fn components(#[case] name: &str, #[case] valid: bool) {
        // Act
        let result = component(name);

        // Assert
        assert_eq!(result.is_ok(), valid);
    }

    #[test]
    fn component_length_limit() {
        // Arrange
        let name = "x".repeat(256);

        // Act
        let result = component(&name);

        // Assert
        assert!(result.is_err());
    }

    #[rstest]
    #[case("", "")]
    #[case("/", "")]
    #[case("d1", "d1")]
    #[case("/d1//d2/", "d1/d2")]
    #[trace]
    fn normalize(#[case] path: &str, #[case] expected: &str) {
        // Act
        let normalized = normalize_path(path).unwrap();

        // Assert
        assert_eq!(normalized, expected);
    }

    #[rstest]
    #[case("key1", true)]
    #[case("_foo", true)]
    #[case("foo_bar2", true)]
    #[case("1key", false)]
    #[case("foo-bar", false)]
    #[case("", false)]
    #[trace]
    fn metadata_names(#[case] key: &str, #[case] valid: bool) {
        // Arrange
        let mut map = Metadata::new();
        map.insert(key.to_owned(), "value".to_owned());

        // Act
        let result = metadata(&map);

        // Assert
        assert_eq!(result.is_ok(), valid);
    }

    #[test]
    fn metadata_size_limit() {
        // Arrange
        let mut map = Metadata::new();
        map.insert("big".to_owned(), "v".repeat(MAX_METADATA_SIZE));

        // Act
        let result = metadata(&map);

        // Assert
        assert!(matches!(result, Err(StorageError::InvalidMetadata(_))));
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(5120, true)]
    #[case(5121, false)]
    #[trace]
    fn quotas(#[case] value: u32, #[case] valid: bool) {
        // Act
        let result = quota(value);

        // Assert
        assert_eq!(result.is_ok(), valid);
    }

    #[test]
    fn retention_out_of_range() {
        // Arrange
        let properties = ServiceProperties {
            hour_metrics: MetricsProperties {
                retention_days: Some(0),
                ..MetricsProperties::default()
            },
            ..ServiceProperties::default()
        };

        // Act
        let result = service_properties(&properties);

        // Assert
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }
}
