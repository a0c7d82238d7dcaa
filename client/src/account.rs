//! Connection string resolution.
//!
//! A connection string is a `;` separated list of `Key=Value` pairs:
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=<base64>;EndpointSuffix=core.windows.net
//! UseDevelopmentStorage=true
//! ```
//!
//! Everything is validated while parsing, so a malformed string never
//! reaches the network.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable read by [`Account::from_env`].
pub const CONNECTION_STRING_ENV: &str = "FSHARE_CONNECTION_STRING";

/// Account of the local emulator.
pub const DEVELOPMENT_ACCOUNT: &str = "devstoreaccount1";

/// Well known key of the local emulator account.
pub const DEVELOPMENT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Default endpoint of the local emulator.
pub const DEVELOPMENT_ENDPOINT: &str = "http://127.0.0.1:5000";

const DEVELOPMENT_PORT: u16 = 5000;
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

const PROTOCOL: &str = "DefaultEndpointsProtocol";
const ACCOUNT_NAME: &str = "AccountName";
const ACCOUNT_KEY: &str = "AccountKey";
const ENDPOINT_SUFFIX: &str = "EndpointSuffix";
const FILE_ENDPOINT: &str = "FileEndpoint";
const USE_DEVELOPMENT_STORAGE: &str = "UseDevelopmentStorage";
const DEVELOPMENT_PROXY: &str = "DevelopmentStorageProxyUri";

/// Validated account credentials and the file endpoint they address.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    name: String,
    key: Vec<u8>,
    file_endpoint: Url,
}

impl Account {
    /// Account on the public endpoint `https://{name}.file.core.windows.net`.
    pub fn new(name: &str, key: &str) -> Result<Self> {
        validate_name(name)?;
        let key = decode_key(key)?;
        let file_endpoint = parse_endpoint(&format!(
            "https://{name}.file.{DEFAULT_ENDPOINT_SUFFIX}"
        ))?;
        Ok(Self {
            name: name.to_owned(),
            key,
            file_endpoint,
        })
    }

    /// The local emulator account on [`DEVELOPMENT_ENDPOINT`].
    #[must_use]
    pub fn development() -> Self {
        Self {
            name: DEVELOPMENT_ACCOUNT.to_owned(),
            key: general_purpose::STANDARD
                .decode(DEVELOPMENT_KEY)
                .unwrap_or_default(),
            file_endpoint: Url::parse(DEVELOPMENT_ENDPOINT)
                .unwrap_or_else(|_| unreachable!("development endpoint is a valid URI")),
        }
    }

    /// Replaces the file endpoint, e.g. to reach an emulator on another port.
    pub fn with_file_endpoint(mut self, uri: &str) -> Result<Self> {
        self.file_endpoint = parse_endpoint(uri)?;
        Ok(self)
    }

    /// Parses the connection string in [`CONNECTION_STRING_ENV`].
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(CONNECTION_STRING_ENV).map_err(|_| {
            Error::InvalidConfiguration(format!("{CONNECTION_STRING_ENV} is not set"))
        })?;
        value.parse()
    }

    pub fn parse(connection_string: &str) -> Result<Self> {
        let settings = split_settings(connection_string)?;

        if is_development(&settings)? {
            return development_from(&settings);
        }

        let protocol = match settings.get(PROTOCOL).copied() {
            None | Some("https") => "https",
            Some("http") => "http",
            Some(other) => {
                return Err(Error::InvalidConfiguration(format!(
                    "unsupported protocol `{other}`, expected http or https"
                )));
            }
        };
        let name = settings
            .get(ACCOUNT_NAME)
            .ok_or_else(|| Error::InvalidConfiguration(format!("{ACCOUNT_NAME} is missing")))?;
        validate_name(name)?;
        let key = settings
            .get(ACCOUNT_KEY)
            .ok_or_else(|| Error::InvalidConfiguration(format!("{ACCOUNT_KEY} is missing")))?;
        let key = decode_key(key)?;

        let file_endpoint = match settings.get(FILE_ENDPOINT) {
            Some(uri) => parse_endpoint(uri)?,
            None => {
                let suffix = settings
                    .get(ENDPOINT_SUFFIX)
                    .copied()
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                parse_endpoint(&format!("{protocol}://{name}.file.{suffix}"))?
            }
        };

        Ok(Self {
            name: (*name).to_owned(),
            key,
            file_endpoint,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded account key.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn file_endpoint(&self) -> &Url {
        &self.file_endpoint
    }
}

impl FromStr for Account {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Account::parse(s)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .field("file_endpoint", &self.file_endpoint.as_str())
            .finish()
    }
}

fn split_settings(connection_string: &str) -> Result<HashMap<&str, &str>> {
    let mut settings = HashMap::new();
    for segment in connection_string
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let Some((key, value)) = segment.split_once('=') else {
            return Err(Error::InvalidConfiguration(format!(
                "`{segment}` is not a Key=Value pair"
            )));
        };
        let key = key.trim();
        if settings.insert(key, value.trim()).is_some() {
            return Err(Error::InvalidConfiguration(format!(
                "`{key}` is given more than once"
            )));
        }
    }
    Ok(settings)
}

fn is_development(settings: &HashMap<&str, &str>) -> Result<bool> {
    match settings.get(USE_DEVELOPMENT_STORAGE) {
        None => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(Error::InvalidConfiguration(format!(
            "{USE_DEVELOPMENT_STORAGE} must be true or false, got `{v}`"
        ))),
    }
}

fn development_from(settings: &HashMap<&str, &str>) -> Result<Account> {
    for key in [ACCOUNT_NAME, ACCOUNT_KEY] {
        if settings.contains_key(key) {
            return Err(Error::InvalidConfiguration(format!(
                "{key} cannot be combined with {USE_DEVELOPMENT_STORAGE}"
            )));
        }
    }
    let mut account = Account::development();
    if let Some(proxy) = settings.get(DEVELOPMENT_PROXY) {
        let mut endpoint = parse_endpoint(proxy)?;
        if endpoint.port().is_none() {
            endpoint
                .set_port(Some(DEVELOPMENT_PORT))
                .map_err(|()| Error::InvalidConfiguration(format!("`{proxy}` cannot have a port")))?;
        }
        account.file_endpoint = endpoint;
    }
    if let Some(uri) = settings.get(FILE_ENDPOINT) {
        account.file_endpoint = parse_endpoint(uri)?;
    }
    Ok(account)
}

fn validate_name(name: &str) -> Result<()> {
    let valid = (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "account name `{name}` must be 3 to 24 lowercase letters or digits"
        )))
    }
}

fn decode_key(key: &str) -> Result<Vec<u8>> {
    match general_purpose::STANDARD.decode(key) {
        Ok(decoded) if !decoded.is_empty() => Ok(decoded),
        Ok(_) => Err(Error::InvalidConfiguration("account key is empty".to_owned())),
        Err(e) => Err(Error::InvalidConfiguration(format!(
            "account key is not valid base64: {e}"
        ))),
    }
}

fn parse_endpoint(uri: &str) -> Result<Url> {
    let url = Url::parse(uri)
        .map_err(|e| Error::InvalidConfiguration(format!("invalid endpoint `{uri}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidConfiguration(format!(
            "endpoint `{uri}` must be an http or https URI with a host"
        )));
    }
    Ok(url)
}
