use std::sync::Arc;
use std::time::Duration;

use kernel::{ErrorBody, ServiceProperties, ShareItem};
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::account::Account;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::share::ShareClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport settings of a [`FileServiceClient`].
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Whole request timeout, none when `None`
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// Optimistic concurrency guard for property and metadata writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Condition {
    #[default]
    Always,
    /// Write only while the resource still has this etag
    IfMatch(String),
}

impl Condition {
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Condition::Always => request,
            Condition::IfMatch(etag) => request.header(header::IF_MATCH, etag),
        }
    }
}

/// Connection shared by every handle derived from one client.
#[derive(Debug)]
pub(crate) struct Transport {
    http: reqwest::Client,
    base: Resource,
}

impl Transport {
    /// `{endpoint}/api/{account}` followed by `segments`, each percent-encoded.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut resource = self.base.clone();
        for segment in segments {
            resource.push_segment(segment);
        }
        resource.url().clone()
    }

    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http.request(method, self.url(segments))
    }

    /// Sends the request and turns every non-success status into an [`Error`].
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build().map_err(|e| Error::transport(&e))?;
        tracing::debug!("{} {}", request.method(), request.url());
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let status = status.as_u16();
        let text = response.text().await.map_err(|e| Error::transport(&e))?;
        tracing::debug!("status {status}: {text}");
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(Error::from_service(status, body)),
            Err(_) => Err(Error::unclassified(status, text)),
        }
    }

    pub(crate) async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response.json().await.map_err(|e| Error::transport(&e))
    }
}

/// Entry point of the facade, bound to one account.
///
/// Cloning is cheap; shares, directories and files derived from a client
/// reuse its connection pool.
#[derive(Clone, Debug)]
pub struct FileServiceClient {
    transport: Arc<Transport>,
    account: String,
}

impl FileServiceClient {
    pub fn new(account: &Account) -> Result<Self> {
        Self::with_options(account, ClientOptions::default())
    }

    pub fn with_options(account: &Account, options: ClientOptions) -> Result<Self> {
        let mut base = Resource::from_url(account.file_endpoint().clone()).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "{} cannot be a base URI",
                account.file_endpoint()
            ))
        })?;
        base.append_path("api").push_segment(account.name());

        let mut builder = reqwest::Client::builder().user_agent(options.user_agent);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            transport: Arc::new(Transport { http, base }),
            account: account.name().to_owned(),
        })
    }

    #[must_use]
    pub fn account_name(&self) -> &str {
        &self.account
    }

    /// Handle of a share; nothing is sent until an operation is called.
    #[must_use]
    pub fn share(&self, name: &str) -> ShareClient {
        ShareClient::new(Arc::clone(&self.transport), name)
    }

    /// Shares of the account ordered by name.
    pub async fn list_shares(&self) -> Result<Vec<ShareItem>> {
        let request = self.transport.request(Method::GET, &[]);
        self.transport.json(request).await
    }

    pub async fn get_properties(&self) -> Result<ServiceProperties> {
        let request = self.transport.request(Method::GET, &["properties"]);
        self.transport.json(request).await
    }

    pub async fn set_properties(&self, properties: &ServiceProperties) -> Result<()> {
        let request = self
            .transport
            .request(Method::PUT, &["properties"])
            .json(properties);
        self.transport.send(request).await?;
        Ok(())
    }
}
