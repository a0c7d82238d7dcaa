use std::sync::Arc;

use kernel::{
    CreateShareRequest, Metadata, MetadataBody, QuotaRequest, ShareProperties, ShareStats,
};
use reqwest::{Method, RequestBuilder};

use crate::directory::DirectoryClient;
use crate::error::{Error, Result};
use crate::file::FileClient;
use crate::service::{Condition, Transport};

/// Settings applied atomically when a share is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateShareOptions {
    /// Quota in GiB, the service maximum when `None`
    pub quota: Option<u32>,
    pub metadata: Metadata,
}

/// Handle of a share.
#[derive(Clone, Debug)]
pub struct ShareClient {
    transport: Arc<Transport>,
    name: String,
}

impl ShareClient {
    pub(crate) fn new(transport: Arc<Transport>, name: &str) -> Self {
        Self {
            transport,
            name: name.to_owned(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Request to `/shares/{name}` followed by `tail`.
    pub(crate) fn request(&self, method: Method, tail: &[&str]) -> RequestBuilder {
        let mut segments = vec!["shares", self.name.as_str()];
        segments.extend_from_slice(tail);
        self.transport.request(method, &segments)
    }

    /// Fails with [`Error::AlreadyExists`] when the share is present.
    pub async fn create(&self, options: &CreateShareOptions) -> Result<ShareProperties> {
        let body = CreateShareRequest {
            quota: options.quota,
            metadata: options.metadata.clone(),
        };
        let request = self.request(Method::PUT, &[]).json(&body);
        self.transport.json(request).await
    }

    /// `true` when the share was created by this call.
    pub async fn create_if_absent(&self, options: &CreateShareOptions) -> Result<bool> {
        match self.create(options).await {
            Ok(_) => Ok(true),
            Err(Error::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_properties(&self) -> Result<ShareProperties> {
        let request = self.request(Method::GET, &[]);
        self.transport.json(request).await
    }

    /// Sets the quota in GiB, 1 to 5120.
    pub async fn set_quota(&self, quota: u32, condition: &Condition) -> Result<ShareProperties> {
        let request = condition.apply(
            self.request(Method::PUT, &["quota"])
                .json(&QuotaRequest { quota }),
        );
        self.transport.json(request).await
    }

    /// Replaces the whole metadata map.
    pub async fn set_metadata(
        &self,
        metadata: &Metadata,
        condition: &Condition,
    ) -> Result<ShareProperties> {
        let body = MetadataBody {
            metadata: metadata.clone(),
        };
        let request = condition.apply(self.request(Method::PUT, &["metadata"]).json(&body));
        self.transport.json(request).await
    }

    pub async fn get_metadata(&self) -> Result<Metadata> {
        let request = self.request(Method::GET, &["metadata"]);
        let body: MetadataBody = self.transport.json(request).await?;
        Ok(body.metadata)
    }

    /// Bytes declared by the files of the share and their count.
    pub async fn get_stats(&self) -> Result<ShareStats> {
        let request = self.request(Method::GET, &["stats"]);
        self.transport.json(request).await
    }

    /// Deletes the share with everything in it.
    pub async fn delete(&self) -> Result<()> {
        let request = self.request(Method::DELETE, &[]);
        self.transport.send(request).await?;
        Ok(())
    }

    /// `false` when there was no such share.
    pub async fn delete_if_exists(&self) -> Result<bool> {
        match self.delete().await {
            Ok(()) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn root(&self) -> DirectoryClient {
        DirectoryClient::new(self.clone(), "")
    }

    /// Directory at `path`, components separated by `/`.
    #[must_use]
    pub fn directory(&self, path: &str) -> DirectoryClient {
        DirectoryClient::new(self.clone(), path)
    }

    /// File at `path`, components separated by `/`.
    #[must_use]
    pub fn file(&self, path: &str) -> FileClient {
        FileClient::new(self.clone(), path)
    }
}
