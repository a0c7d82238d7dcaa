use std::collections::VecDeque;

use futures::{stream, Stream};
use kernel::{
    join_path, DirectoryProperties, ItemKind, ListItem, ListPage, Metadata, MetadataBody,
};
use reqwest::{Method, RequestBuilder};

use crate::error::{Error, Result};
use crate::file::FileClient;
use crate::service::Condition;
use crate::share::ShareClient;

/// Handle of a directory, the share root when its path is empty.
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    share: ShareClient,
    path: String,
}

/// Entry produced by [`DirectoryClient::list_children`].
#[derive(Clone, Debug)]
pub enum Child {
    Directory(DirectoryClient),
    File { client: FileClient, length: u64 },
}

impl Child {
    /// Path inside the share.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Child::Directory(dir) => dir.path(),
            Child::File { client, .. } => client.path(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ItemKind {
        match self {
            Child::Directory(_) => ItemKind::Directory,
            Child::File { .. } => ItemKind::File,
        }
    }
}

impl DirectoryClient {
    pub(crate) fn new(share: ShareClient, path: &str) -> Self {
        Self {
            share,
            path: join_path(path, ""),
        }
    }

    /// Path inside the share, empty for the root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn share(&self) -> &ShareClient {
        &self.share
    }

    fn request(&self, method: Method, tail: &[&str]) -> RequestBuilder {
        self.share
            .request(method, tail)
            .query(&[("path", self.path.as_str())])
    }

    /// Fails with [`Error::AlreadyExists`] when the name is taken and with
    /// [`Error::NotFound`] when the parent is missing.
    pub async fn create(&self, metadata: &Metadata) -> Result<DirectoryProperties> {
        let body = MetadataBody {
            metadata: metadata.clone(),
        };
        let request = self.request(Method::PUT, &["directory"]).json(&body);
        self.share.transport().json(request).await
    }

    /// `true` when the directory was created by this call.
    pub async fn create_if_absent(&self, metadata: &Metadata) -> Result<bool> {
        match self.create(metadata).await {
            Ok(_) => Ok(true),
            Err(Error::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_properties(&self) -> Result<DirectoryProperties> {
        let request = self.request(Method::GET, &["directory"]);
        self.share.transport().json(request).await
    }

    /// Replaces the whole metadata map.
    pub async fn set_metadata(
        &self,
        metadata: &Metadata,
        condition: &Condition,
    ) -> Result<DirectoryProperties> {
        let body = MetadataBody {
            metadata: metadata.clone(),
        };
        let request =
            condition.apply(self.request(Method::PUT, &["directory", "metadata"]).json(&body));
        self.share.transport().json(request).await
    }

    pub async fn get_metadata(&self) -> Result<Metadata> {
        let request = self.request(Method::GET, &["directory", "metadata"]);
        let body: MetadataBody = self.share.transport().json(request).await?;
        Ok(body.metadata)
    }

    /// Fails with [`Error::NotEmpty`] while the directory has children.
    pub async fn delete(&self) -> Result<()> {
        let request = self.request(Method::DELETE, &["directory"]);
        self.share.transport().send(request).await?;
        Ok(())
    }

    /// `false` when there was no such directory.
    pub async fn delete_if_exists(&self) -> Result<bool> {
        match self.delete().await {
            Ok(()) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// One page of children, a single round trip.
    pub async fn list_page(&self, marker: Option<&str>, max: Option<u32>) -> Result<ListPage> {
        let mut request = self.request(Method::GET, &["list"]);
        if let Some(marker) = marker {
            request = request.query(&[("marker", marker)]);
        }
        if let Some(max) = max {
            request = request.query(&[("maxresults", max)]);
        }
        self.share.transport().json(request).await
    }

    /// Children in the order the service returns them, fetched page by page
    /// as the stream is polled. The stream ends after the first error.
    pub fn list_children(&self) -> impl Stream<Item = Result<Child>> + Send + 'static {
        let listing = Listing::new(self.clone());
        stream::try_unfold(listing, |mut listing| async move {
            let item = listing.next_item().await?;
            Ok::<_, Error>(item.map(|item| (listing.directory().child(item), listing)))
        })
    }

    #[must_use]
    pub fn subdirectory(&self, name: &str) -> DirectoryClient {
        DirectoryClient::new(self.share.clone(), &join_path(&self.path, name))
    }

    #[must_use]
    pub fn file(&self, name: &str) -> FileClient {
        FileClient::new(self.share.clone(), &join_path(&self.path, name))
    }

    fn child(&self, item: ListItem) -> Child {
        match item.kind {
            ItemKind::Directory => Child::Directory(self.subdirectory(&item.name)),
            ItemKind::File => Child::File {
                client: self.file(&item.name),
                length: item.length.unwrap_or_default(),
            },
        }
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Pages through the children of one directory.
pub(crate) struct Listing {
    directory: DirectoryClient,
    buffer: VecDeque<ListItem>,
    cursor: Cursor,
}

impl Listing {
    pub(crate) fn new(directory: DirectoryClient) -> Self {
        Self {
            directory,
            buffer: VecDeque::new(),
            cursor: Cursor::Start,
        }
    }

    pub(crate) fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    /// Next child, fetching another page when the current one is used up.
    pub(crate) async fn next_item(&mut self) -> Result<Option<ListItem>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            let marker = match &self.cursor {
                Cursor::Done => return Ok(None),
                Cursor::Start => None,
                Cursor::Next(marker) => Some(marker.clone()),
            };
            let page = self.directory.list_page(marker.as_deref(), None).await?;
            tracing::trace!(
                "listed {} items of '{}'",
                page.items.len(),
                self.directory.path
            );
            self.cursor = match page.next_marker {
                Some(marker) => Cursor::Next(marker),
                None => Cursor::Done,
            };
            self.buffer.extend(page.items);
        }
    }
}
