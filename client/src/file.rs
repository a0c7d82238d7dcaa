use std::ffi::OsString;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use kernel::{
    CreateFileRequest, FileHeaders, FileProperties, FileRange, Metadata, MetadataBody,
    MAX_RANGE_SIZE,
};
use reqwest::{Method, RequestBuilder};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::service::Condition;
use crate::share::ShareClient;

const PARTIAL_SUFFIX: &str = ".partial";

/// Content headers and metadata sent with [`FileClient::create`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateFileOptions {
    pub headers: FileHeaders,
    pub metadata: Metadata,
}

/// Handle of a file.
#[derive(Clone, Debug)]
pub struct FileClient {
    share: ShareClient,
    path: String,
}

impl FileClient {
    pub(crate) fn new(share: ShareClient, path: &str) -> Self {
        Self {
            share,
            path: kernel::join_path(path, ""),
        }
    }

    /// Path inside the share.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn share(&self) -> &ShareClient {
        &self.share
    }

    pub(crate) fn request(&self, method: Method, tail: &[&str]) -> RequestBuilder {
        let mut segments = vec!["file"];
        segments.extend_from_slice(tail);
        self.share
            .request(method, &segments)
            .query(&[("path", self.path.as_str())])
    }

    /// Allocates a sparse file of exactly `length` bytes, replacing any file
    /// at the same path.
    pub async fn create(&self, length: u64, options: &CreateFileOptions) -> Result<FileProperties> {
        let body = CreateFileRequest {
            length,
            headers: options.headers.clone(),
            metadata: options.metadata.clone(),
        };
        let request = self.request(Method::PUT, &[]).json(&body);
        self.share.transport().json(request).await
    }

    /// Creates the file with the size and Content-MD5 of a local file and
    /// uploads all of its content.
    pub async fn upload_from_local(&self, local: impl AsRef<Path>) -> Result<FileProperties> {
        let local = local.as_ref();
        let context = || local.display().to_string();
        let mut source = File::open(local)
            .await
            .map_err(|e| Error::local_io(context(), e))?;
        let length = source
            .metadata()
            .await
            .map_err(|e| Error::local_io(context(), e))?
            .len();
        let md5 = content_md5(&mut source)
            .await
            .map_err(|e| Error::local_io(context(), e))?;
        source
            .rewind()
            .await
            .map_err(|e| Error::local_io(context(), e))?;

        let options = CreateFileOptions {
            headers: FileHeaders {
                content_md5: Some(md5),
                ..FileHeaders::default()
            },
            metadata: Metadata::new(),
        };
        self.create(length, &options).await?;
        self.upload_range(&mut source, 0, length).await?;
        tracing::debug!("uploaded {} bytes of {} into {}", length, local.display(), self.path);
        self.get_properties().await
    }

    /// Writes exactly `length` bytes read from `source` into
    /// `[offset, offset + length)`, at most [`MAX_RANGE_SIZE`] per request.
    pub async fn upload_range<R>(&self, source: &mut R, offset: u64, length: u64) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if length == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::OutOfBounds(format!("{offset} + {length} overflows")))?;
        // A multi request upload must not leave a prefix written when the
        // tail falls outside of the file.
        if length > MAX_RANGE_SIZE {
            let declared = self.get_properties().await?.length;
            if end > declared {
                return Err(Error::OutOfBounds(format!(
                    "range [{offset}, {end}) exceeds length {declared} of {}",
                    self.path
                )));
            }
        }

        let mut position = offset;
        while position < end {
            let chunk = (end - position).min(MAX_RANGE_SIZE);
            let mut buffer = vec![0u8; usize::try_from(chunk).unwrap_or(usize::MAX)];
            source
                .read_exact(&mut buffer)
                .await
                .map_err(|e| Error::local_io(format!("range source at {position}"), e))?;
            self.put_range(position, Bytes::from(buffer)).await?;
            position += chunk;
        }
        Ok(())
    }

    /// Writes `data` at `offset`.
    pub async fn upload_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut source = data;
        self.upload_range(&mut source, offset, data.len() as u64)
            .await
    }

    async fn put_range(&self, offset: u64, data: Bytes) -> Result<()> {
        let length = data.len() as u64;
        let request = self
            .request(Method::PUT, &["range"])
            .query(&[("offset", offset), ("length", length)])
            .body(data);
        self.share.transport().send(request).await?;
        tracing::trace!("range [{offset}, {}) of {} written", offset + length, self.path);
        Ok(())
    }

    /// Deallocates `[offset, offset + length)`; reads there return zeros.
    pub async fn clear_range(&self, offset: u64, length: u64) -> Result<()> {
        let request = self
            .request(Method::DELETE, &["range"])
            .query(&[("offset", offset), ("length", length)]);
        self.share.transport().send(request).await?;
        Ok(())
    }

    /// Allocated extents, sorted and disjoint.
    pub async fn list_ranges(&self) -> Result<Vec<FileRange>> {
        let request = self.request(Method::GET, &["ranges"]);
        self.share.transport().json(request).await
    }

    /// Reads `[offset, offset + length)`; unallocated bytes are zero.
    pub async fn download_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        let request = self
            .request(Method::GET, &[])
            .query(&[("offset", offset), ("length", length)]);
        let response = self.share.transport().send(request).await?;
        response.bytes().await.map_err(|e| Error::transport(&e))
    }

    /// Writes the whole file to `local` and returns its length.
    ///
    /// The local file gets the declared length and only allocated ranges are
    /// fetched. Content lands in a `.partial` sibling that is renamed into
    /// place on success and removed on failure.
    pub async fn download_to_local(&self, local: impl AsRef<Path>) -> Result<u64> {
        let local = local.as_ref();
        let properties = self.get_properties().await?;
        let ranges = self.list_ranges().await?;

        let partial = PartialFile::new(local);
        let context = || partial.path.display().to_string();
        let mut target = File::create(&partial.path)
            .await
            .map_err(|e| Error::local_io(context(), e))?;
        target
            .set_len(properties.length)
            .await
            .map_err(|e| Error::local_io(context(), e))?;

        for range in &ranges {
            let mut position = range.start;
            while position <= range.end {
                let chunk = (range.end - position + 1).min(MAX_RANGE_SIZE);
                let data = self.download_range(position, chunk).await?;
                target
                    .seek(SeekFrom::Start(position))
                    .await
                    .map_err(|e| Error::local_io(context(), e))?;
                target
                    .write_all(&data)
                    .await
                    .map_err(|e| Error::local_io(context(), e))?;
                position += chunk;
            }
        }
        target
            .sync_all()
            .await
            .map_err(|e| Error::local_io(context(), e))?;
        drop(target);

        tokio::fs::rename(&partial.path, local)
            .await
            .map_err(|e| Error::local_io(local.display().to_string(), e))?;
        partial.keep();
        tracing::debug!(
            "downloaded {} ({} ranges) into {}",
            self.path,
            ranges.len(),
            local.display()
        );
        Ok(properties.length)
    }

    pub async fn get_properties(&self) -> Result<FileProperties> {
        let request = self.request(Method::GET, &["properties"]);
        self.share.transport().json(request).await
    }

    /// Replaces the whole content header set in one call.
    pub async fn set_headers(
        &self,
        headers: &FileHeaders,
        condition: &Condition,
    ) -> Result<FileProperties> {
        let request = condition.apply(self.request(Method::PUT, &["properties"]).json(headers));
        self.share.transport().json(request).await
    }

    /// Replaces the whole metadata map.
    pub async fn set_metadata(
        &self,
        metadata: &Metadata,
        condition: &Condition,
    ) -> Result<FileProperties> {
        let body = MetadataBody {
            metadata: metadata.clone(),
        };
        let request = condition.apply(self.request(Method::PUT, &["metadata"]).json(&body));
        self.share.transport().json(request).await
    }

    pub async fn get_metadata(&self) -> Result<Metadata> {
        let request = self.request(Method::GET, &["metadata"]);
        let body: MetadataBody = self.share.transport().json(request).await?;
        Ok(body.metadata)
    }

    pub async fn delete(&self) -> Result<()> {
        let request = self.request(Method::DELETE, &[]);
        self.share.transport().send(request).await?;
        Ok(())
    }

    /// `false` when there was no such file.
    pub async fn delete_if_exists(&self) -> Result<bool> {
        match self.delete().await {
            Ok(()) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Base64 MD5 of everything `source` yields.
async fn content_md5<R>(source: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut digest = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = source.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        digest.consume(&buffer[..read]);
    }
    Ok(general_purpose::STANDARD.encode(digest.compute().0))
}

/// Removes the download target on drop unless [`PartialFile::keep`] was called.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(target: &Path) -> Self {
        let mut name = OsString::from(target.as_os_str());
        name.push(PARTIAL_SUFFIX);
        Self {
            path: PathBuf::from(name),
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("{} cannot be removed: {e}", self.path.display());
                }
            }
        }
    }
}
