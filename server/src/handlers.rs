#![allow(clippy::unused_async)]
use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use futures::{Stream, TryStreamExt};
use futures_util::StreamExt;
use kernel::{
    CopyState, CreateFileRequest, CreateShareRequest, DirectoryProperties, ErrorBody, ErrorCode,
    FileHeaders, FileProperties, FileRange, ListPage, MAX_LIST_PAGE_SIZE, MAX_RANGE_SIZE,
    MetadataBody, QuotaRequest, ServiceProperties, ShareItem, ShareProperties, ShareStats,
    StartCopyRequest,
};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::AppState;
use crate::copy;
use crate::domain::{NodeRef, ShareRef, Storage, StorageError};
use crate::error::ApiError;
use crate::file_reply::FileReply;
use crate::sqlite::{Mode, Sqlite};

/// Addresses a directory or a file inside a share.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NodeQuery {
    /// Path inside the share, the root directory when absent
    path: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Directory path inside the share, the root directory when absent
    path: Option<String>,
    /// Continuation marker returned by the previous page
    marker: Option<String>,
    /// Page size, at most 5000
    maxresults: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// File path inside the share
    path: Option<String>,
    /// First byte to read, 0 when absent
    offset: Option<u64>,
    /// Number of bytes to read, up to the end of the file when absent
    length: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    /// File path inside the share
    path: Option<String>,
    /// First byte of the range
    offset: u64,
    /// Range length, required when clearing and checked against the body when uploading
    length: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CopyQuery {
    /// Destination file path inside the share
    path: Option<String>,
    /// Identifier of the copy to abort
    copy_id: Option<String>,
}

/// Lists all shares of an account
#[utoipa::path(
    get,
    path = "/api/{account}",
    tag = "shares",
    responses(
        (status = 200, description = "Shares ordered by name", body = [ShareItem]),
    ),
    params(
        ("account" = String, Path, description = "Account name")
    ),
)]
pub async fn list_shares(
    Path(account): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let shares = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.list_shares(&account)
    })
    .await?;
    Ok(Json(shares))
}

/// Gets file service properties of an account
#[utoipa::path(
    get,
    path = "/api/{account}/properties",
    tag = "service",
    responses(
        (status = 200, description = "Service properties, defaults when never set", body = ServiceProperties),
    ),
    params(
        ("account" = String, Path, description = "Account name")
    ),
)]
pub async fn get_service_properties(
    Path(account): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_service_properties(&account)
    })
    .await?;
    Ok(Json(properties))
}

/// Replaces file service properties of an account
#[utoipa::path(
    put,
    path = "/api/{account}/properties",
    tag = "service",
    request_body = ServiceProperties,
    responses(
        (status = 202, description = "Properties stored"),
        (status = 400, description = "Invalid retention", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name")
    ),
)]
pub async fn set_service_properties(
    Path(account): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(properties): Json<ServiceProperties>,
) -> Result<impl IntoResponse, ApiError> {
    execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.set_service_properties(&account, &properties)
    })
    .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Creates a share with its quota and metadata
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}",
    tag = "shares",
    request_body = CreateShareRequest,
    responses(
        (status = 201, description = "Share created", body = ShareProperties),
        (status = 409, description = "Share already exists", body = ErrorBody),
        (status = 400, description = "Invalid name, quota or metadata", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name")
    ),
)]
pub async fn create_share(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateShareRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    tracing::info!("create share: {}", share.name);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.create_share(&share, &request)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(properties)))
}

/// Gets share properties
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}",
    tag = "shares",
    responses(
        (status = 200, description = "Share properties", body = ShareProperties),
        (status = 404, description = "Share not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name")
    ),
)]
pub async fn get_share(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_share(&share)
    })
    .await?;
    Ok(Json(properties))
}

/// Deletes a share with its whole tree
#[utoipa::path(
    delete,
    path = "/api/{account}/shares/{share}",
    tag = "shares",
    responses(
        (status = 202, description = "Share deleted"),
        (status = 404, description = "Share not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name")
    ),
)]
pub async fn delete_share(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    tracing::info!("delete share: {}", share.name);
    execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.delete_share(&share)
    })
    .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Changes share quota
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/quota",
    tag = "shares",
    request_body = QuotaRequest,
    responses(
        (status = 200, description = "Quota changed", body = ShareProperties),
        (status = 400, description = "Quota out of range", body = ErrorBody),
        (status = 412, description = "If-Match etag is stale", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        ("If-Match" = Option<String>, Header, description = "Expected share etag")
    ),
)]
pub async fn set_share_quota(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<QuotaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    let condition = if_match(&headers);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.set_share_quota(&share, request.quota, condition.as_deref())
    })
    .await?;
    Ok(Json(properties))
}

/// Gets share metadata
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/metadata",
    tag = "shares",
    responses(
        (status = 200, description = "Share metadata", body = MetadataBody),
        (status = 404, description = "Share not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name")
    ),
)]
pub async fn get_share_metadata(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_share(&share)
    })
    .await?;
    Ok(Json(MetadataBody {
        metadata: properties.metadata,
    }))
}

/// Replaces share metadata
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/metadata",
    tag = "shares",
    request_body = MetadataBody,
    responses(
        (status = 200, description = "Metadata replaced", body = ShareProperties),
        (status = 400, description = "Invalid metadata", body = ErrorBody),
        (status = 412, description = "If-Match etag is stale", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        ("If-Match" = Option<String>, Header, description = "Expected share etag")
    ),
)]
pub async fn set_share_metadata(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MetadataBody>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    let condition = if_match(&headers);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.set_share_metadata(&share, &body.metadata, condition.as_deref())
    })
    .await?;
    Ok(Json(properties))
}

/// Gets space used by the files of a share
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/stats",
    tag = "shares",
    responses(
        (status = 200, description = "Share usage", body = ShareStats),
        (status = 404, description = "Share not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name")
    ),
)]
pub async fn get_share_stats(
    Path((account, share)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let share = ShareRef::new(account, share);
    let stats = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_share_stats(&share)
    })
    .await?;
    Ok(Json(stats))
}

/// Creates a directory under an existing parent
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/directory",
    tag = "directories",
    request_body = MetadataBody,
    responses(
        (status = 201, description = "Directory created", body = DirectoryProperties),
        (status = 409, description = "A file or directory of that name exists", body = ErrorBody),
        (status = 404, description = "Share or parent not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn create_directory(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<MetadataBody>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    tracing::info!("create directory: {node}");
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.create_directory(&node, &body.metadata)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(properties)))
}

/// Gets directory properties
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/directory",
    tag = "directories",
    responses(
        (status = 200, description = "Directory properties", body = DirectoryProperties),
        (status = 404, description = "Directory not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn get_directory(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_directory(&node)
    })
    .await?;
    Ok(Json(properties))
}

/// Deletes an empty directory
#[utoipa::path(
    delete,
    path = "/api/{account}/shares/{share}/directory",
    tag = "directories",
    responses(
        (status = 202, description = "Directory deleted"),
        (status = 409, description = "Directory has children", body = ErrorBody),
        (status = 404, description = "Directory not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn delete_directory(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    tracing::info!("delete directory: {node}");
    execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.delete_directory(&node)
    })
    .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Gets directory metadata
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/directory/metadata",
    tag = "directories",
    responses(
        (status = 200, description = "Directory metadata", body = MetadataBody),
        (status = 404, description = "Directory not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn get_directory_metadata(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_directory(&node)
    })
    .await?;
    Ok(Json(MetadataBody {
        metadata: properties.metadata,
    }))
}

/// Replaces directory metadata
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/directory/metadata",
    tag = "directories",
    request_body = MetadataBody,
    responses(
        (status = 200, description = "Metadata replaced", body = DirectoryProperties),
        (status = 400, description = "Invalid metadata", body = ErrorBody),
        (status = 412, description = "If-Match etag is stale", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        ("If-Match" = Option<String>, Header, description = "Expected directory etag"),
        NodeQuery
    ),
)]
pub async fn set_directory_metadata(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MetadataBody>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let condition = if_match(&headers);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.set_directory_metadata(&node, &body.metadata, condition.as_deref())
    })
    .await?;
    Ok(Json(properties))
}

/// Lists one page of the children of a directory
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/list",
    tag = "directories",
    responses(
        (status = 200, description = "Children ordered by name", body = ListPage),
        (status = 404, description = "Directory not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        ListQuery
    ),
)]
pub async fn list_directory(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let max_results = query
        .maxresults
        .unwrap_or(MAX_LIST_PAGE_SIZE)
        .clamp(1, MAX_LIST_PAGE_SIZE);
    let page = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.list_directory(&node, query.marker.as_deref(), max_results)
    })
    .await?;
    Ok(Json(page))
}

/// Creates a sparse file of the declared length, replacing an existing file
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/file",
    tag = "files",
    request_body = CreateFileRequest,
    responses(
        (status = 201, description = "File created", body = FileProperties),
        (status = 409, description = "A directory of that name exists", body = ErrorBody),
        (status = 404, description = "Share or parent not found", body = ErrorBody),
        (status = 413, description = "Share quota exceeded", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn create_file(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    tracing::info!("create file: {node} length: {}", request.length);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.create_file(&node, &request)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(properties)))
}

/// Downloads file content, unallocated bytes read as zeros
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/file",
    tag = "files",
    responses(
        (status = 200, description = "Whole file content", body = [u8], content_type = "application/octet-stream"),
        (status = 206, description = "Requested part of the content", body = [u8], content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 416, description = "Range outside of the file", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        DownloadQuery
    ),
)]
pub async fn download_file(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let whole = query.offset.is_none() && query.length.is_none();
    let offset = query.offset.unwrap_or_default();
    let (file, data) = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.read_range(&node, offset, query.length)
    })
    .await?;
    tracing::info!("file: {} read: {} bytes", file.path, data.len());
    let status = if whole {
        StatusCode::OK
    } else {
        StatusCode::PARTIAL_CONTENT
    };
    Ok((status, FileReply::new(data, file, whole)))
}

/// Deletes a file
#[utoipa::path(
    delete,
    path = "/api/{account}/shares/{share}/file",
    tag = "files",
    responses(
        (status = 202, description = "File deleted"),
        (status = 404, description = "File not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn delete_file(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    tracing::info!("delete file: {node}");
    execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.delete_file(&node)
    })
    .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Gets file properties including the state of the last copy
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/file/properties",
    tag = "files",
    responses(
        (status = 200, description = "File properties", body = FileProperties),
        (status = 404, description = "File not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn get_file_properties(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_file(&node)
    })
    .await?;
    Ok(Json(properties))
}

/// Replaces the whole set of content headers of a file
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/file/properties",
    tag = "files",
    request_body = FileHeaders,
    responses(
        (status = 200, description = "Headers replaced", body = FileProperties),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 412, description = "If-Match etag is stale", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        ("If-Match" = Option<String>, Header, description = "Expected file etag"),
        NodeQuery
    ),
)]
pub async fn set_file_headers(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<FileHeaders>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let condition = if_match(&headers);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.set_file_headers(&node, &body, condition.as_deref())
    })
    .await?;
    Ok(Json(properties))
}

/// Gets file metadata
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/file/metadata",
    tag = "files",
    responses(
        (status = 200, description = "File metadata", body = MetadataBody),
        (status = 404, description = "File not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn get_file_metadata(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let properties = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_file(&node)
    })
    .await?;
    Ok(Json(MetadataBody {
        metadata: properties.metadata,
    }))
}

/// Replaces file metadata
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/file/metadata",
    tag = "files",
    request_body = MetadataBody,
    responses(
        (status = 200, description = "Metadata replaced", body = FileProperties),
        (status = 400, description = "Invalid metadata", body = ErrorBody),
        (status = 412, description = "If-Match etag is stale", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        ("If-Match" = Option<String>, Header, description = "Expected file etag"),
        NodeQuery
    ),
)]
pub async fn set_file_metadata(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MetadataBody>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let condition = if_match(&headers);
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.set_file_metadata(&node, &body.metadata, condition.as_deref())
    })
    .await?;
    Ok(Json(properties))
}

/// Writes the request body into a file at the given offset
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/file/range",
    tag = "ranges",
    request_body(content = [u8], description = "Range bytes, at most 4 MiB", content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Range written", body = FileProperties),
        (status = 416, description = "Range outside of the file", body = ErrorBody),
        (status = 413, description = "Body larger than 4 MiB", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        RangeQuery
    ),
)]
pub async fn upload_range(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let data = read_from_stream(body.into_data_stream(), MAX_RANGE_SIZE)
        .await
        .map_err(|e| ApiError::internal(&e))?;
    let read = data.len() as u64;
    if read > MAX_RANGE_SIZE {
        return Err(StorageError::BodyTooLarge(read).into());
    }
    if let Some(length) = query.length {
        if length != read {
            return Err(ApiError::new(
                ErrorCode::InvalidInput,
                format!("declared length {length} differs from the {read} bytes sent"),
            ));
        }
    }
    let offset = query.offset;
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.write_range(&node, offset, &data)
    })
    .await?;
    tracing::info!("file: {} range at: {offset} written: {read}", properties.path);
    Ok((StatusCode::CREATED, Json(properties)))
}

/// Deallocates a range of a file
#[utoipa::path(
    delete,
    path = "/api/{account}/shares/{share}/file/range",
    tag = "ranges",
    responses(
        (status = 200, description = "Range cleared", body = FileProperties),
        (status = 416, description = "Range outside of the file", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        RangeQuery
    ),
)]
pub async fn clear_range(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let Some(length) = query.length else {
        return Err(ApiError::new(
            ErrorCode::InvalidInput,
            "clearing a range requires its length",
        ));
    };
    let offset = query.offset;
    let properties = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.clear_range(&node, offset, length)
    })
    .await?;
    Ok(Json(properties))
}

/// Lists allocated ranges of a file
#[utoipa::path(
    get,
    path = "/api/{account}/shares/{share}/file/ranges",
    tag = "ranges",
    responses(
        (status = 200, description = "Sorted, disjoint inclusive extents", body = [FileRange]),
        (status = 404, description = "File not found", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        NodeQuery
    ),
)]
pub async fn list_ranges(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<NodeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let ranges = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.list_ranges(&node)
    })
    .await?;
    Ok(Json(ranges))
}

/// Starts a server-side copy into the file
#[utoipa::path(
    put,
    path = "/api/{account}/shares/{share}/file/copy",
    tag = "copy",
    request_body = StartCopyRequest,
    responses(
        (status = 202, description = "Copy pending", body = CopyState),
        (status = 404, description = "Source or destination parent not found", body = ErrorBody),
        (status = 409, description = "Another copy is pending on the destination", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Destination share name"),
        CopyQuery
    ),
)]
pub async fn start_copy(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<CopyQuery>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartCopyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let copy_id = Uuid::new_v4().to_string();
    tracing::info!("copy {copy_id}: {} into {node}", request.source);
    let destination = node.clone();
    let id = copy_id.clone();
    let copy = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.begin_copy(&destination, &request.source, &id)
    })
    .await?;
    copy::spawn(state, node, copy_id);
    Ok((StatusCode::ACCEPTED, Json(copy)))
}

/// Aborts a pending copy
#[utoipa::path(
    delete,
    path = "/api/{account}/shares/{share}/file/copy",
    tag = "copy",
    responses(
        (status = 200, description = "Copy aborted", body = CopyState),
        (status = 409, description = "No pending copy or a different copy id", body = ErrorBody),
    ),
    params(
        ("account" = String, Path, description = "Account name"),
        ("share" = String, Path, description = "Share name"),
        CopyQuery
    ),
)]
pub async fn abort_copy(
    Path((account, share)): Path<(String, String)>,
    Query(query): Query<CopyQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let node = node(account, share, query.path.as_deref())?;
    let Some(copy_id) = query.copy_id else {
        return Err(ApiError::new(
            ErrorCode::InvalidInput,
            "aborting a copy requires its copy_id",
        ));
    };
    tracing::info!("abort copy {copy_id} into {node}");
    let copy = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.abort_copy(&node, &copy_id)
    })
    .await?;
    Ok(Json(copy))
}

fn node(account: String, share: String, path: Option<&str>) -> Result<NodeRef, ApiError> {
    Ok(NodeRef::new(
        ShareRef::new(account, share),
        path.unwrap_or_default(),
    )?)
}

fn if_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Runs a storage action on the blocking pool and logs how long it took.
async fn execute<F, R>(state: &AppState, mode: Mode, action: F) -> Result<R, ApiError>
where
    F: FnOnce(Sqlite) -> Result<R, StorageError> + Send + 'static,
    R: Send + 'static,
{
    let start = Instant::now();
    let db = state.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let repository = Sqlite::open(db, mode)?;
        action(repository)
    })
    .await
    .map_err(|e| ApiError::internal(&e))?;
    let duration = start.elapsed();
    tracing::debug!("DB query time: {:?}", duration);
    Ok(result?)
}

/// Reads at most `limit + 1` bytes so that oversized bodies are detected
/// without buffering them whole.
async fn read_from_stream<S, E>(stream: S, limit: u64) -> io::Result<Vec<u8>>
where
    S: Stream<Item = Result<Bytes, E>> + StreamExt,
    E: Sync + std::error::Error + Send + 'static,
{
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();
    body_reader.take(limit + 1).read_to_end(&mut buffer).await?;
    Ok(buffer)
}
