use std::path::Path;

use client::{
    enumerate_tree, Account, CopyState, CreateShareOptions, FileRange, FileServiceClient, ItemKind,
    Metadata, PollOptions, Result, ShareItem,
};
use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use futures::TryStreamExt;

const TABLE_WIDTH: u16 = 120;

pub fn connect(connection_string: &str) -> Result<FileServiceClient> {
    let account = Account::parse(connection_string)?;
    FileServiceClient::new(&account)
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(TABLE_WIDTH)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

pub async fn list_shares(service: &FileServiceClient) -> Result<()> {
    let shares: Vec<ShareItem> = service.list_shares().await?;
    let mut table = new_table(&["Share", "Quota (GiB)", "Last modified", "ETag"]);
    for share in shares {
        table.add_row(vec![
            Cell::new(share.name),
            Cell::new(share.quota),
            Cell::new(share.last_modified.to_rfc2822()),
            Cell::new(share.etag),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn create_share(
    service: &FileServiceClient,
    name: &str,
    quota: Option<u32>,
    metadata: Metadata,
) -> Result<()> {
    let options = CreateShareOptions { quota, metadata };
    let properties = service.share(name).create(&options).await?;
    println!("share {name} created with quota {} GiB", properties.quota);
    Ok(())
}

pub async fn show_share(service: &FileServiceClient, name: &str) -> Result<()> {
    let share = service.share(name);
    let properties = share.get_properties().await?;
    let stats = share.get_stats().await?;

    let mut table = new_table(&["Property", "Value"]);
    table.add_row(vec![Cell::new("Quota (GiB)"), Cell::new(properties.quota)]);
    table.add_row(vec![
        Cell::new("Last modified"),
        Cell::new(properties.last_modified.to_rfc2822()),
    ]);
    table.add_row(vec![Cell::new("ETag"), Cell::new(properties.etag)]);
    table.add_row(vec![Cell::new("Usage (bytes)"), Cell::new(stats.usage_bytes)]);
    table.add_row(vec![Cell::new("Files"), Cell::new(stats.file_count)]);
    for (key, value) in properties.metadata {
        table.add_row(vec![Cell::new(format!("x-meta {key}")), Cell::new(value)]);
    }
    println!("{table}");
    Ok(())
}

pub async fn delete_share(service: &FileServiceClient, name: &str) -> Result<()> {
    service.share(name).delete().await?;
    println!("share {name} deleted");
    Ok(())
}

pub async fn make_directory(service: &FileServiceClient, share: &str, path: &str) -> Result<()> {
    let created = service
        .share(share)
        .directory(path)
        .create_if_absent(&Metadata::new())
        .await?;
    if created {
        println!("directory {path} created");
    } else {
        println!("directory {path} already exists");
    }
    Ok(())
}

pub async fn upload(
    service: &FileServiceClient,
    share: &str,
    path: &str,
    local: &Path,
) -> Result<()> {
    let properties = service.share(share).file(path).upload_from_local(local).await?;
    println!(
        "{} uploaded into {share}/{path}: {} bytes",
        local.display(),
        properties.length
    );
    Ok(())
}

pub async fn download(
    service: &FileServiceClient,
    share: &str,
    path: &str,
    local: &Path,
) -> Result<()> {
    let written = service
        .share(share)
        .file(path)
        .download_to_local(local)
        .await?;
    println!("{share}/{path} downloaded into {}: {written} bytes", local.display());
    Ok(())
}

pub async fn list_ranges(service: &FileServiceClient, share: &str, path: &str) -> Result<()> {
    let ranges: Vec<FileRange> = service.share(share).file(path).list_ranges().await?;
    let mut table = new_table(&["Start", "End", "Length"]);
    for range in ranges {
        table.add_row(vec![
            Cell::new(range.start),
            Cell::new(range.end),
            Cell::new(range.len()),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn clear_range(
    service: &FileServiceClient,
    share: &str,
    path: &str,
    offset: u64,
    length: u64,
) -> Result<()> {
    service
        .share(share)
        .file(path)
        .clear_range(offset, length)
        .await?;
    println!("{share}/{path} range at {offset} of {length} bytes cleared");
    Ok(())
}

pub async fn tree(service: &FileServiceClient, share: &str, path: &str) -> Result<()> {
    let root = service.share(share).directory(path);
    let mut entries = Box::pin(enumerate_tree(&root));
    while let Some(entry) = entries.try_next().await? {
        let name = entry.path.rsplit('/').next().unwrap_or_default();
        let indent = "  ".repeat(entry.depth);
        match entry.kind {
            ItemKind::Directory => println!("{indent}{name}/"),
            ItemKind::File => println!(
                "{indent}{name} ({} bytes)",
                entry.length.unwrap_or_default()
            ),
        }
    }
    Ok(())
}

pub async fn copy(
    service: &FileServiceClient,
    share: &str,
    source: &str,
    destination: &str,
    wait: Option<PollOptions>,
) -> Result<()> {
    let share = service.share(share);
    let destination = share.file(destination);
    let copy_id = destination.start_copy(&share.file(source)).await?;
    println!("copy {copy_id} started");
    if let Some(options) = wait {
        let state: CopyState = destination.wait_for_copy(&copy_id, &options).await?;
        println!(
            "copy {copy_id} finished: {}{}",
            state.status.as_str(),
            state
                .status_description
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn remove(
    service: &FileServiceClient,
    share: &str,
    path: &str,
    directory: bool,
) -> Result<()> {
    let share = service.share(share);
    if directory {
        share.directory(path).delete().await?;
    } else {
        share.file(path).delete().await?;
    }
    println!("{path} deleted");
    Ok(())
}
