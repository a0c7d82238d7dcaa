#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

//! Async facade over a file share service.
//!
//! ```text
//! Account -> FileServiceClient -> ShareClient -> DirectoryClient -> FileClient
//! ```
//!
//! Every handle is cheap to clone and sends nothing until one of its
//! operations is awaited. Each operation is one round trip unless its
//! documentation says otherwise.

pub mod account;
pub mod copy;
pub mod directory;
pub mod enumerate;
pub mod error;
pub mod file;
pub mod resource;
pub mod service;
pub mod share;

pub use account::Account;
pub use copy::PollOptions;
pub use directory::{Child, DirectoryClient};
pub use enumerate::{enumerate_tree, TreeEntry};
pub use error::{Error, Result};
pub use file::{CreateFileOptions, FileClient};
pub use service::{ClientOptions, Condition, FileServiceClient};
pub use share::{CreateShareOptions, ShareClient};

pub use kernel::{
    CopyState, CopyStatus, DirectoryProperties, FileHeaders, FileProperties, FileRange, ItemKind,
    ListItem, ListPage, Metadata, MetricsLevel, MetricsProperties, ServiceProperties, ShareItem,
    ShareProperties, ShareStats, MAX_RANGE_SIZE,
};
