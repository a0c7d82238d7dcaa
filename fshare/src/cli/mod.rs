pub mod bugreport;
pub mod client;
pub mod server;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the local file share emulator";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect information about the system and the environment for a bug report";

pub const SHARE_SUBCOMMAND: &str = "share";
pub const SHARE_DESCRIPTION: &str = "Manage shares";

pub const LIST_SUBCOMMAND: &str = "list";
pub const SHARE_LIST_DESCRIPTION: &str = "List shares of the account";

pub const CREATE_SUBCOMMAND: &str = "create";
pub const SHARE_CREATE_DESCRIPTION: &str = "Create a share";

pub const SHOW_SUBCOMMAND: &str = "show";
pub const SHARE_SHOW_DESCRIPTION: &str = "Show share properties, metadata and usage";

pub const DELETE_SUBCOMMAND: &str = "delete";
pub const SHARE_DELETE_DESCRIPTION: &str = "Delete a share with everything in it";

pub const MKDIR_SUBCOMMAND: &str = "mkdir";
pub const MKDIR_DESCRIPTION: &str = "Create a directory";

pub const UPLOAD_SUBCOMMAND: &str = "upload";
pub const UPLOAD_DESCRIPTION: &str = "Upload a local file";

pub const DOWNLOAD_SUBCOMMAND: &str = "download";
pub const DOWNLOAD_DESCRIPTION: &str = "Download a file, zero filling unallocated ranges";

pub const RANGES_SUBCOMMAND: &str = "ranges";
pub const RANGES_DESCRIPTION: &str = "List allocated ranges of a file";

pub const CLEAR_SUBCOMMAND: &str = "clear";
pub const CLEAR_DESCRIPTION: &str = "Deallocate a range of a file";

pub const TREE_SUBCOMMAND: &str = "tree";
pub const TREE_DESCRIPTION: &str = "Walk a directory subtree";

pub const COPY_SUBCOMMAND: &str = "copy";
pub const COPY_DESCRIPTION: &str = "Start a server-side copy of a file";

pub const RM_SUBCOMMAND: &str = "rm";
pub const RM_DESCRIPTION: &str = "Delete a file or an empty directory";

pub const CONNECTION_STRING_ARG: &str = "connection-string";
