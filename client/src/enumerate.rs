use futures::{stream, Stream};
use kernel::{join_path, ItemKind};

use crate::directory::{DirectoryClient, Listing};
use crate::error::{Error, Result};

/// One node of a subtree walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path inside the share
    pub path: String,
    pub kind: ItemKind,
    /// Declared length, files only
    pub length: Option<u64>,
    /// 0 for children of the walk root
    pub depth: usize,
}

struct Frame {
    listing: Listing,
    depth: usize,
}

struct Walk {
    stack: Vec<Frame>,
}

impl Walk {
    async fn next_entry(&mut self) -> Result<Option<TreeEntry>> {
        while let Some(frame) = self.stack.last_mut() {
            let depth = frame.depth;
            let Some(item) = frame.listing.next_item().await? else {
                self.stack.pop();
                continue;
            };
            let parent = frame.listing.directory();
            let path = join_path(parent.path(), &item.name);
            if item.kind == ItemKind::Directory {
                let listing = Listing::new(parent.subdirectory(&item.name));
                self.stack.push(Frame {
                    listing,
                    depth: depth + 1,
                });
            }
            return Ok(Some(TreeEntry {
                path,
                kind: item.kind,
                length: item.length,
                depth,
            }));
        }
        Ok(None)
    }
}

/// Lazy depth-first pre-order walk below `root`.
///
/// Each directory is listed when the walk reaches it, so nothing is fetched
/// before the stream is polled. Walking again issues fresh calls.
pub fn enumerate_tree(root: &DirectoryClient) -> impl Stream<Item = Result<TreeEntry>> + Send + 'static {
    let walk = Walk {
        stack: vec![Frame {
            listing: Listing::new(root.clone()),
            depth: 0,
        }],
    };
    stream::try_unfold(walk, |mut walk| async move {
        let entry = walk.next_entry().await?;
        Ok::<_, Error>(entry.map(|entry| (entry, walk)))
    })
}
