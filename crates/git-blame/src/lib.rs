//! Line-origin tracking (`blame`).
//!
//! Given a path and a starting commit, walks the commit's ancestry and
//! attributes every line of the file's content at that commit to the commit
//! that last touched it — following renames across history and, optionally,
//! moves and copies within a single revision.
//!
//! The algorithm mirrors git's scoreboard/origin design: a linked list of
//! [`entry::BlameEntry`] values covers the final image, initially as one
//! entry owned by the starting commit. Entries are split and reattributed
//! as each ancestor is visited, until every entry is `guilty` — its owning
//! commit is the one that introduced those lines.
//!
//! This crate only reads: the [`git_odb::ObjectDatabase`] for blobs and
//! commits, and [`git_diff`] for textual diff and rename detection. It
//! never writes objects or refs.

mod entry;
mod r#move;
mod origin;
mod pathwalk;
mod scoreboard;

pub use origin::Origin;
pub use scoreboard::{blame, blame_working_tree, BlameLine, BlameOptions};

use bstr::BString;
use git_hash::ObjectId;

/// Errors produced while computing blame.
#[derive(Debug, thiserror::Error)]
pub enum BlameError {
    #[error("path '{0}' does not exist in the starting commit")]
    PathNotInCommit(BString),

    #[error("blob for '{path}' in commit {commit} could not be read")]
    BlobUnreadable { commit: ObjectId, path: BString },

    #[error("{0} is not a commit object")]
    NotACommit(ObjectId),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Diff(#[from] git_diff::DiffError),

    #[error(transparent)]
    Repo(#[from] git_repository::RepoError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),
}
