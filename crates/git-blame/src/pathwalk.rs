//! Resolving a path to a blob within a commit's tree.

use bstr::{BStr, ByteSlice};
use git_hash::ObjectId;
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

use crate::BlameError;

pub fn commit_tree(odb: &ObjectDatabase, commit: ObjectId) -> Result<ObjectId, BlameError> {
    match odb.read(&commit)?.ok_or_else(|| BlameError::BlobUnreadable {
        commit,
        path: bstr::BString::from(""),
    })? {
        Object::Commit(c) => Ok(c.tree),
        _ => Err(BlameError::NotACommit(commit)),
    }
}

pub fn commit_parents(odb: &ObjectDatabase, commit: ObjectId) -> Result<Vec<ObjectId>, BlameError> {
    match odb.read(&commit)?.ok_or_else(|| BlameError::BlobUnreadable {
        commit,
        path: bstr::BString::from(""),
    })? {
        Object::Commit(c) => Ok(c.parents),
        _ => Err(BlameError::NotACommit(commit)),
    }
}

/// Recursively collect every blob entry in `tree_oid` as (path, mode, oid).
/// Used by copy detection, which has to search content across every file
/// a parent commit carries, not just the one the suspect lives at.
pub fn collect_blob_paths(
    odb: &ObjectDatabase,
    tree_oid: ObjectId,
    prefix: &bstr::BString,
    out: &mut Vec<(bstr::BString, FileMode, ObjectId)>,
) -> Result<(), BlameError> {
    let tree = match odb.read(&tree_oid)? {
        Some(Object::Tree(t)) => t,
        _ => return Ok(()),
    };
    for entry in tree.iter() {
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&entry.name);

        if entry.mode.is_tree() {
            collect_blob_paths(odb, entry.oid, &path, out)?;
        } else if entry.mode.is_blob() {
            out.push((path, entry.mode, entry.oid));
        }
    }
    Ok(())
}

/// Resolve a `/`-separated path to a (blob oid, mode) pair within `tree_oid`.
/// Returns `Ok(None)` if any path component is missing, or a non-tree
/// component is traversed as if it were a directory.
pub fn resolve_path(
    odb: &ObjectDatabase,
    tree_oid: ObjectId,
    path: &BStr,
) -> Result<Option<(ObjectId, FileMode)>, BlameError> {
    let components: Vec<&[u8]> = path.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(None);
    }

    let mut current = tree_oid;
    for (i, comp) in components.iter().enumerate() {
        let tree = match odb.read(&current)? {
            Some(Object::Tree(t)) => t,
            _ => return Ok(None),
        };
        let entry = match tree.find(comp.as_bstr()) {
            Some(e) => e,
            None => return Ok(None),
        };
        if i + 1 == components.len() {
            return Ok(Some((entry.oid, entry.mode)));
        }
        if !entry.mode.is_tree() {
            return Ok(None);
        }
        current = entry.oid;
    }
    Ok(None)
}
