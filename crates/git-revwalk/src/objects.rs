//! Object listing: enumerate all objects reachable from a set of commits.
//!
//! Used by pack generation and the Bitmap Index's type-enumeration output path.

use std::collections::HashSet;

use git_hash::ObjectId;
use git_object::Object;
use git_pack::bitmap::{self, BitmapIndex, BitmapQuery};
use git_pack::index::PackIndex;
use git_repository::Repository;

use crate::RevWalkError;

/// List all objects reachable from the given commits, excluding objects
/// reachable from the excluded set.
///
/// Returns OIDs of all commits, trees, and blobs reachable from `include`
/// but not from `exclude`.
pub fn list_objects(
    repo: &Repository,
    include: &[ObjectId],
    exclude: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut result = Vec::new();
    let mut seen = HashSet::new();

    let mut excluded_objects = HashSet::new();
    for oid in exclude {
        collect_reachable(repo, oid, &mut excluded_objects)?;
    }

    for oid in include {
        collect_reachable_filtered(repo, oid, &mut seen, &excluded_objects, &mut result)?;
    }

    Ok(result)
}

/// Collect all objects reachable from a commit (commits, trees, blobs).
fn collect_reachable(
    repo: &Repository,
    start: &ObjectId,
    seen: &mut HashSet<ObjectId>,
) -> Result<(), RevWalkError> {
    let mut stack = vec![*start];

    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }

        let obj = match repo.odb().read(&oid)? {
            Some(obj) => obj,
            None => continue,
        };

        match obj {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                for parent in &commit.parents {
                    stack.push(*parent);
                }
            }
            Object::Tree(tree) => {
                for entry in &tree.entries {
                    stack.push(entry.oid);
                }
            }
            Object::Blob(_) => {}
            Object::Tag(tag) => {
                stack.push(tag.target);
            }
        }
    }

    Ok(())
}

/// Collect reachable objects with exclusion filtering, recording every
/// newly-seen object (commit, tree, or blob) in `result`.
fn collect_reachable_filtered(
    repo: &Repository,
    start: &ObjectId,
    seen: &mut HashSet<ObjectId>,
    excluded: &HashSet<ObjectId>,
    result: &mut Vec<ObjectId>,
) -> Result<(), RevWalkError> {
    let mut stack = vec![*start];

    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) || excluded.contains(&oid) {
            continue;
        }

        let obj = match repo.odb().read(&oid)? {
            Some(obj) => obj,
            None => continue,
        };

        match &obj {
            Object::Commit(commit) => {
                result.push(oid);
                stack.push(commit.tree);
                for parent in &commit.parents {
                    stack.push(*parent);
                }
            }
            Object::Tree(tree) => {
                result.push(oid);
                for entry in &tree.entries {
                    if !excluded.contains(&entry.oid) && !seen.contains(&entry.oid) {
                        stack.push(entry.oid);
                    }
                }
            }
            Object::Blob(_) => {
                result.push(oid);
            }
            Object::Tag(tag) => {
                result.push(oid);
                stack.push(tag.target);
            }
        }
    }

    Ok(())
}

/// List all objects reachable from `include` minus `exclude`, same contract
/// as [`list_objects`], but answered from a pack's bitmap index in O(result)
/// time when one is available and usable.
///
/// Falls straight through to the full walk when no pack carries a bitmap.
/// When a bitmap file exists but fails to open or decode, the attempt is
/// abandoned and logged before falling back, rather than surfaced as an
/// error to the caller.
pub fn list_objects_accelerated(
    repo: &Repository,
    include: &[ObjectId],
    exclude: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    match find_usable_bitmap(repo) {
        Ok(Some((pack_index, bitmap_index))) => {
            bitmap_accelerated_list(repo, &pack_index, &bitmap_index, include, exclude)
        }
        Ok(None) => list_objects(repo, include, exclude),
        Err(e) => {
            tracing::warn!(error = %e, "bitmap index unusable, falling back to full walk");
            list_objects(repo, include, exclude)
        }
    }
}

/// Find the first pack with a sibling `.bitmap` file and open both it and
/// its `.idx`. `Ok(None)` means no pack in this repository has a bitmap at
/// all (not an error: the feature is simply off). `Err` means a bitmap file
/// exists but didn't open or decode.
fn find_usable_bitmap(
    repo: &Repository,
) -> Result<Option<(PackIndex, BitmapIndex)>, RevWalkError> {
    for pack_path in repo.odb().pack_paths() {
        let bitmap_path = pack_path.with_extension("bitmap");
        if !bitmap_path.exists() {
            continue;
        }
        let idx_path = pack_path.with_extension("idx");
        let pack_index = PackIndex::open(&idx_path)?;
        let bitmap_index = BitmapIndex::open(&bitmap_path, &pack_index)?;
        return Ok(Some((pack_index, bitmap_index)));
    }
    Ok(None)
}

fn bitmap_accelerated_list(
    repo: &Repository,
    pack_index: &PackIndex,
    bitmap_index: &BitmapIndex,
    include: &[ObjectId],
    exclude: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    let query = BitmapQuery {
        want: include.to_vec(),
        have: exclude.to_vec(),
        type_filter: None,
    };
    let partitioned = bitmap::partition(bitmap_index, pack_index, &query)?;

    let non_bitmapped_want = partitioned.non_bitmapped_want.clone();
    let non_bitmapped_have = partitioned.non_bitmapped_have.clone();

    let want_objs = list_objects(repo, &non_bitmapped_want, &[])?;
    let have_objs = list_objects(repo, &non_bitmapped_have, &[])?;

    let mut extra_want = bitmap::Bitmap::new(pack_index.num_objects() as usize);
    let mut extra_have = bitmap::Bitmap::new(pack_index.num_objects() as usize);
    let mut out_of_pack_want = HashSet::new();
    let mut out_of_pack_have = HashSet::new();

    for oid in &want_objs {
        match pack_index.position_of(oid) {
            Some(pos) => extra_want.set(pos),
            None => {
                out_of_pack_want.insert(*oid);
            }
        }
    }
    for oid in &have_objs {
        match pack_index.position_of(oid) {
            Some(pos) => extra_have.set(pos),
            None => {
                out_of_pack_have.insert(*oid);
            }
        }
    }

    let result_bitmap = partitioned.finish(&extra_want, &extra_have);

    let mut result: Vec<ObjectId> = result_bitmap
        .iter_set()
        .map(|pos| pack_index.oid_at_index(pos))
        .collect();

    for oid in out_of_pack_want.difference(&out_of_pack_have) {
        result.push(*oid);
    }

    Ok(result)
}
