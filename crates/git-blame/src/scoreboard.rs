//! The blame scoreboard: final image, entry list, and the assign/pass-blame
//! main loop. Grounded on `builtin/blame.c`'s `assign_blame`/`pass_blame`.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::rc::Rc;

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_object::FileMode;
use git_repository::Repository;

use crate::entry::EntryList;
use crate::origin::{new_origin, new_working_tree_origin, same_suspect, BlameCommit, Origin};
use crate::pathwalk;
use crate::r#move::find_line_run;
use crate::BlameError;

/// Knobs controlling how aggressively blame follows lines across history.
#[derive(Debug, Clone)]
pub struct BlameOptions {
    /// Follow renames across commit boundaries (`-M` family in C git).
    pub detect_renames: bool,
    /// Similarity percentage (0-100) required to call a delete+add a rename.
    pub rename_threshold: u8,
    /// Look for lines that moved within the same file in a parent.
    pub detect_moves: bool,
    /// Look for lines copied in from a different file in a parent.
    pub detect_copies: bool,
    /// Minimum triviality score before a move search is attempted.
    pub move_threshold: u32,
    /// Minimum triviality score before a copy search is attempted.
    pub copy_threshold: u32,
    /// Keep walking past a root commit instead of treating it as a boundary.
    pub show_root: bool,
    /// Commits to treat as boundaries regardless of parentage (e.g. the
    /// exclusion side of a `blame <rev>..` range).
    pub boundary_commits: HashSet<ObjectId>,
}

impl Default for BlameOptions {
    fn default() -> Self {
        BlameOptions {
            detect_renames: false,
            rename_threshold: 50,
            detect_moves: false,
            detect_copies: false,
            move_threshold: 20,
            copy_threshold: 40,
            show_root: false,
            boundary_commits: HashSet::new(),
        }
    }
}

/// One attributed line of the blamed file's final image.
#[derive(Debug, Clone)]
pub struct BlameLine {
    /// 1-based line number in the content that was blamed.
    pub final_line: u32,
    /// Commit that introduced this line. `None` means it is still only
    /// present in the working tree.
    pub commit: Option<ObjectId>,
    /// Path the line is attributed to at `commit` (may differ from the
    /// blamed path if a rename was followed).
    pub path: BString,
    /// 1-based line number within that commit's version of `path`.
    pub origin_line: u32,
    /// Finalized at a root commit (or explicit boundary), not by exhaustion.
    pub boundary: bool,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum CommitKey {
    Actual(ObjectId),
    Working(ObjectId),
}

impl From<BlameCommit> for CommitKey {
    fn from(c: BlameCommit) -> Self {
        match c {
            BlameCommit::Actual(oid) => CommitKey::Actual(oid),
            BlameCommit::WorkingTree { parent } => CommitKey::Working(parent),
        }
    }
}

/// Blame `path` as it reads at `start_commit`.
#[tracing::instrument(level = "debug", skip(repo, options), fields(path = ?path))]
pub fn blame(
    repo: &Repository,
    start_commit: ObjectId,
    path: &BStr,
    options: BlameOptions,
) -> Result<Vec<BlameLine>, BlameError> {
    let mut sb = Scoreboard::new(repo, start_commit, path, options)?;
    sb.run()?;
    Ok(sb.into_lines())
}

/// Blame uncommitted changes: `content` is the working-tree version of
/// `path`, attributed against `parent` (normally HEAD) without ever writing
/// a commit object for it.
#[tracing::instrument(level = "debug", skip(repo, content, options), fields(path = ?path))]
pub fn blame_working_tree(
    repo: &Repository,
    parent: ObjectId,
    path: &BStr,
    content: Vec<u8>,
    options: BlameOptions,
) -> Result<Vec<BlameLine>, BlameError> {
    let mut sb = Scoreboard::new_working_tree(repo, parent, path, content, options)?;
    sb.run()?;
    Ok(sb.into_lines())
}

struct Scoreboard<'r> {
    repo: &'r Repository,
    final_image: Rc<Vec<u8>>,
    lines: Vec<Range<usize>>,
    entries: EntryList,
    origin_cache: HashMap<(CommitKey, BString), Origin>,
    options: BlameOptions,
}

impl<'r> Scoreboard<'r> {
    fn new(repo: &'r Repository, start_commit: ObjectId, path: &BStr, options: BlameOptions) -> Result<Self, BlameError> {
        let tree = pathwalk::commit_tree(repo.odb(), start_commit)?;
        let (blob_oid, mode) = pathwalk::resolve_path(repo.odb(), tree, path)?
            .ok_or_else(|| BlameError::PathNotInCommit(BString::from(path)))?;

        let origin = new_origin(BlameCommit::Actual(start_commit), BString::from(path), mode, Some(blob_oid));
        let content = origin.content(repo.odb())?;
        let lines = line_ranges(&content);

        let mut origin_cache = HashMap::new();
        origin_cache.insert((CommitKey::Actual(start_commit), BString::from(path)), origin.clone());

        let entries = EntryList::new(lines.len() as u32, origin);

        Ok(Scoreboard {
            repo,
            final_image: content,
            lines,
            entries,
            origin_cache,
            options,
        })
    }

    fn new_working_tree(
        repo: &'r Repository,
        parent: ObjectId,
        path: &BStr,
        content: Vec<u8>,
        options: BlameOptions,
    ) -> Result<Self, BlameError> {
        let origin = new_working_tree_origin(parent, BString::from(path), content);
        let final_image = origin.content(repo.odb())?;
        let lines = line_ranges(&final_image);

        let mut origin_cache = HashMap::new();
        origin_cache.insert((CommitKey::Working(parent), BString::from(path)), origin.clone());

        let entries = EntryList::new(lines.len() as u32, origin);

        Ok(Scoreboard {
            repo,
            final_image,
            lines,
            entries,
            origin_cache,
            options,
        })
    }

    fn final_lines(&self) -> Vec<&[u8]> {
        self.lines.iter().map(|r| &self.final_image[r.clone()]).collect()
    }

    fn slice_final(&self, lno: u32, num_lines: u32) -> &[u8] {
        if num_lines == 0 {
            return &[];
        }
        let start = self.lines[lno as usize].start;
        let end = self.lines[(lno + num_lines - 1) as usize].end;
        &self.final_image[start..end]
    }

    fn get_origin(&mut self, commit: BlameCommit, path: BString) -> Result<Option<Origin>, BlameError> {
        let key = (CommitKey::from(commit), path.clone());
        if let Some(existing) = self.origin_cache.get(&key) {
            return Ok(Some(existing.clone()));
        }
        let oid = match commit {
            BlameCommit::Actual(oid) => oid,
            BlameCommit::WorkingTree { .. } => return Ok(None),
        };
        let tree = pathwalk::commit_tree(self.repo.odb(), oid)?;
        match pathwalk::resolve_path(self.repo.odb(), tree, path.as_bstr())? {
            Some((blob_oid, mode)) => {
                let origin = new_origin(commit, path.clone(), mode, Some(blob_oid));
                self.origin_cache.insert(key, origin.clone());
                Ok(Some(origin))
            }
            None => Ok(None),
        }
    }

    /// `assign_blame`: repeatedly pick a non-guilty entry's suspect, try to
    /// pass its lines to each parent, then finalize whatever's left.
    fn run(&mut self) -> Result<(), BlameError> {
        loop {
            let suspect = match self
                .entries
                .live_indices()
                .into_iter()
                .find(|&i| !self.entries.get(i).guilty)
            {
                Some(i) => self.entries.get(i).suspect.clone(),
                None => break,
            };

            let (parents, is_root) = match suspect.commit {
                BlameCommit::WorkingTree { parent } => (vec![parent], false),
                BlameCommit::Actual(oid) => {
                    let parents = pathwalk::commit_parents(self.repo.odb(), oid)?;
                    let is_root = parents.is_empty();
                    (parents, is_root)
                }
            };

            let explicit_boundary = matches!(suspect.commit, BlameCommit::Actual(oid) if self.options.boundary_commits.contains(&oid));
            let is_boundary = explicit_boundary || (is_root && !self.options.show_root);

            tracing::trace!(
                commit = ?suspect.commit,
                parents = parents.len(),
                is_boundary,
                "assigning suspect"
            );

            if !is_boundary {
                self.pass_blame(&suspect, &parents)?;
            }

            for idx in self.entries.live_indices() {
                let matches = {
                    let e = self.entries.get(idx);
                    !e.guilty && same_suspect(&e.suspect, &suspect)
                };
                if matches {
                    let e = self.entries.get_mut(idx);
                    e.guilty = true;
                    if is_boundary {
                        e.boundary = true;
                    }
                }
            }
            self.entries.coalesce();
        }
        tracing::debug!(entries = self.entries.live_indices().len(), "blame assignment finished");
        Ok(())
    }

    /// `pass_blame`: resolve one scapegoat origin per parent (exact path,
    /// falling back to rename detection), short-circuit on an identical
    /// blob, otherwise diff against each distinct scapegoat in turn.
    fn pass_blame(&mut self, target: &Origin, parents: &[ObjectId]) -> Result<(), BlameError> {
        if parents.is_empty() {
            return Ok(());
        }

        let mut scapegoats: Vec<Origin> = Vec::new();
        let mut seen_blobs: HashSet<Option<ObjectId>> = HashSet::new();

        for &parent_oid in parents {
            let via_path = self.get_origin(BlameCommit::Actual(parent_oid), target.path.clone())?;
            let resolved = match via_path {
                Some(o) => Some(o),
                None if self.options.detect_renames => self.find_rename(parent_oid, target)?,
                None => None,
            };
            if let Some(origin) = resolved {
                if seen_blobs.insert(origin.blob_oid) {
                    scapegoats.push(origin);
                }
            }
        }

        if let Some(target_blob) = target.blob_oid {
            if let Some(identical) = scapegoats.iter().find(|o| o.blob_oid == Some(target_blob)).cloned() {
                self.pass_whole_blame(target, &identical);
                return Ok(());
            }
        }

        for parent_origin in scapegoats.clone() {
            self.pass_blame_to_parent(target, &parent_origin)?;
        }

        if self.options.detect_moves {
            for parent_origin in &scapegoats {
                self.find_move_in_parent(target, parent_origin)?;
            }
        }
        if self.options.detect_copies {
            for &parent_oid in parents {
                self.find_copy_in_parent(target, parent_oid)?;
            }
        }

        Ok(())
    }

    /// The parent's blob is byte-identical to the suspect's: transfer every
    /// still-suspect entry wholesale, no textual diff needed.
    fn pass_whole_blame(&mut self, target: &Origin, parent: &Origin) {
        for idx in self.entries.live_indices() {
            let matches = {
                let e = self.entries.get(idx);
                !e.guilty && same_suspect(&e.suspect, target)
            };
            if matches {
                self.entries.get_mut(idx).suspect = parent.clone();
            }
        }
    }

    fn find_rename(&self, parent_oid: ObjectId, target: &Origin) -> Result<Option<Origin>, BlameError> {
        let target_commit_oid = match target.commit {
            BlameCommit::Actual(oid) => oid,
            BlameCommit::WorkingTree { .. } => return Ok(None),
        };

        let parent_tree = pathwalk::commit_tree(self.repo.odb(), parent_oid)?;
        let target_tree = pathwalk::commit_tree(self.repo.odb(), target_commit_oid)?;

        let mut diff_opts = git_diff::DiffOptions::default();
        diff_opts.detect_renames = true;
        diff_opts.rename_threshold = self.options.rename_threshold;

        let mut result = git_diff::tree::diff_trees(
            self.repo.odb(),
            Some(&parent_tree),
            Some(&target_tree),
            &diff_opts,
        )?;
        git_diff::rename::detect_renames(self.repo.odb(), &mut result, self.options.rename_threshold)?;

        for f in &result.files {
            if f.status == git_diff::FileStatus::Renamed && f.new_path.as_ref() == Some(&target.path) {
                if let (Some(old_path), Some(old_oid), Some(old_mode)) = (&f.old_path, f.old_oid, f.old_mode) {
                    return Ok(Some(new_origin(
                        BlameCommit::Actual(parent_oid),
                        old_path.clone(),
                        old_mode,
                        Some(old_oid),
                    )));
                }
            }
        }
        Ok(None)
    }

    /// `pass_blame_to_parent`: textually diff the suspect's blob against a
    /// parent's and attribute every matched (unchanged) region to it.
    fn pass_blame_to_parent(&mut self, target: &Origin, parent: &Origin) -> Result<(), BlameError> {
        let any_live = self.entries.live_indices().into_iter().any(|i| {
            let e = self.entries.get(i);
            !e.guilty && same_suspect(&e.suspect, target)
        });
        if !any_live {
            return Ok(());
        }

        let parent_bytes = parent.content(self.repo.odb())?;
        let target_bytes = target.content(self.repo.odb())?;
        let edits = git_diff::algorithm::diff_edits(&parent_bytes, &target_bytes, git_diff::DiffAlgorithm::Myers);

        for (plno, tlno, len) in equal_runs(&edits) {
            self.blame_chunk(tlno, plno, tlno + len, target, parent);
        }
        Ok(())
    }

    /// `blame_chunk`: within origin-blob window `[tlno, same_end)`, find
    /// every still-suspect entry overlapping it and split off the overlap.
    fn blame_chunk(&mut self, tlno: u32, plno: u32, same_end: u32, target: &Origin, parent: &Origin) {
        for idx in self.entries.live_indices() {
            let (e_start, e_end, live) = {
                let e = self.entries.get(idx);
                let same = !e.guilty && same_suspect(&e.suspect, target);
                (e.s_lno, e.s_lno + e.num_lines, same)
            };
            if !live || e_end <= tlno || e_start >= same_end {
                continue;
            }
            let overlap_start = e_start.max(tlno);
            let overlap_end = e_end.min(same_end);
            let parent_s_lno = plno + (overlap_start - tlno);
            self.split_overlap(idx, overlap_start, overlap_end, parent_s_lno, target, parent);
        }
    }

    /// `split_overlap` + `split_blame`: partition entry `idx` into up to
    /// three pieces (before/match/after) against the origin-blob window
    /// `[overlap_start, overlap_end)`, reassigning only the matched middle
    /// piece to `parent`.
    fn split_overlap(
        &mut self,
        idx: usize,
        overlap_start: u32,
        overlap_end: u32,
        parent_s_lno: u32,
        target: &Origin,
        parent: &Origin,
    ) {
        let (e_lno, e_num, e_s_lno) = {
            let e = self.entries.get(idx);
            (e.lno, e.num_lines, e.s_lno)
        };

        let before_len = overlap_start - e_s_lno;
        let match_len = overlap_end - overlap_start;
        let after_len = (e_s_lno + e_num) - overlap_end;

        let mut cursor = idx;
        let mut wrote_primary = false;

        if before_len > 0 {
            self.entries.overwrite(idx, e_lno, before_len, target.clone(), e_s_lno);
            wrote_primary = true;
            cursor = idx;
        }

        if match_len > 0 {
            let match_lno = e_lno + before_len;
            if !wrote_primary {
                self.entries.overwrite(idx, match_lno, match_len, parent.clone(), parent_s_lno);
                wrote_primary = true;
                cursor = idx;
            } else {
                cursor = self.entries.insert_after(Some(cursor), match_lno, match_len, parent.clone(), parent_s_lno);
            }
        }

        if after_len > 0 {
            let after_lno = e_lno + before_len + match_len;
            let after_s_lno = e_s_lno + before_len + match_len;
            if !wrote_primary {
                self.entries.overwrite(idx, after_lno, after_len, target.clone(), after_s_lno);
            } else {
                self.entries.insert_after(Some(cursor), after_lno, after_len, target.clone(), after_s_lno);
            }
        }
    }

    fn find_move_in_parent(&mut self, target: &Origin, parent: &Origin) -> Result<(), BlameError> {
        let candidates: Vec<usize> = self
            .entries
            .live_indices()
            .into_iter()
            .filter(|&i| {
                let e = self.entries.get(i);
                !e.guilty && !e.scanned && same_suspect(&e.suspect, target)
            })
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let parent_bytes = parent.content(self.repo.odb())?;

        for idx in candidates {
            let (e_lno, e_num, e_s_lno) = {
                let e = self.entries.get(idx);
                (e.lno, e.num_lines, e.s_lno)
            };
            let score = self.entries.get(idx).score(&self.final_lines());
            if score < self.options.move_threshold {
                self.entries.get_mut(idx).scanned = true;
                continue;
            }

            let needle = self.slice_final(e_lno, e_num);
            if let Some(found_at) = find_line_run(&parent_bytes, needle) {
                if found_at != e_s_lno {
                    self.split_overlap(idx, e_s_lno, e_s_lno + e_num, found_at, target, parent);
                }
            }
            self.entries.get_mut(idx).scanned = true;
        }
        Ok(())
    }

    fn find_copy_in_parent(&mut self, target: &Origin, parent_oid: ObjectId) -> Result<(), BlameError> {
        let candidates: Vec<usize> = self
            .entries
            .live_indices()
            .into_iter()
            .filter(|&i| {
                let e = self.entries.get(i);
                !e.guilty && !e.scanned && same_suspect(&e.suspect, target)
            })
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let parent_tree = pathwalk::commit_tree(self.repo.odb(), parent_oid)?;
        let mut files = Vec::new();
        pathwalk::collect_blob_paths(self.repo.odb(), parent_tree, &BString::from(""), &mut files)?;

        for idx in candidates {
            let (e_lno, e_num, e_s_lno) = {
                let e = self.entries.get(idx);
                (e.lno, e.num_lines, e.s_lno)
            };
            let score = self.entries.get(idx).score(&self.final_lines());
            if score < self.options.copy_threshold {
                self.entries.get_mut(idx).scanned = true;
                continue;
            }

            let needle = self.slice_final(e_lno, e_num);
            let mut found: Option<(BString, FileMode, ObjectId, u32)> = None;
            for (path, mode, oid) in &files {
                if path == &target.path {
                    continue;
                }
                let data = match self.repo.odb().read(oid) {
                    Ok(Some(git_object::Object::Blob(b))) => b.data.to_vec(),
                    _ => continue,
                };
                if let Some(at) = find_line_run(&data, needle) {
                    found = Some((path.clone(), *mode, *oid, at));
                    break;
                }
            }

            if let Some((path, mode, oid, at)) = found {
                let origin = new_origin(BlameCommit::Actual(parent_oid), path, mode, Some(oid));
                self.split_overlap(idx, e_s_lno, e_s_lno + e_num, at, target, &origin);
            }
            self.entries.get_mut(idx).scanned = true;
        }
        Ok(())
    }

    fn into_lines(self) -> Vec<BlameLine> {
        let mut out = Vec::new();
        for idx in self.entries.live_indices() {
            let e = self.entries.get(idx);
            for j in 0..e.num_lines {
                let commit = match e.suspect.commit {
                    BlameCommit::Actual(oid) => Some(oid),
                    BlameCommit::WorkingTree { .. } => None,
                };
                out.push(BlameLine {
                    final_line: e.lno + j + 1,
                    commit,
                    path: e.suspect.path.clone(),
                    origin_line: e.s_lno + j + 1,
                    boundary: e.boundary,
                });
            }
        }
        out
    }
}

fn line_ranges(data: &[u8]) -> Vec<Range<usize>> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            ranges.push(start..i + 1);
            start = i + 1;
        }
    }
    if start < data.len() {
        ranges.push(start..data.len());
    }
    ranges
}

fn equal_runs(edits: &[git_diff::algorithm::Edit]) -> Vec<(u32, u32, u32)> {
    use git_diff::algorithm::EditOp;

    let mut out = Vec::new();
    let mut i = 0;
    while i < edits.len() {
        if edits[i].op == EditOp::Equal {
            let start = i;
            let old_start = edits[i].old_index;
            let new_start = edits[i].new_index;
            while i < edits.len() && edits[i].op == EditOp::Equal {
                i += 1;
            }
            out.push((old_start as u32, new_start as u32, (i - start) as u32));
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_object::{Blob, Object, Tree, TreeEntry};
    use git_utils::date::{GitDate, Signature};

    /// A bare repo plus a handle to keep the backing tempdir alive.
    struct Fixture {
        repo: Repository,
        _dir: tempfile::TempDir,
    }

    fn sig(name: &str) -> Signature {
        Signature {
            name: BString::from(name),
            email: BString::from("test@example.com"),
            date: GitDate { timestamp: 1_700_000_000, tz_offset: 0 },
        }
    }

    fn write_blob(repo: &Repository, data: &[u8]) -> ObjectId {
        repo.odb().write(&Object::Blob(Blob::new(data.to_vec()))).unwrap()
    }

    fn write_tree(repo: &Repository, entries: Vec<(&str, FileMode, ObjectId)>) -> ObjectId {
        let mut tree = Tree::new();
        for (name, mode, oid) in entries {
            tree.entries.push(TreeEntry { mode, name: BString::from(name), oid });
        }
        tree.entries.sort_by(TreeEntry::cmp_entries);
        repo.odb().write(&Object::Tree(tree)).unwrap()
    }

    fn write_commit(repo: &Repository, tree: ObjectId, parents: Vec<ObjectId>, message: &str) -> ObjectId {
        let commit = git_object::Commit {
            tree,
            parents,
            author: sig("Author"),
            committer: sig("Author"),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: BString::from(message),
        };
        repo.odb().write(&Object::Commit(commit)).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        Fixture { repo, _dir: dir }
    }

    #[test]
    fn single_commit_blames_every_line_to_it() {
        let f = fixture();
        let blob = write_blob(&f.repo, b"one\ntwo\nthree\n");
        let tree = write_tree(&f.repo, vec![("file.txt", FileMode::Regular, blob)]);
        let commit = write_commit(&f.repo, tree, vec![], "initial");

        let lines = blame(&f.repo, commit, BStr::new(b"file.txt"), BlameOptions::default()).unwrap();

        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line.commit, Some(commit));
            assert_eq!(line.final_line, i as u32 + 1);
            assert_eq!(line.origin_line, i as u32 + 1);
            assert!(line.boundary);
        }
    }

    #[test]
    fn appended_line_blames_to_second_commit() {
        let f = fixture();

        let blob1 = write_blob(&f.repo, b"one\ntwo\n");
        let tree1 = write_tree(&f.repo, vec![("file.txt", FileMode::Regular, blob1)]);
        let c1 = write_commit(&f.repo, tree1, vec![], "first");

        let blob2 = write_blob(&f.repo, b"one\ntwo\nthree\n");
        let tree2 = write_tree(&f.repo, vec![("file.txt", FileMode::Regular, blob2)]);
        let c2 = write_commit(&f.repo, tree2, vec![c1], "second");

        let lines = blame(&f.repo, c2, BStr::new(b"file.txt"), BlameOptions::default()).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].commit, Some(c1));
        assert_eq!(lines[1].commit, Some(c1));
        assert_eq!(lines[2].commit, Some(c2));
        assert!(lines[0].boundary);
        assert!(!lines[2].boundary);
    }

    #[test]
    fn modified_line_blames_to_the_commit_that_changed_it() {
        let f = fixture();

        let blob1 = write_blob(&f.repo, b"alpha\nbeta\ngamma\n");
        let tree1 = write_tree(&f.repo, vec![("file.txt", FileMode::Regular, blob1)]);
        let c1 = write_commit(&f.repo, tree1, vec![], "first");

        let blob2 = write_blob(&f.repo, b"alpha\nBETA-CHANGED\ngamma\n");
        let tree2 = write_tree(&f.repo, vec![("file.txt", FileMode::Regular, blob2)]);
        let c2 = write_commit(&f.repo, tree2, vec![c1], "second");

        let lines = blame(&f.repo, c2, BStr::new(b"file.txt"), BlameOptions::default()).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].commit, Some(c1));
        assert_eq!(lines[1].commit, Some(c2));
        assert_eq!(lines[2].commit, Some(c1));
    }

    #[test]
    fn rename_is_followed_when_enabled() {
        let f = fixture();

        let blob1 = write_blob(&f.repo, b"line one\nline two\nline three\nline four\nline five\n");
        let tree1 = write_tree(&f.repo, vec![("old.txt", FileMode::Regular, blob1)]);
        let c1 = write_commit(&f.repo, tree1, vec![], "first");

        // Renamed to new.txt with one extra line appended, no other changes.
        let blob2 = write_blob(&f.repo, b"line one\nline two\nline three\nline four\nline five\nline six\n");
        let tree2 = write_tree(&f.repo, vec![("new.txt", FileMode::Regular, blob2)]);
        let c2 = write_commit(&f.repo, tree2, vec![c1], "rename and append");

        let mut opts = BlameOptions::default();
        opts.detect_renames = true;

        let lines = blame(&f.repo, c2, BStr::new(b"new.txt"), opts).unwrap();

        assert_eq!(lines.len(), 6);
        for line in &lines[..5] {
            assert_eq!(line.commit, Some(c1));
            assert_eq!(line.path, BString::from("old.txt"));
        }
        assert_eq!(lines[5].commit, Some(c2));
        assert_eq!(lines[5].path, BString::from("new.txt"));
    }

    #[test]
    fn root_commit_is_boundary_unless_show_root() {
        let f = fixture();
        let blob = write_blob(&f.repo, b"only line\n");
        let tree = write_tree(&f.repo, vec![("a.txt", FileMode::Regular, blob)]);
        let commit = write_commit(&f.repo, tree, vec![], "root");

        let lines = blame(&f.repo, commit, BStr::new(b"a.txt"), BlameOptions::default()).unwrap();
        assert!(lines[0].boundary);

        let mut opts = BlameOptions::default();
        opts.show_root = true;
        let lines = blame(&f.repo, commit, BStr::new(b"a.txt"), opts).unwrap();
        assert!(!lines[0].boundary);
    }

    #[test]
    fn explicit_boundary_commit_finalizes_without_recursing_further() {
        let f = fixture();

        let blob1 = write_blob(&f.repo, b"x\ny\n");
        let tree1 = write_tree(&f.repo, vec![("f.txt", FileMode::Regular, blob1)]);
        let c1 = write_commit(&f.repo, tree1, vec![], "first");

        let blob2 = write_blob(&f.repo, b"x\ny\nz\n");
        let tree2 = write_tree(&f.repo, vec![("f.txt", FileMode::Regular, blob2)]);
        let c2 = write_commit(&f.repo, tree2, vec![c1], "second");

        let mut opts = BlameOptions::default();
        opts.boundary_commits.insert(c2);

        let lines = blame(&f.repo, c2, BStr::new(b"f.txt"), opts).unwrap();

        // c2 is forced to be a boundary: every line stays attributed to it.
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert_eq!(line.commit, Some(c2));
            assert!(line.boundary);
        }
    }

    #[test]
    fn working_tree_blame_attributes_unchanged_lines_to_parent() {
        let f = fixture();

        let blob = write_blob(&f.repo, b"first\nsecond\n");
        let tree = write_tree(&f.repo, vec![("w.txt", FileMode::Regular, blob)]);
        let parent = write_commit(&f.repo, tree, vec![], "parent");

        let working_content = b"first\nsecond\nthird uncommitted\n".to_vec();
        let lines = blame_working_tree(&f.repo, parent, BStr::new(b"w.txt"), working_content, BlameOptions::default()).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].commit, Some(parent));
        assert_eq!(lines[1].commit, Some(parent));
        assert_eq!(lines[2].commit, None);
    }

    #[test]
    fn missing_path_is_an_error() {
        let f = fixture();
        let blob = write_blob(&f.repo, b"content\n");
        let tree = write_tree(&f.repo, vec![("present.txt", FileMode::Regular, blob)]);
        let commit = write_commit(&f.repo, tree, vec![], "only commit");

        let err = blame(&f.repo, commit, BStr::new(b"missing.txt"), BlameOptions::default()).unwrap_err();
        assert!(matches!(err, BlameError::PathNotInCommit(_)));
    }
}
