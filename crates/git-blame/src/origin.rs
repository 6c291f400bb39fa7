//! A suspect: a (commit, path) pair plus its lazily-read blob content.
//!
//! C git's `struct origin` carries a manual `refcnt` because its blame
//! entries and scoreboard share ownership through raw pointers. Here the
//! sharing is expressed directly with `Rc`, so there is no incref/decref —
//! dropping the last `Origin` clone frees the cached blob.

use std::cell::RefCell;
use std::rc::Rc;

use bstr::BString;
use git_hash::ObjectId;
use git_object::FileMode;

/// Identifies the commit a suspect belongs to.
///
/// A real commit is looked up in the object database like any other;
/// `WorkingTree` represents an in-memory commit constructed to blame
/// uncommitted changes — it is never written to the object store.
#[derive(Debug, Clone, Copy)]
pub enum BlameCommit {
    Actual(ObjectId),
    WorkingTree { parent: ObjectId },
}

impl BlameCommit {
    pub fn is_working_tree(&self) -> bool {
        matches!(self, BlameCommit::WorkingTree { .. })
    }
}

#[derive(Debug)]
pub struct OriginInner {
    pub commit: BlameCommit,
    pub path: BString,
    pub mode: FileMode,
    /// OID of the blob at `path` in `commit`'s tree. `None` for the
    /// working-tree origin, whose content is supplied directly.
    pub blob_oid: Option<ObjectId>,
    content: RefCell<Option<Rc<Vec<u8>>>>,
}

/// A suspect. Cloning is cheap (`Rc::clone`); equality of the pointed-to
/// commit+path is checked with [`same_suspect`], not `==`.
pub type Origin = Rc<OriginInner>;

pub fn new_origin(commit: BlameCommit, path: BString, mode: FileMode, blob_oid: Option<ObjectId>) -> Origin {
    Rc::new(OriginInner {
        commit,
        path,
        mode,
        blob_oid,
        content: RefCell::new(None),
    })
}

pub fn new_working_tree_origin(parent: ObjectId, path: BString, content: Vec<u8>) -> Origin {
    Rc::new(OriginInner {
        commit: BlameCommit::WorkingTree { parent },
        path,
        mode: FileMode::Regular,
        blob_oid: None,
        content: RefCell::new(Some(Rc::new(content))),
    })
}

impl OriginInner {
    /// Fetch (and cache) this origin's blob content.
    pub fn content(
        &self,
        odb: &git_odb::ObjectDatabase,
    ) -> Result<Rc<Vec<u8>>, crate::BlameError> {
        if let Some(cached) = self.content.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let reference_commit = match self.commit {
            BlameCommit::Actual(oid) => oid,
            BlameCommit::WorkingTree { parent } => parent,
        };
        let oid = self.blob_oid.ok_or_else(|| crate::BlameError::BlobUnreadable {
            commit: reference_commit,
            path: self.path.clone(),
        })?;
        let data = read_blob(odb, oid, reference_commit, &self.path)?;
        let rc = Rc::new(data);
        *self.content.borrow_mut() = Some(rc.clone());
        Ok(rc)
    }
}

fn read_blob(
    odb: &git_odb::ObjectDatabase,
    oid: ObjectId,
    commit: ObjectId,
    path: &BString,
) -> Result<Vec<u8>, crate::BlameError> {
    use git_object::Object;

    match odb.read(&oid)? {
        Some(Object::Blob(blob)) => Ok(blob.data.to_vec()),
        Some(_) | None => Err(crate::BlameError::BlobUnreadable {
            commit,
            path: path.clone(),
        }),
    }
}

/// git's `same_suspect`: identical object, or same (commit, path).
pub fn same_suspect(a: &Origin, b: &Origin) -> bool {
    Rc::ptr_eq(a, b) || (a.commit == b.commit && a.path == b.path)
}

impl PartialEq for BlameCommit {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BlameCommit::Actual(a), BlameCommit::Actual(b)) => a == b,
            (BlameCommit::WorkingTree { parent: a }, BlameCommit::WorkingTree { parent: b }) => a == b,
            _ => false,
        }
    }
}
impl Eq for BlameCommit {}
