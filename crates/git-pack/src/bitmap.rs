//! Bitmap index for fast reachability queries.
//!
//! Bitmap indexes store pre-computed reachability bitmaps for selected commits.
//! Each bit in a bitmap corresponds to an object's position in the pack index.
//! If bit N is set, the object at position N is reachable from that commit.
//!
//! Bitmaps are stored EWAH-compressed and, for commit entries, XOR-delta
//! encoded against an earlier entry ("lookback") to exploit the similarity
//! between a commit's reachable set and its ancestor's. Materializing an
//! entry means resolving that XOR chain; results are memoized so a given
//! entry is only ever decoded once per `BitmapIndex`.
//!
//! File format:
//! ```text
//! Header: "BITM" (4) | version (2) | flags (2) | num_entries (4)
//!         | pack checksum (20) | num_objects (4)
//! Type bitmaps: commits | trees | blobs | tags (EWAH, each sized to num_objects)
//! Commit entries: [commit_pos (4) | xor_offset (1) | flags (1) | bitmap (EWAH)]*
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git_hash::{HashAlgorithm, ObjectId};
use git_object::ObjectType;
use memmap2::Mmap;

use crate::index::PackIndex;
use crate::PackError;

const BITMAP_SIGNATURE: &[u8; 4] = b"BITM";
const BITMAP_VERSION: u16 = 1;

/// A dense, fixed-size bit vector over pack object positions.
///
/// Positions beyond `len` are never set; all bitwise ops between two
/// `Bitmap`s of different `len` operate over the shorter one's word range
/// and leave any extra capacity in the longer one untouched, which is safe
/// because queries never compare bitmaps of mismatched universes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    pub fn from_positions<I: IntoIterator<Item = u32>>(len: usize, positions: I) -> Self {
        let mut bm = Self::new(len);
        for pos in positions {
            bm.set(pos);
        }
        bm
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn set(&mut self, pos: u32) {
        let pos = pos as usize;
        if pos >= self.len {
            return;
        }
        self.words[pos / 64] |= 1u64 << (pos % 64);
    }

    pub fn contains(&self, pos: u32) -> bool {
        let pos = pos as usize;
        if pos >= self.len {
            return false;
        }
        self.words[pos / 64] & (1u64 << (pos % 64)) != 0
    }

    pub fn or_with(&mut self, other: &Bitmap) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    pub fn and_with(&mut self, other: &Bitmap) {
        for (i, a) in self.words.iter_mut().enumerate() {
            *a &= other.words.get(i).copied().unwrap_or(0);
        }
    }

    pub fn and_not_with(&mut self, other: &Bitmap) {
        for (i, a) in self.words.iter_mut().enumerate() {
            *a &= !other.words.get(i).copied().unwrap_or(0);
        }
    }

    pub fn xor_with(&mut self, other: &Bitmap) {
        for (i, a) in self.words.iter_mut().enumerate() {
            *a ^= other.words.get(i).copied().unwrap_or(0);
        }
    }

    /// Iterate set bit positions in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64u32).filter_map(move |b| {
                if w & (1u64 << b) != 0 {
                    Some(wi as u32 * 64 + b)
                } else {
                    None
                }
            })
        })
    }

    /// Length of the longest prefix `[0, k)` that is entirely contained in
    /// `self` (i.e. every position below `k` is set).
    pub fn contiguous_prefix_len(&self) -> u32 {
        let mut count = 0u32;
        for pos in 0..self.len as u32 {
            if self.contains(pos) {
                count += 1;
            } else {
                break;
            }
        }
        count
    }
}

fn type_index(ty: ObjectType) -> usize {
    match ty {
        ObjectType::Commit => 0,
        ObjectType::Tree => 1,
        ObjectType::Blob => 2,
        ObjectType::Tag => 3,
    }
}

struct CommitEntry {
    commit_pos: u32,
    xor_offset: u8,
    #[allow(dead_code)]
    flags: u8,
    /// Stored (pre-XOR) bitmap, decoded straight from the EWAH blob.
    stored: Bitmap,
}

/// A decoded bitmap index, tied to one specific pack.
pub struct BitmapIndex {
    bitmap_path: PathBuf,
    pack_checksum: ObjectId,
    num_objects: u32,
    type_bitmaps: [Bitmap; 4],
    entries: Vec<CommitEntry>,
    /// commit pack position -> entry index, for O(log n) / O(1) lookup.
    position_to_entry: HashMap<u32, usize>,
    /// Memoized materialized bitmaps, keyed by entry index.
    materialized: Mutex<HashMap<usize, Bitmap>>,
    /// Objects reachable only through alternates/loose storage, beyond this
    /// pack's own object count. Assigned positions starting at `num_objects`.
    extended: Mutex<HashMap<ObjectId, u32>>,
}

impl BitmapIndex {
    /// Open a bitmap index file, associating it with the pack index it was
    /// generated from (needed to size the type bitmaps and translate OIDs
    /// to pack positions).
    pub fn open(bitmap_path: impl AsRef<Path>, pack_index: &PackIndex) -> Result<Self, PackError> {
        let bitmap_path = bitmap_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&bitmap_path)?;
        let data = unsafe { Mmap::map(&file)? };

        let hash_algo = HashAlgorithm::Sha1;
        let hash_len = hash_algo.digest_len();

        let header_len = 4 + 2 + 2 + 4 + hash_len + 4;
        if data.len() < header_len {
            return Err(PackError::BitmapCorrupt("bitmap file too small".into()));
        }

        if &data[0..4] != BITMAP_SIGNATURE {
            return Err(PackError::BitmapCorrupt("bad bitmap signature".into()));
        }

        let version = u16::from_be_bytes([data[4], data[5]]);
        if version != BITMAP_VERSION {
            return Err(PackError::BitmapCorrupt(format!(
                "unsupported bitmap version {version}"
            )));
        }

        let _flags = u16::from_be_bytes([data[6], data[7]]);
        let num_entries = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let checksum_start = 12;
        let pack_checksum = ObjectId::from_bytes(&data[checksum_start..checksum_start + hash_len], hash_algo)
            .map_err(|e| PackError::BitmapCorrupt(format!("bad pack checksum: {e}")))?;
        if pack_checksum != pack_index.pack_checksum() {
            return Err(PackError::BitmapCorrupt(
                "bitmap does not match the pack it is paired with".into(),
            ));
        }

        let num_objects_pos = checksum_start + hash_len;
        let num_objects = u32::from_be_bytes([
            data[num_objects_pos],
            data[num_objects_pos + 1],
            data[num_objects_pos + 2],
            data[num_objects_pos + 3],
        ]);
        if num_objects != pack_index.num_objects() {
            return Err(PackError::BitmapCorrupt(format!(
                "bitmap covers {num_objects} objects but pack index has {}",
                pack_index.num_objects()
            )));
        }

        let mut pos = num_objects_pos + 4;
        let mut type_bitmaps_vec = Vec::with_capacity(4);
        for _ in 0..4 {
            let (bm, new_pos) = decode_ewah_bitmap(&data, pos, num_objects as usize)?;
            type_bitmaps_vec.push(bm);
            pos = new_pos;
        }
        let type_bitmaps: [Bitmap; 4] = type_bitmaps_vec
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly 4 pushed"));

        let mut entries = Vec::with_capacity(num_entries as usize);
        let mut position_to_entry = HashMap::with_capacity(num_entries as usize);
        for entry_idx in 0..num_entries as usize {
            if pos + 6 > data.len() {
                return Err(PackError::BitmapCorrupt("truncated commit entry".into()));
            }
            let commit_pos = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
            let xor_offset = data[pos + 4];
            let flags = data[pos + 5];
            pos += 6;

            if xor_offset as usize > entry_idx {
                return Err(PackError::BitmapCorrupt(format!(
                    "XOR lookback offset {xor_offset} out of range at entry {entry_idx}"
                )));
            }

            let (stored, new_pos) = decode_ewah_bitmap(&data, pos, num_objects as usize)?;
            pos = new_pos;

            position_to_entry.insert(commit_pos, entry_idx);
            entries.push(CommitEntry {
                commit_pos,
                xor_offset,
                flags,
                stored,
            });
        }

        Ok(Self {
            bitmap_path,
            pack_checksum,
            num_objects,
            type_bitmaps,
            entries,
            position_to_entry,
            materialized: Mutex::new(HashMap::new()),
            extended: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.bitmap_path
    }

    pub fn pack_checksum(&self) -> ObjectId {
        self.pack_checksum
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn num_entries(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn has_bitmap_for_position(&self, index_position: u32) -> bool {
        self.position_to_entry.contains_key(&index_position)
    }

    /// Materialize (and memoize) the reachability bitmap for the commit at
    /// `index_position`, resolving its XOR lookback chain if needed.
    pub fn reachable_bitmap(&self, index_position: u32) -> Result<Option<Bitmap>, PackError> {
        let entry_idx = match self.position_to_entry.get(&index_position) {
            Some(&idx) => idx,
            None => return Ok(None),
        };
        self.materialize(entry_idx).map(Some)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn materialize(&self, entry_idx: usize) -> Result<Bitmap, PackError> {
        if let Some(bm) = self.materialized.lock().unwrap().get(&entry_idx) {
            return Ok(bm.clone());
        }

        let entry = &self.entries[entry_idx];
        let result = if entry.xor_offset == 0 {
            entry.stored.clone()
        } else {
            let base_idx = entry_idx
                .checked_sub(entry.xor_offset as usize)
                .ok_or_else(|| {
                    PackError::BitmapCorrupt(format!(
                        "XOR lookback offset {} underflows at entry {entry_idx}",
                        entry.xor_offset
                    ))
                })?;
            tracing::trace!(base_idx, "resolving XOR lookback base");
            let mut base = self.materialize(base_idx)?;
            base.xor_with(&entry.stored);
            base
        };

        self.materialized.lock().unwrap().insert(entry_idx, result.clone());
        Ok(result)
    }

    /// Objects of `ty` within `result`, by ANDing with the pack-wide type bitmap.
    pub fn objects_of_type(&self, result: &Bitmap, ty: ObjectType) -> Bitmap {
        let mut out = result.clone();
        out.and_with(&self.type_bitmaps[type_index(ty)]);
        out
    }

    /// Assign (or fetch) an extended position for an object outside this
    /// pack's own object count, used when a reachability query needs to
    /// track objects found via alternates or loose storage.
    pub fn extended_position(&self, oid: ObjectId) -> u32 {
        let mut extended = self.extended.lock().unwrap();
        let next = self.num_objects + extended.len() as u32;
        *extended.entry(oid).or_insert(next)
    }
}

/// A reachability query: `want` minus `have`, optionally restricted to a
/// single object type.
///
/// `reuse` is derived, never caller-set: partial pack reuse cannot be
/// combined with a type filter, since the prefix-reuse byte range has no
/// cheap way to subtract objects of the wrong type from it.
pub struct BitmapQuery {
    pub want: Vec<ObjectId>,
    pub have: Vec<ObjectId>,
    pub type_filter: Option<ObjectType>,
}

impl BitmapQuery {
    pub fn reuse(&self) -> bool {
        self.type_filter.is_none()
    }
}

/// Which of a query's `want`/`have` commits lack a stored bitmap and must
/// be resolved by a caller-driven traversal (the Revision Walker, which
/// `git-pack` cannot depend on without a crate cycle).
pub struct PartitionedQuery<'a> {
    pub want_bitmap: Bitmap,
    pub have_bitmap: Bitmap,
    pub non_bitmapped_want: Vec<ObjectId>,
    pub non_bitmapped_have: Vec<ObjectId>,
    index: &'a BitmapIndex,
    pack_index: &'a PackIndex,
    query: &'a BitmapQuery,
}

impl<'a> PartitionedQuery<'a> {
    /// Finish the query once the caller has walked every non-bitmapped
    /// want/have commit and recorded the positions it visited (by setting
    /// bits in `extra_want`/`extra_have` via [`BitmapIndex::extended_position`]
    /// or a pack position obtained from the pack index).
    pub fn finish(mut self, extra_want: &Bitmap, extra_have: &Bitmap) -> Bitmap {
        self.want_bitmap.or_with(extra_want);
        self.have_bitmap.or_with(extra_have);
        self.want_bitmap.and_not_with(&self.have_bitmap);
        if let Some(ty) = self.query.type_filter {
            self.index.objects_of_type(&self.want_bitmap, ty)
        } else {
            self.want_bitmap
        }
    }

    /// Longest prefix of the pack (by index position) entirely contained in
    /// the result, usable for streaming a byte range unmodified into a new
    /// pack. `None` when the query disables reuse (a type filter is set).
    ///
    /// `base_of` must report each position's delta base position, if any;
    /// a prefix is only reusable if every base a chain depends on is also
    /// within the prefix.
    pub fn reuse_prefix(&self, result: &Bitmap, base_of: impl Fn(u32) -> Option<u32>) -> Option<u32> {
        if !self.query.reuse() {
            return None;
        }
        let mut prefix = result.contiguous_prefix_len();
        // Shrink the prefix until every delta base it depends on is covered.
        loop {
            let mut shrink_to = None;
            for pos in 0..prefix {
                if let Some(base) = base_of(pos) {
                    if base >= prefix {
                        shrink_to = Some(pos);
                        break;
                    }
                }
            }
            match shrink_to {
                Some(pos) => prefix = pos,
                None => break,
            }
        }
        Some(prefix)
    }

    pub fn pack_index(&self) -> &'a PackIndex {
        self.pack_index
    }
}

/// Partition a query's want/have sets into bitmapped and non-bitmapped
/// commits, OR-ing the materialized bitmaps of the bitmapped ones.
pub fn partition<'a>(
    index: &'a BitmapIndex,
    pack_index: &'a PackIndex,
    query: &'a BitmapQuery,
) -> Result<PartitionedQuery<'a>, PackError> {
    let mut want_bitmap = Bitmap::new(index.num_objects as usize);
    let mut have_bitmap = Bitmap::new(index.num_objects as usize);
    let mut non_bitmapped_want = Vec::new();
    let mut non_bitmapped_have = Vec::new();

    for (oid, target, non_bitmapped) in [
        (&query.want, &mut want_bitmap, &mut non_bitmapped_want),
        (&query.have, &mut have_bitmap, &mut non_bitmapped_have),
    ]
    .into_iter()
    .flat_map(|(oids, target, non_bitmapped)| {
        oids.iter().map(move |oid| (oid, &mut *target, &mut *non_bitmapped))
    }) {
        match pack_index.position_of(oid) {
            Some(pos) if index.has_bitmap_for_position(pos) => {
                if let Some(bm) = index.reachable_bitmap(pos)? {
                    target.or_with(&bm);
                }
            }
            _ => non_bitmapped.push(*oid),
        }
    }

    Ok(PartitionedQuery {
        want_bitmap,
        have_bitmap,
        non_bitmapped_want,
        non_bitmapped_have,
        index,
        pack_index,
        query,
    })
}

/// Decode an EWAH-compressed bitmap of `total_bits` length starting at `pos`.
/// Returns the decoded bitmap and the offset immediately following it.
fn decode_ewah_bitmap(data: &[u8], pos: usize, total_bits: usize) -> Result<(Bitmap, usize), PackError> {
    if pos + 8 > data.len() {
        return Err(PackError::BitmapCorrupt("truncated EWAH header".into()));
    }

    let bit_count = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
    let word_count =
        u32::from_be_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]) as usize;

    let mut bitmap = Bitmap::new(total_bits.max(bit_count as usize));
    let mut bit_pos: u32 = 0;
    let mut wpos = pos + 8;
    let mut words_remaining = word_count;

    while words_remaining > 0 {
        if wpos + 8 > data.len() {
            return Err(PackError::BitmapCorrupt("truncated EWAH data".into()));
        }

        let rlw = u64::from_be_bytes([
            data[wpos],
            data[wpos + 1],
            data[wpos + 2],
            data[wpos + 3],
            data[wpos + 4],
            data[wpos + 5],
            data[wpos + 6],
            data[wpos + 7],
        ]);
        wpos += 8;
        words_remaining -= 1;

        let fill_bit = (rlw & 1) != 0;
        let run_length = ((rlw >> 1) & 0xFFFF_FFFF) as u32;
        let literal_count = (rlw >> 33) as u32;

        if fill_bit {
            for _ in 0..run_length * 64 {
                if bit_pos < bit_count {
                    bitmap.set(bit_pos);
                }
                bit_pos += 1;
            }
        } else {
            bit_pos += run_length * 64;
        }

        for _ in 0..literal_count {
            if wpos + 8 > data.len() || words_remaining == 0 {
                return Err(PackError::BitmapCorrupt("truncated EWAH literal".into()));
            }
            let word = u64::from_be_bytes([
                data[wpos],
                data[wpos + 1],
                data[wpos + 2],
                data[wpos + 3],
                data[wpos + 4],
                data[wpos + 5],
                data[wpos + 6],
                data[wpos + 7],
            ]);
            wpos += 8;
            words_remaining -= 1;

            for bit in 0..64 {
                if word & (1u64 << bit) != 0 && bit_pos < bit_count {
                    bitmap.set(bit_pos);
                }
                bit_pos += 1;
            }
        }
    }

    Ok((bitmap, wpos))
}
