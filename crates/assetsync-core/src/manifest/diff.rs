//! Catalog difference between two manifests, keyed by asset path.

use std::collections::BTreeMap;

use super::asset::AssetRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Added,
    Modified,
    Deleted,
}

/// One changed path. For `Added` and `Modified` the record is the newer side's;
/// for `Deleted` it is the older side's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDiff {
    pub asset: AssetRecord,
    pub kind: DiffKind,
}

pub type DiffMap = BTreeMap<String, AssetDiff>;

/// Partition the keys of `from` and `to`:
/// only in `from` is Deleted, only in `to` is Added, in both with a different md5 is Modified.
pub fn diff_assets(
    from: &BTreeMap<String, AssetRecord>,
    to: &BTreeMap<String, AssetRecord>,
) -> DiffMap {
    let mut out = DiffMap::new();
    for (path, old) in from {
        match to.get(path) {
            None => {
                out.insert(
                    path.clone(),
                    AssetDiff {
                        asset: old.clone(),
                        kind: DiffKind::Deleted,
                    },
                );
            }
            Some(new) if new.md5 != old.md5 => {
                out.insert(
                    path.clone(),
                    AssetDiff {
                        asset: new.clone(),
                        kind: DiffKind::Modified,
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (path, new) in to {
        if !from.contains_key(path) {
            out.insert(
                path.clone(),
                AssetDiff {
                    asset: new.clone(),
                    kind: DiffKind::Added,
                },
            );
        }
    }
    out
}

/// Count entries per kind as (added, modified, deleted).
pub fn summarize(diff: &DiffMap) -> (usize, usize, usize) {
    diff.values().fold((0, 0, 0), |(a, m, d), entry| match entry.kind {
        DiffKind::Added => (a + 1, m, d),
        DiffKind::Modified => (a, m + 1, d),
        DiffKind::Deleted => (a, m, d + 1),
    })
}
