//! Full-rescan change detection against remembered version tokens.

use crate::schema::DocumentDescriptor;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Path → version token (the verbatim listing timestamp).
pub type VersionState = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// New or modified documents, in scan order.
    pub changed: Vec<DocumentDescriptor>,
    /// Remembered paths that the scan no longer saw.
    pub deleted: BTreeSet<String>,
    pub next_state: VersionState,
}

/// Compares one complete scan with `previous`.
///
/// The first scan error aborts detection: with part of the tree unseen,
/// nothing can be declared deleted.
pub fn detect_changes<I, E>(descriptors: I, previous: &VersionState) -> Result<ChangeSet, E>
where
    I: IntoIterator<Item = Result<DocumentDescriptor, E>>,
{
    let mut changed = Vec::new();
    let mut next_state = VersionState::new();

    for descriptor in descriptors {
        let descriptor = descriptor?;
        let token = descriptor.last_modified_text.clone();
        if previous.get(&descriptor.path) != Some(&token) {
            changed.push(descriptor.clone());
        }
        next_state.insert(descriptor.path, token);
    }

    let deleted = previous
        .keys()
        .filter(|path| !next_state.contains_key(*path))
        .cloned()
        .collect();

    Ok(ChangeSet {
        changed,
        deleted,
        next_state,
    })
}

/// Reads a state file written by [`save_state`]. A missing file is an empty
/// state, so the first run reports everything as new.
pub fn load_state(path: &Path) -> Result<VersionState> {
    if !path.exists() {
        return Ok(VersionState::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub fn save_state(path: &Path, state: &VersionState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentType;
    use proptest::prelude::*;
    use std::convert::Infallible;
    use time::macros::{date, datetime};

    fn descriptor(path: &str, token: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            path: path.to_string(),
            url: format!("http://archive.test{path}"),
            org: "Org".into(),
            date: date!(2016 - 01 - 04),
            year: 2016,
            policymaker_abbr: "ABC".into(),
            policymaker_id: "X".into(),
            meeting_nr: 1,
            doc_type_code: "Pk".into(),
            doc_type: DocumentType::Minutes,
            language: "Su".into(),
            origin_id: format!("origin{path}"),
            last_modified_text: token.to_string(),
            last_modified: datetime!(2016-01-05 11:06),
            size: 1000,
        }
    }

    fn ok_all(items: &[(String, String)]) -> Vec<Result<DocumentDescriptor, Infallible>> {
        items.iter().map(|(p, t)| Ok(descriptor(p, t))).collect()
    }

    #[test]
    fn classifies_new_modified_unchanged_and_deleted() {
        let previous: VersionState = [
            ("/a", "1/5/2016 11:06 AM"),
            ("/b", "1/5/2016 11:06 AM"),
            ("/gone", "1/1/2015 9:00 AM"),
        ]
        .into_iter()
        .map(|(p, t)| (p.to_string(), t.to_string()))
        .collect();
        let scan = ok_all(&[
            ("/a".into(), "1/5/2016 11:06 AM".into()),
            ("/b".into(), "2/5/2016 11:06 AM".into()),
            ("/c".into(), "3/5/2016 11:06 AM".into()),
        ]);

        let changes = detect_changes(scan, &previous).unwrap();
        let changed: Vec<&str> = changes.changed.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(changed, vec!["/b", "/c"]);
        assert_eq!(changes.deleted, BTreeSet::from(["/gone".to_string()]));
        assert_eq!(changes.next_state.len(), 3);
        assert_eq!(changes.next_state["/b"], "2/5/2016 11:06 AM");
    }

    #[test]
    fn empty_previous_state_means_everything_is_new() {
        let scan = ok_all(&[("/a".into(), "t".into())]);
        let changes = detect_changes(scan, &VersionState::new()).unwrap();
        assert_eq!(changes.changed.len(), 1);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn scan_error_aborts() {
        let scan: Vec<Result<DocumentDescriptor, &str>> = vec![Ok(descriptor("/a", "t")), Err("listing broke")];
        let previous = VersionState::from([("/b".to_string(), "t".to_string())]);
        assert_eq!(detect_changes(scan, &previous), Err("listing broke"));
    }

    #[test]
    fn state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("versions.json");
        assert!(load_state(&path).unwrap().is_empty());

        let state = VersionState::from([("/files/A_1/x.zip".to_string(), "6/21/2017  1:00 PM".to_string())]);
        save_state(&path, &state).unwrap();
        assert_eq!(load_state(&path).unwrap(), state);
    }

    proptest! {
        #[test]
        fn change_sets_follow_map_difference(
            previous in prop::collection::btree_map("/[a-e]{1,2}", "[0-3]", 0..10),
            current in prop::collection::btree_map("/[a-e]{1,2}", "[0-3]", 0..10),
        ) {
            let scan: Vec<(String, String)> = current.clone().into_iter().collect();
            let changes = detect_changes(ok_all(&scan), &previous).unwrap();

            let expected_changed: Vec<String> = current
                .iter()
                .filter(|(path, token)| previous.get(*path) != Some(*token))
                .map(|(path, _)| path.clone())
                .collect();
            let changed: Vec<String> = changes.changed.iter().map(|d| d.path.clone()).collect();
            prop_assert_eq!(changed, expected_changed);

            let expected_deleted: BTreeSet<String> =
                previous.keys().filter(|p| !current.contains_key(*p)).cloned().collect();
            prop_assert_eq!(&changes.deleted, &expected_deleted);

            let mut expected_next = previous.clone();
            expected_next.retain(|path, _| !expected_deleted.contains(path));
            for descriptor in &changes.changed {
                expected_next.insert(descriptor.path.clone(), descriptor.last_modified_text.clone());
            }
            prop_assert_eq!(changes.next_state, expected_next);
        }
    }
}
