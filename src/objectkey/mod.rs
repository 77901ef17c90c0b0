//! Derives the human-meaningful segments out of a structured object key.
//!
//! Canonical shape: `patient/<patientId>/source_data/<dataId>/<uploadDataName>/`
//! or the same with a trailing `<fileName>` segment. Anything that does not
//! match is not an error here — callers get empty strings back and decide
//! for themselves whether that is fatal.

/// The upload-data-name: the segment between the last two slashes of the
/// path once any trailing file segment has been stripped. Empty if the key
/// does not contain at least `patient/.../source_data/.../<name>/`.
pub fn upload_data_name(object_key: &str) -> String {
    let trimmed = object_key.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() < 5 || segments[0] != "patient" || segments[2] != "source_data" {
        return String::new();
    }

    if object_key.ends_with('/') {
        // Folder form: .../<dataId>/<uploadDataName>/
        segments.last().copied().unwrap_or_default().to_owned()
    } else {
        // File form: .../<dataId>/<uploadDataName>/<fileName>
        if segments.len() < 6 {
            return String::new();
        }
        segments[segments.len() - 2].to_owned()
    }
}

/// The file-name: the segment after the final slash. Empty for folder-form
/// keys (those ending in `/`) and for keys that don't match the canonical
/// shape at all.
pub fn file_name(object_key: &str) -> String {
    if object_key.ends_with('/') || !is_canonical_shape(object_key) {
        return String::new();
    }
    object_key
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_owned()
}

/// The parent-directory form of a key: everything up to and including the
/// last slash. Used to build the `confirmBatch` object key for multi-file
/// groups. Idempotent on keys that already end in `/`.
pub fn parent_directory(object_key: &str) -> String {
    if object_key.ends_with('/') {
        return object_key.to_owned();
    }
    match object_key.rfind('/') {
        Some(idx) => object_key[..=idx].to_owned(),
        None => String::new(),
    }
}

fn is_canonical_shape(object_key: &str) -> bool {
    let trimmed = object_key.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    segments.len() >= 5 && segments[0] == "patient" && segments[2] == "source_data"
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_single_file_form() {
        let key = "patient/P/source_data/D1/f.bin/f.bin";
        assert_eq!(upload_data_name(key), "f.bin");
        assert_eq!(file_name(key), "f.bin");
    }

    #[test]
    fn parses_folder_form() {
        let key = "patient/P/source_data/D2/dir/a";
        assert_eq!(upload_data_name(key), "dir");
        assert_eq!(file_name(key), "a");
    }

    #[test]
    fn parses_bare_folder_key() {
        let key = "patient/P/source_data/D2/dir/";
        assert_eq!(upload_data_name(key), "dir");
        assert_eq!(file_name(key), "");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(upload_data_name("not/a/valid/key"), "");
        assert_eq!(file_name("not/a/valid/key"), "");
    }

    #[test]
    fn parent_directory_strips_trailing_segment() {
        assert_eq!(
            parent_directory("patient/P/source_data/D2/dir/a"),
            "patient/P/source_data/D2/dir/"
        );
        assert_eq!(
            parent_directory("patient/P/source_data/D2/dir/"),
            "patient/P/source_data/D2/dir/"
        );
    }
}
