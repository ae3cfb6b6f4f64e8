//! Config file loading.
//!
//! A config file is a YAML mapping. It is read, converted into a
//! [`Value`] tree, and flattened into dotted lower-cased keys ready for a
//! store layer.
//!
//! A file that does not exist is not an error: [`load_file`] returns
//! `Ok(None)` and the caller decides whether that deserves a warning. Any
//! other I/O failure (permissions, a directory in the way) and any parse
//! failure is an error carrying the path.

use std::path::{Path, PathBuf};

use crate::error::ClapwireError;
use crate::value::Value;

/// A successfully read config file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub entries: Vec<(String, Value)>,
}

/// Read and flatten `path`. `Ok(None)` when the file does not exist.
pub fn load_file(path: &Path) -> Result<Option<LoadedFile>, ClapwireError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ClapwireError::IoError {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let entries = parse_entries(&content, path)?;
    Ok(Some(LoadedFile {
        path: path.to_path_buf(),
        entries,
    }))
}

/// Parse YAML `content` into flattened, lower-cased entries. An empty or
/// comment-only document yields no entries, and null leaves are dropped.
pub fn parse_entries(content: &str, path: &Path) -> Result<Vec<(String, Value)>, ClapwireError> {
    let parse_error = |source| ClapwireError::ParseError {
        path: path.to_path_buf(),
        source,
    };

    let doc: serde_yaml::Value = serde_yaml::from_str(content).map_err(parse_error)?;
    if doc.is_null() {
        return Ok(Vec::new());
    }
    // Anything but a mapping at the top level is rejected with serde_yaml's
    // own type error.
    let mapping: serde_yaml::Mapping = serde_yaml::from_value(doc).map_err(parse_error)?;

    // `port:` with no value, or a section whose children are all commented
    // out, sets nothing.
    Ok(Value::from(serde_yaml::Value::Mapping(mapping))
        .flatten()
        .into_iter()
        .filter(|(_, v)| *v != Value::Null)
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_file(&dir.path().join("nope.yaml")).unwrap(), None);
    }

    #[test]
    fn reads_and_flattens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yaml");
        fs::write(&path, "log:\n  level: debug\n  Max-Size: 5\nname: x\n").unwrap();

        let loaded = load_file(&path).unwrap().unwrap();
        assert_eq!(loaded.path, path);
        assert!(loaded.entries.contains(&("log.level".into(), Value::from("debug"))));
        assert!(loaded.entries.contains(&("log.max-size".into(), Value::Int(5))));
        assert!(loaded.entries.contains(&("name".into(), Value::from("x"))));
    }

    #[test]
    fn empty_and_comment_only_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.yaml");
        let comments = dir.path().join("comments.yaml");
        fs::write(&empty, "").unwrap();
        fs::write(&comments, "# nothing here\n").unwrap();

        assert!(load_file(&empty).unwrap().unwrap().entries.is_empty());
        assert!(load_file(&comments).unwrap().unwrap().entries.is_empty());
    }

    #[test]
    fn null_leaves_are_dropped() {
        let entries = parse_entries(
            "port:\ndatabase:\n#  pool_size: 9\nhost: x\n",
            Path::new("app.yaml"),
        )
        .unwrap();
        assert_eq!(entries, vec![("host".to_string(), Value::from("x"))]);
    }

    #[test]
    fn invalid_yaml_is_parse_error_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "key: [unclosed\n").unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ClapwireError::ParseError { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn non_mapping_document_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.yaml");
        fs::write(&path, "- a\n- b\n").unwrap();
        assert!(matches!(
            load_file(&path),
            Err(ClapwireError::ParseError { .. })
        ));
    }

    #[test]
    fn directory_in_the_way_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.yaml");
        fs::create_dir(&path).unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ClapwireError::IoError { .. }));
        assert!(err.to_string().contains("app.yaml"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_returns_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret.yaml");
        fs::write(&path, "a: 1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores file modes.
        if fs::read_to_string(&path).is_ok() {
            return;
        }
        assert!(matches!(
            load_file(&path),
            Err(ClapwireError::IoError { .. })
        ));
    }
}
