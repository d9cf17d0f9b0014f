use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use crate::core::error::{Error, Result};
use crate::core::types::PartId;
use crate::trie::node::{NodeHandle, NodeLoc};

/// Read the `<shard_id>:<handle>` root pointer. None if the file is missing.
pub fn read_head(path: &Path) -> Result<Option<NodeLoc>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    parse_head(text.trim()).map(Some)
}

pub fn parse_head(text: &str) -> Result<NodeLoc> {
    let bad = || Error::corrupted(format!("Malformed HEAD pointer '{}'", text));
    let (part, handle) = text.split_once(':').ok_or_else(bad)?;
    let part = part.parse::<u32>().map_err(|_| bad())?;
    let handle = handle.parse::<u32>().map_err(|_| bad())?;
    Ok(NodeLoc::new(PartId(part), NodeHandle(handle)))
}

/// Replace the root pointer atomically: write a temp file, then rename it over HEAD
pub fn write_head(path: &Path, head: NodeLoc) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    write!(temp, "{}:{}", head.part.0, head.handle.0)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn head_round_trip_and_replace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("HEAD");
        assert!(read_head(&path).unwrap().is_none());

        write_head(&path, NodeLoc::new(PartId(0), NodeHandle(256))).unwrap();
        write_head(&path, NodeLoc::new(PartId(3), NodeHandle(4096))).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "3:4096");
        assert_eq!(read_head(&path).unwrap(), Some(NodeLoc::new(PartId(3), NodeHandle(4096))));
    }

    #[test]
    fn garbage_head_is_corruption() {
        for text in ["", "12", "a:1", "1:", "1:2:3"] {
            let err = parse_head(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Corrupted, "{:?}", text);
        }
    }
}
