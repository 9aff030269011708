use sdfs_lib::{block_count_for, BlockDescriptor, DirEntry, EntryKind, SdfsError, SdfsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A file's metadata: its ordered block list and logical byte size.
/// Outside of a mutating call, `blocks.len() == block_count_for(size)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub blocks: Vec<BlockDescriptor>,
    pub size: u64,
}

impl FileNode {
    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn is_consistent(&self) -> bool {
        self.block_count() == block_count_for(self.size)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirNode {
    pub entries: BTreeMap<String, FsNode>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FsNode {
    Dir(DirNode),
    File(FileNode),
}

impl FsNode {
    pub fn kind(&self) -> EntryKind {
        match self {
            FsNode::Dir(_) => EntryKind::Dir,
            FsNode::File(_) => EntryKind::File,
        }
    }
}

impl DirNode {
    /// Walk a chain of directory components. Fails `NotFound` on a missing
    /// component and `NotADirectory` when a file sits in the chain. The
    /// empty chain is this directory itself.
    pub fn resolve_dir<'a>(&'a self, components: &[String]) -> SdfsResult<&'a DirNode> {
        let mut dir = self;
        for (i, name) in components.iter().enumerate() {
            dir = match dir.entries.get(name) {
                Some(FsNode::Dir(d)) => d,
                Some(FsNode::File(_)) => {
                    return Err(SdfsError::NotADirectory(components[..=i].join("/")));
                }
                None => return Err(SdfsError::NotFound(components[..=i].join("/"))),
            };
        }
        Ok(dir)
    }

    pub fn resolve_dir_mut<'a>(
        &'a mut self,
        components: &[String],
    ) -> SdfsResult<&'a mut DirNode> {
        let mut dir = self;
        for (i, name) in components.iter().enumerate() {
            dir = match dir.entries.get_mut(name) {
                Some(FsNode::Dir(d)) => d,
                Some(FsNode::File(_)) => {
                    return Err(SdfsError::NotADirectory(components[..=i].join("/")));
                }
                None => return Err(SdfsError::NotFound(components[..=i].join("/"))),
            };
        }
        Ok(dir)
    }

    pub fn resolve_file<'a>(&'a self, components: &[String]) -> SdfsResult<&'a FileNode> {
        let (last, parents) = components
            .split_last()
            .ok_or_else(|| SdfsError::NotFound("root is not a file".to_string()))?;
        let parent = self.resolve_dir(parents)?;
        match parent.entries.get(last) {
            Some(FsNode::File(f)) => Ok(f),
            Some(FsNode::Dir(_)) => Err(SdfsError::InvalidState(format!(
                "{} is a directory",
                components.join("/")
            ))),
            None => Err(SdfsError::NotFound(components.join("/"))),
        }
    }

    pub fn resolve_file_mut<'a>(
        &'a mut self,
        components: &[String],
    ) -> SdfsResult<&'a mut FileNode> {
        let (last, parents) = components
            .split_last()
            .ok_or_else(|| SdfsError::NotFound("root is not a file".to_string()))?;
        let parent = self.resolve_dir_mut(parents)?;
        match parent.entries.get_mut(last) {
            Some(FsNode::File(f)) => Ok(f),
            Some(FsNode::Dir(_)) => Err(SdfsError::InvalidState(format!(
                "{} is a directory",
                components.join("/")
            ))),
            None => Err(SdfsError::NotFound(components.join("/"))),
        }
    }

    /// Every block descriptor in the tree must carry at least one location;
    /// a snapshot violating this is rejected at load time, before
    /// `BlockDescriptor::primary` could ever see an empty list.
    pub fn validate(&self) -> SdfsResult<()> {
        for (name, node) in &self.entries {
            match node {
                FsNode::Dir(d) => d.validate()?,
                FsNode::File(f) => {
                    if f.blocks.iter().any(|d| d.locations.is_empty()) {
                        return Err(SdfsError::DecodeError(format!(
                            "file {} has a block with no locations",
                            name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn listing(&self) -> Vec<DirEntry> {
        self.entries
            .iter()
            .map(|(name, node)| DirEntry {
                name: name.clone(),
                kind: node.kind(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdfs_lib::path_components;

    fn sample_tree() -> DirNode {
        let mut root = DirNode::default();
        let mut d = DirNode::default();
        d.entries
            .insert("f".to_string(), FsNode::File(FileNode::default()));
        root.entries.insert("d".to_string(), FsNode::Dir(d));
        root
    }

    #[test]
    fn test_resolve_file() {
        let root = sample_tree();
        let path = path_components("/d/f").unwrap();
        assert!(root.resolve_file(&path).is_ok());
    }

    #[test]
    fn test_resolve_missing_component() {
        let root = sample_tree();
        let path = path_components("/x/f").unwrap();
        assert!(matches!(
            root.resolve_file(&path),
            Err(SdfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_in_chain_is_not_a_directory() {
        let root = sample_tree();
        let path = path_components("/d/f/g").unwrap();
        assert!(matches!(
            root.resolve_file(&path),
            Err(SdfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_resolve_dir_rejects_file() {
        let root = sample_tree();
        let path = path_components("/d/f").unwrap();
        assert!(matches!(
            root.resolve_dir(&path),
            Err(SdfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_location_list() {
        assert!(sample_tree().validate().is_ok());
        let mut root = sample_tree();
        root.entries.insert(
            "bad".to_string(),
            FsNode::File(FileNode {
                blocks: vec![BlockDescriptor { locations: vec![] }],
                size: 1,
            }),
        );
        assert!(matches!(
            root.validate(),
            Err(SdfsError::DecodeError(_))
        ));
    }

    #[test]
    fn test_root_listing() {
        let root = sample_tree();
        let listing = root.resolve_dir(&[]).unwrap().listing();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "d");
        assert_eq!(listing[0].kind, EntryKind::Dir);
    }
}
