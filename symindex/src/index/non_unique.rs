use super::{check_segment, index_metadata, Index, IndexCore, IndexKind, IndexOptions};
use crate::error::Result;
use crate::link::LinkStore;

/// Any number of records per value. Each value gets a bucket directory
/// holding one link per primary key.
#[derive(Debug)]
pub struct NonUniqueIndex<S> {
    core: IndexCore<S>,
}

impl<S: LinkStore> NonUniqueIndex<S> {
    pub fn new(links: S, options: IndexOptions) -> Self {
        NonUniqueIndex {
            core: IndexCore::new(links, options, IndexKind::NonUnique),
        }
    }

    fn keys_in(&self, bucket: &str) -> Result<Vec<String>> {
        self.core.links().read_dir(&self.core.entry_path(bucket))
    }

    /// Remove a bucket that holds no keys.
    fn drop_if_empty(&self, bucket: &str) -> Result<()> {
        match self.keys_in(bucket) {
            Ok(keys) if keys.is_empty() => self.core.links().remove(&self.core.entry_path(bucket)),
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl<S: LinkStore> Index for NonUniqueIndex<S> {
    fn init(&self) -> Result<()> {
        self.core.init()
    }

    fn add(&self, id: &str, value: &str) -> Result<String> {
        if value.is_empty() {
            return Ok(String::new());
        }
        let value = self.core.normalize(value);
        check_segment(&value)?;
        check_segment(id)?;

        let bucket = self.core.entry_path(&value);
        self.core.links().make_dir_all(&bucket)?;
        let entry = format!("{value}/{id}");
        match self.core.create_entry(id, &entry, &value) {
            Ok(locator) => Ok(locator),
            Err(e) => {
                if let Err(cleanup) = self.drop_if_empty(&value) {
                    log::warn!("could not drop empty bucket {bucket}: {cleanup}");
                }
                Err(e)
            }
        }
    }

    fn lookup(&self, value: &str) -> Result<Vec<String>> {
        let value = self.core.normalize(value);
        if check_segment(&value).is_err() {
            return Err(self.core.not_found(&value));
        }
        match self.keys_in(&value) {
            Ok(keys) if !keys.is_empty() => Ok(keys),
            Ok(_) => Err(self.core.not_found(&value)),
            Err(e) if e.is_not_found() => Err(self.core.not_found(&value)),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, id: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let value = self.core.normalize(value);
        if check_segment(&value).is_err() || check_segment(id).is_err() {
            return Err(self.core.not_found(&value));
        }

        let links = self.core.links();
        match links.remove(&self.core.entry_path(&format!("{value}/{id}"))) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Err(self.core.not_found(&value)),
            Err(e) => return Err(e),
        }

        // Drop the bucket once its last key is gone
        self.drop_if_empty(&value)
    }

    fn search(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for bucket in self.core.matching_names(pattern)? {
            keys.extend(self.keys_in(&bucket)?);
        }
        if keys.is_empty() {
            return Err(self.core.not_found(pattern));
        }
        Ok(keys)
    }

    fn delete(&self) -> Result<()> {
        self.core.delete()
    }

    index_metadata!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;
    use crate::index::testing::options;
    use crate::link::remote::memory::MemoryProvider;
    use crate::link::{DiskLinks, RemoteLinks};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn exercise(idx: &dyn Index) {
        idx.add("abcdefg-123", "Green").unwrap();
        idx.add("xyz-789", "Green").unwrap();
        let locator = idx.add("hijklmn-456", "Red").unwrap();
        assert!(locator.ends_with("non_unique.tests.User.Color/Red/hijklmn-456"));

        assert_eq!(idx.lookup("Green").unwrap(), vec!["abcdefg-123", "xyz-789"]);
        assert!(matches!(
            idx.add("xyz-789", "Green"),
            Err(IndexerError::AlreadyExists { .. })
        ));

        let mut hits = idx.search("*e*").unwrap();
        hits.sort();
        assert_eq!(hits, vec!["abcdefg-123", "hijklmn-456", "xyz-789"]);

        idx.update("xyz-789", "Green", "Red").unwrap();
        assert_eq!(idx.lookup("Green").unwrap(), vec!["abcdefg-123"]);
        assert_eq!(idx.lookup("Red").unwrap(), vec!["hijklmn-456", "xyz-789"]);

        idx.remove("abcdefg-123", "Green").unwrap();
        assert!(idx.lookup("Green").unwrap_err().is_not_found());
        assert!(idx.remove("abcdefg-123", "Green").unwrap_err().is_not_found());
    }

    #[test]
    fn test_non_unique_on_disk() {
        let tmp = TempDir::new().unwrap();
        let idx = NonUniqueIndex::new(DiskLinks::new(tmp.path()), options("Color"));
        idx.init().unwrap();
        exercise(&idx);
    }

    #[test]
    fn test_non_unique_on_remote() {
        let provider = MemoryProvider::new();
        let idx = NonUniqueIndex::new(RemoteLinks::new(provider.clone()), options("Color"));
        idx.init().unwrap();
        exercise(&idx);
        assert!(!provider.exists("index.cs3/non_unique.tests.User.Color/Green"));
    }

    #[test]
    fn test_empty_bucket_is_removed() {
        let tmp = TempDir::new().unwrap();
        let idx = NonUniqueIndex::new(DiskLinks::new(tmp.path()), options("Color"));
        idx.init().unwrap();
        idx.add("abcdefg-123", "Blue").unwrap();

        let bucket = tmp.path().join("index.disk/non_unique.tests.User.Color/Blue");
        assert!(bucket.is_dir());
        idx.remove("abcdefg-123", "Blue").unwrap();
        assert!(!bucket.exists());
    }

    #[test]
    fn test_failed_add_leaves_no_empty_bucket() {
        let provider = MemoryProvider::new();
        let idx = NonUniqueIndex::new(RemoteLinks::new(provider.clone()), options("Color"));
        idx.init().unwrap();
        idx.add("abcdefg-123", "Green").unwrap();

        provider.fail_uploads(true);
        assert!(matches!(
            idx.add("xyz-789", "Blue"),
            Err(IndexerError::Remote { .. })
        ));
        assert!(matches!(
            idx.add("xyz-789", "Green"),
            Err(IndexerError::Remote { .. })
        ));
        provider.fail_uploads(false);

        assert!(!provider.exists("index.cs3/non_unique.tests.User.Color/Blue"));
        assert_eq!(idx.lookup("Green").unwrap(), vec!["abcdefg-123"]);
        assert_eq!(idx.search("*").unwrap(), vec!["abcdefg-123"]);
    }

    #[test]
    fn test_case_insensitive_buckets() {
        let tmp = TempDir::new().unwrap();
        let idx = NonUniqueIndex::new(
            DiskLinks::new(tmp.path()),
            options("Color").with_case_insensitive(true),
        );
        idx.init().unwrap();
        idx.add("abcdefg-123", "GREEN").unwrap();
        idx.add("xyz-789", "green").unwrap();
        assert_eq!(idx.lookup("Green").unwrap(), vec!["abcdefg-123", "xyz-789"]);
    }
}
