//! Structural checks shared by every backend.

use poolwarm_core::page::find_duplicate;
use poolwarm_core::{Error, PageDescriptor, PageKey, Result, SnapshotMetadata};
use std::collections::HashSet;

/// The metadata must describe exactly the stored pages.
pub fn check_page_count(metadata: &SnapshotMetadata, stored: u64) -> Result<()> {
    if metadata.page_count != stored {
        return Err(Error::ImageCorrupt(format!(
            "metadata declares {} pages but image holds {}",
            metadata.page_count, stored
        )));
    }
    Ok(())
}

/// No `(space_id, page_number)` pair may appear twice.
pub fn check_unique(pages: &[PageDescriptor]) -> Result<()> {
    match find_duplicate(pages) {
        Some(dup) => Err(Error::ImageCorrupt(format!("duplicate page {}", dup))),
        None => Ok(()),
    }
}

/// Check an incoming chunk against the keys already accepted, then record
/// its keys. Nothing is recorded when the chunk is rejected.
pub fn admit_unique(seen: &mut HashSet<PageKey>, chunk: &[PageDescriptor]) -> Result<()> {
    let mut fresh = HashSet::with_capacity(chunk.len());
    let duplicate = chunk
        .iter()
        .find(|page| seen.contains(&page.key()) || !fresh.insert(page.key()));
    if let Some(dup) = duplicate {
        return Err(Error::ImageCorrupt(format!("duplicate page {}", dup)));
    }
    seen.extend(fresh);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_unique_rejects_repeat_across_chunks() {
        let mut seen = HashSet::new();
        let a = PageDescriptor::new("`t`.`a`", "PRIMARY", 1, 1);
        let b = PageDescriptor::new("`t`.`a`", "PRIMARY", 1, 2);
        admit_unique(&mut seen, &[a.clone()]).unwrap();

        let err = admit_unique(&mut seen, &[b.clone(), a]).unwrap_err();
        assert!(matches!(err, Error::ImageCorrupt(_)));
        // The rejected chunk left nothing behind.
        assert_eq!(seen.len(), 1);
        admit_unique(&mut seen, &[b]).unwrap();
    }

    #[test]
    fn test_admit_unique_rejects_repeat_within_chunk() {
        let mut seen = HashSet::new();
        let a = PageDescriptor::new("`t`.`a`", "PRIMARY", 1, 1);
        let a_again = PageDescriptor::new("`t`.`a`", "idx", 1, 1);
        assert!(admit_unique(&mut seen, &[a, a_again]).is_err());
        assert!(seen.is_empty());
    }
}
