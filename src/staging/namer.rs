//! Ordinal assignment for new staged groups.

use super::error::StagingError;
use super::group::StagedGroup;
use super::StagingArea;

/// Hands out strictly increasing ordinals for new staged groups.
///
/// Seeded from the groups already on disk: leftovers of an interrupted run
/// are never collided with, and every new group sorts after them.
#[derive(Debug)]
pub struct StagingNamer {
    next: u64,
}

impl StagingNamer {
    /// Continue after the highest ordinal among `existing` (or start at 1).
    pub fn from_groups<'a>(existing: impl IntoIterator<Item = &'a StagedGroup>) -> Self {
        let next = existing
            .into_iter()
            .map(StagedGroup::ordinal)
            .max()
            .map_or(1, |max| max + 1);
        Self { next }
    }

    /// Scan the staging area and seed from what is there.
    pub async fn scan(area: &StagingArea) -> Result<Self, StagingError> {
        let entries = area.groups().await?;
        let namer = Self::from_groups(entries.iter().map(|e| &e.group));
        tracing::debug!(next = namer.next, "Staging namer initialized");
        Ok(namer)
    }

    /// Return a fresh ordinal; every call yields a larger value.
    pub fn next_ordinal(&mut self) -> u64 {
        let ordinal = self.next;
        self.next += 1;
        ordinal
    }

    /// The value the next call to [`next_ordinal`](Self::next_ordinal) returns.
    #[cfg(test)]
    pub fn peek(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::GroupKind;

    fn group(ordinal: u64) -> StagedGroup {
        StagedGroup::new(ordinal, GroupKind::Post, "alice").unwrap()
    }

    #[test]
    fn test_empty_area_starts_at_one() {
        let mut namer = StagingNamer::from_groups(std::iter::empty());
        assert_eq!(namer.next_ordinal(), 1);
        assert_eq!(namer.next_ordinal(), 2);
    }

    #[test]
    fn test_continues_after_max_leftover() {
        let leftovers = [group(3), group(9), group(4)];
        let mut namer = StagingNamer::from_groups(&leftovers);
        assert_eq!(namer.peek(), 10);
        assert_eq!(namer.next_ordinal(), 10);
        assert_eq!(namer.next_ordinal(), 11);
    }

    #[test]
    fn test_strictly_increasing() {
        let mut namer = StagingNamer::from_groups(&[group(1)]);
        let ordinals: Vec<u64> = (0..50).map(|_| namer.next_ordinal()).collect();
        assert!(ordinals.windows(2).all(|w| w[0] < w[1]));
        assert!(ordinals[0] > 1);
    }

    #[tokio::test]
    async fn test_scan_reads_staging_area() {
        let dir = crate::staging::tests::test_dir("namer_scan");
        let area = StagingArea::new(&dir);
        area.create_group(&group(7)).await.unwrap();
        area.create_group(&StagedGroup::new(2, GroupKind::Story, "bob").unwrap())
            .await
            .unwrap();
        std::fs::create_dir_all(dir.join("not-a-group")).unwrap();

        let mut namer = StagingNamer::scan(&area).await.unwrap();
        assert_eq!(namer.next_ordinal(), 8);
    }
}
