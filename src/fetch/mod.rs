//! Fetch planner: stage everything published after the checkpoint.
//!
//! Each profile's timeline is listed newest first and scanned until the
//! first post at or before the checkpoint. Qualifying posts are staged
//! oldest first, one group per post, so ordinals follow publication order.
//! Stories are listed afterwards for every profile whose id was resolved,
//! one group per profile's story batch.
//!
//! A source failure is contained to the profile it happened on. A staging
//! failure aborts the whole phase.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::format_timestamp;
use crate::retry::{retry_remote, RetryConfig};
use crate::routing::{RoutingTable, SourceProfile};
use crate::source::{FetchError, Post, ProfileId, RemoteMedia, RemoteProfile, SourceClient, Story};
use crate::staging::files::{description_file_name, media_file_name};
use crate::staging::{GroupKind, StagedGroup, StagingArea, StagingError, StagingNamer};

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchConfig {
    pub retry: RetryConfig,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    /// Groups created this run, in ordinal order.
    pub staged: Vec<StagedGroup>,
    /// Profiles whose posts or stories could not be fetched.
    pub failed_profiles: Vec<String>,
    /// Groups that would have been staged (dry run only).
    pub planned: usize,
    pub interrupted: bool,
}

impl FetchReport {
    /// The phase attempted every profile. Only then may the checkpoint move.
    pub fn is_complete(&self) -> bool {
        !self.interrupted
    }

    fn mark_failed(&mut self, username: &str) {
        if !self.failed_profiles.iter().any(|u| u == username) {
            self.failed_profiles.push(username.to_string());
        }
    }
}

/// Failure while staging one profile.
#[derive(Debug)]
enum ProfileError {
    Fetch(FetchError),
    Staging(StagingError),
}

impl From<FetchError> for ProfileError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<StagingError> for ProfileError {
    fn from(e: StagingError) -> Self {
        Self::Staging(e)
    }
}

pub struct FetchPlanner<'a> {
    source: &'a dyn SourceClient,
    routing: &'a RoutingTable,
    staging: &'a StagingArea,
    config: FetchConfig,
    shutdown: CancellationToken,
}

impl<'a> FetchPlanner<'a> {
    pub fn new(
        source: &'a dyn SourceClient,
        routing: &'a RoutingTable,
        staging: &'a StagingArea,
        config: FetchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            routing,
            staging,
            config,
            shutdown,
        }
    }

    /// Stage every post and story item newer than `checkpoint`.
    pub async fn run(&self, checkpoint: DateTime<Utc>) -> Result<FetchReport, StagingError> {
        let mut namer = StagingNamer::scan(self.staging).await?;
        let mut report = FetchReport::default();
        let mut story_ids: Vec<ProfileId> = Vec::new();

        tracing::info!(
            profiles = self.routing.profiles().len(),
            "Fetching items newer than {}",
            format_timestamp(&checkpoint)
        );

        for profile in self.routing.profiles() {
            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, stopping fetch");
                report.interrupted = true;
                return Ok(report);
            }
            match self
                .stage_profile_posts(profile, checkpoint, &mut namer, &mut report)
                .await
            {
                Ok(Some(remote)) => story_ids.push(remote.id),
                Ok(None) => {}
                Err(ProfileError::Fetch(e)) => {
                    tracing::warn!(owner = %profile.username, "Skipping profile: {}", e);
                    report.mark_failed(&profile.username);
                }
                Err(ProfileError::Staging(e)) => return Err(e),
            }
        }

        if report.interrupted || story_ids.is_empty() {
            return Ok(report);
        }
        if self.shutdown.is_cancelled() {
            report.interrupted = true;
            return Ok(report);
        }
        self.stage_stories(&story_ids, checkpoint, &mut namer, &mut report)
            .await?;
        Ok(report)
    }

    /// Stage the profile's new posts. Returns the resolved profile when its
    /// stories should be listed too.
    async fn stage_profile_posts(
        &self,
        profile: &SourceProfile,
        checkpoint: DateTime<Utc>,
        namer: &mut StagingNamer,
        report: &mut FetchReport,
    ) -> Result<Option<RemoteProfile>, ProfileError> {
        let routes = &profile.routes;
        if !routes.accepts(GroupKind::Post) && !routes.accepts(GroupKind::Story) {
            tracing::debug!(owner = %profile.username, "No destinations configured, skipping");
            return Ok(None);
        }

        let remote = retry_remote(
            &self.config.retry,
            &format!("Looking up {}", profile.username),
            || self.source.profile(&profile.username),
        )
        .await?;

        if routes.accepts(GroupKind::Post) {
            let mut posts = self.new_posts(&remote, checkpoint).await?;
            // Pinned posts lead the feed whatever their age.
            posts.sort_by_key(|p| p.taken_at);
            tracing::info!(
                owner = %profile.username,
                "{} new post(s)",
                posts.len()
            );
            for post in &posts {
                if self.shutdown.is_cancelled() {
                    report.interrupted = true;
                    break;
                }
                self.stage_post(profile, post, namer, report).await?;
            }
        }

        Ok(routes.accepts(GroupKind::Story).then_some(remote))
    }

    /// Posts newer than the checkpoint, newest first.
    ///
    /// Listing stops at the first post at or before the checkpoint. Pinned
    /// posts are listed ahead of the timeline whatever their age, so an old
    /// pinned post is skipped without stopping.
    async fn new_posts(
        &self,
        profile: &RemoteProfile,
        checkpoint: DateTime<Utc>,
    ) -> Result<Vec<Post>, FetchError> {
        let mut fresh = Vec::new();
        let mut cursor: Option<String> = None;
        let label = format!("Listing posts of {}", profile.username);
        loop {
            let page = retry_remote(&self.config.retry, &label, || {
                self.source.posts_page(profile, cursor.as_deref())
            })
            .await?;
            for post in page.posts {
                if post.taken_at > checkpoint {
                    fresh.push(post);
                } else if !post.pinned {
                    return Ok(fresh);
                }
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(fresh),
            }
        }
    }

    async fn stage_post(
        &self,
        profile: &SourceProfile,
        post: &Post,
        namer: &mut StagingNamer,
        report: &mut FetchReport,
    ) -> Result<(), ProfileError> {
        let numbered = post.media.len() > 1;
        let wanted: Vec<(String, &RemoteMedia)> = post
            .media
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                profile
                    .routes
                    .destination(GroupKind::Post, m.media_type)
                    .is_some()
            })
            .map(|(i, m)| {
                let index = numbered.then_some(i + 1);
                (media_file_name(&post.taken_at, index, m.media_type), m)
            })
            .collect();

        if wanted.is_empty() {
            tracing::debug!(
                owner = %profile.username,
                post = %post.id,
                "Nothing routable in post, skipping"
            );
            return Ok(());
        }

        if self.config.dry_run {
            tracing::info!(
                "[DRY RUN] Would stage post {} of {} ({} file(s))",
                post.id,
                profile.username,
                wanted.len()
            );
            report.planned += 1;
            return Ok(());
        }

        let group = StagedGroup::new(namer.next_ordinal(), GroupKind::Post, &profile.username)?;
        let dir = self.staging.create_group(&group).await?;

        if let Some(caption) = &post.caption {
            let path = dir.join(description_file_name(&post.taken_at));
            tokio::fs::write(&path, caption)
                .await
                .map_err(|e| StagingError::io(&path, e))?;
        }
        self.fill_group(&group, &dir, &wanted).await?;
        report.staged.push(group.clone());
        tracing::info!(group = %group, files = wanted.len(), "Staged post {}", post.id);
        Ok(())
    }

    async fn stage_stories(
        &self,
        story_ids: &[ProfileId],
        checkpoint: DateTime<Utc>,
        namer: &mut StagingNamer,
        report: &mut FetchReport,
    ) -> Result<(), StagingError> {
        let stories = match retry_remote(&self.config.retry, "Listing stories", || {
            self.source.story_items(story_ids)
        })
        .await
        {
            Ok(stories) => stories,
            Err(e) => {
                tracing::warn!("Skipping stories: {}", e);
                for profile in self.routing.profiles() {
                    if profile.routes.accepts(GroupKind::Story) {
                        report.mark_failed(&profile.username);
                    }
                }
                return Ok(());
            }
        };

        for story in &stories {
            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, stopping fetch");
                report.interrupted = true;
                return Ok(());
            }
            let Some(profile) = self.routing.get(&story.owner) else {
                tracing::warn!(owner = %story.owner, "Story from unconfigured profile, skipping");
                continue;
            };
            match self.stage_story(profile, story, checkpoint, namer, report).await {
                Ok(()) => {}
                Err(ProfileError::Fetch(e)) => {
                    tracing::warn!(owner = %profile.username, "Skipping stories: {}", e);
                    report.mark_failed(&profile.username);
                }
                Err(ProfileError::Staging(e)) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stage one profile's new story items as a single group.
    ///
    /// Items are scanned newest first with the same early exit as posts.
    /// Items without a destination (story videos, typically) are never
    /// downloaded.
    async fn stage_story(
        &self,
        profile: &SourceProfile,
        story: &Story,
        checkpoint: DateTime<Utc>,
        namer: &mut StagingNamer,
        report: &mut FetchReport,
    ) -> Result<(), ProfileError> {
        let mut items: Vec<_> = story.items.iter().collect();
        items.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));

        let mut names = HashSet::new();
        let mut wanted: Vec<(String, &RemoteMedia)> = Vec::new();
        for item in items.into_iter().take_while(|i| i.taken_at > checkpoint) {
            let media_type = item.media.media_type;
            if profile
                .routes
                .destination(GroupKind::Story, media_type)
                .is_none()
            {
                tracing::debug!(owner = %profile.username, item = %item.id, "No destination for story {}, skipping", media_type);
                continue;
            }
            let mut name = media_file_name(&item.taken_at, None, media_type);
            let mut n = 1;
            while names.contains(&name) {
                n += 1;
                name = media_file_name(&item.taken_at, Some(n), media_type);
            }
            names.insert(name.clone());
            wanted.push((name, &item.media));
        }

        if wanted.is_empty() {
            return Ok(());
        }
        wanted.reverse();

        if self.config.dry_run {
            tracing::info!(
                "[DRY RUN] Would stage {} story item(s) of {}",
                wanted.len(),
                profile.username
            );
            report.planned += 1;
            return Ok(());
        }

        let group = StagedGroup::new(namer.next_ordinal(), GroupKind::Story, &profile.username)?;
        let dir = self.staging.create_group(&group).await?;
        self.fill_group(&group, &dir, &wanted).await?;
        report.staged.push(group.clone());
        tracing::info!(group = %group, files = wanted.len(), "Staged stories");
        Ok(())
    }

    /// Download every wanted file into a freshly created group.
    ///
    /// A group is staged whole or not at all: when the source fails midway
    /// the directory is removed again, so the classifier never sees a
    /// partial post. Its ordinal is not reused.
    async fn fill_group(
        &self,
        group: &StagedGroup,
        dir: &Path,
        wanted: &[(String, &RemoteMedia)],
    ) -> Result<(), ProfileError> {
        for (name, media) in wanted {
            match self.download(media, &dir.join(name)).await {
                Ok(()) => {}
                Err(ProfileError::Fetch(e)) => {
                    tokio::fs::remove_dir_all(dir)
                        .await
                        .map_err(|io| StagingError::io(dir, io))?;
                    tracing::debug!(group = %group, "Discarded partially staged group");
                    return Err(ProfileError::Fetch(e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Download into a staged group. Disk failures are staging failures.
    async fn download(&self, media: &RemoteMedia, dest: &Path) -> Result<(), ProfileError> {
        let label = format!("Downloading {}", dest.display());
        match retry_remote(&self.config.retry, &label, || {
            self.source.download(media, dest)
        })
        .await
        {
            Ok(()) => Ok(()),
            Err(FetchError::Disk(e)) => Err(StagingError::io(dest, e).into()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ProfileRoutes;
    use crate::staging::files::MediaType;
    use crate::staging::list_files;
    use crate::staging::tests::test_dir;
    use crate::testing::*;

    fn config() -> FetchConfig {
        FetchConfig {
            retry: RetryConfig::none(),
            dry_run: false,
        }
    }

    fn images_only() -> ProfileRoutes {
        ProfileRoutes {
            post_images: Some(album(1, 10)),
            story_images: Some(album(1, 12)),
            ..Default::default()
        }
    }

    async fn run(
        source: &MockSource,
        routing: &RoutingTable,
        area: &StagingArea,
        checkpoint: DateTime<Utc>,
    ) -> FetchReport {
        FetchPlanner::new(source, routing, area, config(), CancellationToken::new())
            .run(checkpoint)
            .await
            .unwrap()
    }

    async fn file_names(area: &StagingArea, ordinal: u64) -> Vec<String> {
        let entry = area
            .groups()
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.group.ordinal() == ordinal)
            .unwrap();
        list_files(&entry.path)
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_only_items_after_checkpoint_are_staged() {
        let area = StagingArea::new(test_dir("fetch_checkpoint"));
        let routing = routing(vec![("bob", all_routes())]);
        let source = MockSource::new().with_posts(
            "bob",
            vec![
                post("new", ts(2024, 1, 2), vec![image("https://cdn/new.jpg")]),
                post("edge", ts(2024, 1, 1), vec![image("https://cdn/edge.jpg")]),
                post("old", ts(2023, 12, 31), vec![image("https://cdn/old.jpg")]),
            ],
        );

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;

        assert_eq!(report.staged.len(), 1);
        assert_eq!(report.staged[0].ordinal(), 1);
        assert_eq!(report.staged[0].kind(), GroupKind::Post);
        assert_eq!(source.downloads(), vec!["https://cdn/new.jpg"]);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_listing_stops_at_first_old_post() {
        let area = StagingArea::new(test_dir("fetch_early_exit"));
        let routing = routing(vec![("bob", all_routes())]);
        let posts: Vec<Post> = (0..10)
            .map(|i| post(&format!("p{i}"), ts(2024, 1, 20 - i), vec![image("https://cdn/x.jpg")]))
            .collect();
        let source = MockSource::new().with_posts("bob", posts);

        // Pages of two: 20th..19th, 18th..17th, 16th (stop)
        let report = run(&source, &routing, &area, ts(2024, 1, 16)).await;
        assert_eq!(report.staged.len(), 4);
        assert_eq!(source.pages_requested(), 3);
    }

    #[tokio::test]
    async fn test_pinned_old_post_does_not_stop_listing() {
        let area = StagingArea::new(test_dir("fetch_pinned"));
        let routing = routing(vec![("bob", all_routes())]);
        let mut pinned = post("pinned", ts(2020, 5, 5), vec![image("https://cdn/pinned.jpg")]);
        pinned.pinned = true;
        let source = MockSource::new().with_posts(
            "bob",
            vec![
                pinned,
                post("new", ts(2024, 1, 2), vec![image("https://cdn/new.jpg")]),
                post("old", ts(2023, 1, 2), vec![image("https://cdn/old.jpg")]),
            ],
        );

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;
        assert_eq!(report.staged.len(), 1);
        assert_eq!(source.downloads(), vec!["https://cdn/new.jpg"]);
    }

    #[tokio::test]
    async fn test_posts_staged_oldest_first_after_leftovers() {
        let area = StagingArea::new(test_dir("fetch_ordinals"));
        let leftover = StagedGroup::new(7, GroupKind::Post, "alice").unwrap();
        let path = area.create_group(&leftover).await.unwrap();
        std::fs::write(path.join("2023-12-01_00-00-00_UTC.jpg"), b"left").unwrap();

        let routing = routing(vec![("bob", all_routes())]);
        let source = MockSource::new().with_posts(
            "bob",
            vec![
                post("second", ts(2024, 1, 3), vec![image("https://cdn/2.jpg")]),
                post("first", ts(2024, 1, 2), vec![image("https://cdn/1.jpg")]),
            ],
        );

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;
        let ordinals: Vec<u64> = report.staged.iter().map(|g| g.ordinal()).collect();
        assert_eq!(ordinals, vec![8, 9]);
        assert_eq!(file_names(&area, 8).await, vec!["2024-01-02_00-00-00_UTC.jpg"]);
        assert_eq!(file_names(&area, 9).await, vec!["2024-01-03_00-00-00_UTC.jpg"]);
    }

    #[tokio::test]
    async fn test_unrouted_media_is_not_downloaded() {
        let area = StagingArea::new(test_dir("fetch_unrouted"));
        let routing = routing(vec![("alice", images_only())]);
        let mut p = post(
            "mixed",
            ts(2024, 1, 2),
            vec![image("https://cdn/a.jpg"), video("https://cdn/b.mp4")],
        );
        p.caption = Some("hello @friend".to_string());
        let source = MockSource::new()
            .with_posts(
                "alice",
                vec![p, post("clip", ts(2024, 1, 2), vec![video("https://cdn/c.mp4")])],
            )
            .with_story(
                "alice",
                vec![
                    story_item("s1", ts(2024, 1, 3), video("https://cdn/s1.mp4")),
                    story_item("s2", ts(2024, 1, 4), image("https://cdn/s2.jpg")),
                ],
            );

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;

        // The video-only post creates no group at all.
        assert_eq!(report.staged.len(), 2);
        assert_eq!(
            source.downloads(),
            vec!["https://cdn/a.jpg", "https://cdn/s2.jpg"]
        );
        assert_eq!(
            file_names(&area, 1).await,
            vec!["2024-01-02_00-00-00_UTC.txt", "2024-01-02_00-00-00_UTC_1.jpg"]
        );
        assert_eq!(report.staged[1].kind(), GroupKind::Story);
    }

    #[tokio::test]
    async fn test_story_items_respect_checkpoint() {
        let area = StagingArea::new(test_dir("fetch_stories"));
        let routing = routing(vec![("bob", all_routes())]);
        let source = MockSource::new().with_story(
            "bob",
            vec![
                story_item("old", ts(2023, 12, 31), image("https://cdn/old.jpg")),
                story_item("a", ts(2024, 1, 2), video("https://cdn/a.mp4")),
                story_item("b", ts(2024, 1, 2), image("https://cdn/b.jpg")),
            ],
        );

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;
        assert_eq!(report.staged.len(), 1);
        let names = file_names(&area, 1).await;
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.starts_with("2024-01-02")));
        assert!(!source.downloads().contains(&"https://cdn/old.jpg".to_string()));
        let types: HashSet<Option<MediaType>> = names
            .iter()
            .map(|n| MediaType::from_path(Path::new(n)))
            .collect();
        assert_eq!(types.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_profile_does_not_stop_others() {
        let area = StagingArea::new(test_dir("fetch_isolation"));
        let routing = routing(vec![("alice", all_routes()), ("bob", all_routes())]);
        let source = MockSource::new()
            .failing("alice")
            .with_posts("bob", vec![post("p", ts(2024, 1, 2), vec![image("https://cdn/p.jpg")])]);

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;
        assert_eq!(report.failed_profiles, vec!["alice".to_string()]);
        assert_eq!(report.staged.len(), 1);
        assert_eq!(report.staged[0].owner(), "bob");
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_dry_run_stages_nothing() {
        let dir = test_dir("fetch_dry_run");
        let area = StagingArea::new(&dir);
        let routing = routing(vec![("bob", all_routes())]);
        let source = MockSource::new()
            .with_posts("bob", vec![post("p", ts(2024, 1, 2), vec![image("https://cdn/p.jpg")])])
            .with_story("bob", vec![story_item("s", ts(2024, 1, 2), image("https://cdn/s.jpg"))]);
        let config = FetchConfig {
            dry_run: true,
            ..config()
        };

        let report = FetchPlanner::new(&source, &routing, &area, config, CancellationToken::new())
            .run(ts(2024, 1, 1))
            .await
            .unwrap();
        assert_eq!(report.planned, 2);
        assert!(report.staged.is_empty());
        assert!(source.downloads().is_empty());
        assert!(area.groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_incomplete() {
        let area = StagingArea::new(test_dir("fetch_cancelled"));
        let routing = routing(vec![("bob", all_routes())]);
        let source = MockSource::new()
            .with_posts("bob", vec![post("p", ts(2024, 1, 2), vec![image("https://cdn/p.jpg")])]);
        let token = CancellationToken::new();
        token.cancel();

        let report = FetchPlanner::new(&source, &routing, &area, config(), token)
            .run(ts(2024, 1, 1))
            .await
            .unwrap();
        assert!(!report.is_complete());
        assert!(report.staged.is_empty());
    }

    #[tokio::test]
    async fn test_profile_without_destinations_is_not_contacted() {
        let area = StagingArea::new(test_dir("fetch_no_routes"));
        let routing = routing(vec![("carol", ProfileRoutes::default())]);
        let source = MockSource::new().failing("carol");

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;
        assert!(report.failed_profiles.is_empty());
        assert_eq!(source.pages_requested(), 0);
    }

    #[tokio::test]
    async fn test_failed_download_discards_whole_post() {
        let area = StagingArea::new(test_dir("fetch_partial_post"));
        let routing = routing(vec![("bob", all_routes())]);
        let mut carousel = post(
            "carousel",
            ts(2024, 1, 2),
            vec![
                image("https://cdn/1.jpg"),
                image("https://cdn/2.jpg"),
                image("https://cdn/3.jpg"),
            ],
        );
        carousel.caption = Some("three pictures".to_string());
        let source = MockSource::new()
            .with_posts("bob", vec![carousel])
            .failing_download("https://cdn/2.jpg");

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;

        assert!(report.staged.is_empty());
        assert_eq!(report.failed_profiles, vec!["bob".to_string()]);
        assert_eq!(source.downloads(), vec!["https://cdn/1.jpg"]);
        assert!(area.groups().await.unwrap().is_empty());
        let classification = crate::classify::classify(&area, &routing).await.unwrap();
        assert!(classification.queues.is_empty());
        assert!(classification.errors.is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_discards_story_batch() {
        let area = StagingArea::new(test_dir("fetch_partial_story"));
        let routing = routing(vec![("bob", all_routes())]);
        let source = MockSource::new()
            .with_story(
                "bob",
                vec![
                    story_item("a", ts(2024, 1, 2), image("https://cdn/a.jpg")),
                    story_item("b", ts(2024, 1, 3), image("https://cdn/b.jpg")),
                ],
            )
            .failing_download("https://cdn/b.jpg");

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;

        assert!(report.staged.is_empty());
        assert_eq!(report.failed_profiles, vec!["bob".to_string()]);
        assert_eq!(source.downloads(), vec!["https://cdn/a.jpg"]);
        assert!(area.groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_newer_pinned_post_staged_in_publication_order() {
        let area = StagingArea::new(test_dir("fetch_pinned_order"));
        let routing = routing(vec![("bob", all_routes())]);
        let mut pinned = post("pinned", ts(2024, 1, 5), vec![image("https://cdn/5.jpg")]);
        pinned.pinned = true;
        let source = MockSource::new().with_posts(
            "bob",
            vec![
                pinned,
                post("tenth", ts(2024, 1, 10), vec![image("https://cdn/10.jpg")]),
                post("eighth", ts(2024, 1, 8), vec![image("https://cdn/8.jpg")]),
            ],
        );

        let report = run(&source, &routing, &area, ts(2024, 1, 1)).await;

        let ordinals: Vec<u64> = report.staged.iter().map(|g| g.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(file_names(&area, 1).await, vec!["2024-01-05_00-00-00_UTC.jpg"]);
        assert_eq!(file_names(&area, 2).await, vec!["2024-01-08_00-00-00_UTC.jpg"]);
        assert_eq!(file_names(&area, 3).await, vec!["2024-01-10_00-00-00_UTC.jpg"]);
    }
}
