use chrono::DateTime;
use poise::serenity_prelude as serenity;
use thiserror::Error as ThisError;

use crate::helpers::image_archiver;
use crate::helpers::star_embed::{assemble_mirror_embeds, qualifies, qualifying_cap};
use crate::helpers::starboard::Database;
use crate::structs::starboard_message::{
    ReplyExcerpt, SnapshotAttachment, SourceMessageSnapshot, StarEvent, StarEventKind,
    STAR_EMOJI,
};
use crate::types::Error;

/// The mirror channel is found by this fixed name within the guild.
const STARBOARD_CHANNEL_NAME: &str = "starboard";

/// A mirror message carries at most 9 embeds copied from the source on top
/// of the rendered one.
const MAX_COPIED_EMBEDS: usize = 9;

#[derive(Debug, ThisError)]
pub(crate) enum TransportError {
    #[error("message not found")]
    NotFound,
    #[error("{0}")]
    Other(Error),
}

impl From<serenity::Error> for TransportError {
    fn from(err: serenity::Error) -> Self {
        if is_not_found(&err) {
            Self::NotFound
        } else {
            Self::Other(err.into())
        }
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

/// Everything the synchronizer needs from Discord, behind a seam so the
/// state machine can run against an in-memory double in tests.
pub(crate) trait StarboardTransport {
    /// `None` means the source message no longer exists.
    async fn fetch_source(&self, event: &StarEvent)
        -> Result<Option<SourceMessageSnapshot>, Error>;
    /// Best effort: remove the offending reaction and tell the author off.
    async fn retract_self_star(&self, event: &StarEvent, snapshot: &SourceMessageSnapshot);
    /// `None` means the guild has no starboard channel to post into.
    async fn post_mirror(&self, snapshot: &SourceMessageSnapshot) -> Result<Option<u64>, Error>;
    async fn edit_mirror(
        &self,
        mirror_message_id: u64,
        snapshot: &SourceMessageSnapshot,
    ) -> Result<(), TransportError>;
    async fn delete_mirror(&self, mirror_message_id: u64) -> Result<(), TransportError>;
    fn schedule_archive(&self, mirror_message_id: u64);
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SyncOutcome {
    Ignored,
    SelfStarRejected,
    Demoted,
    BelowThreshold,
    Posted(u64),
    Edited(u64),
    Reposted(u64),
    NoStarboardChannel,
    Unchanged,
}

pub(crate) async fn handle_reaction_add(
    ctx: &serenity::Context,
    reaction: &serenity::Reaction,
    data: &crate::Data,
) -> Result<(), Error> {
    handle_reaction(ctx, reaction, StarEventKind::Add, data).await
}

pub(crate) async fn handle_reaction_remove(
    ctx: &serenity::Context,
    reaction: &serenity::Reaction,
    data: &crate::Data,
) -> Result<(), Error> {
    handle_reaction(ctx, reaction, StarEventKind::Remove, data).await
}

async fn handle_reaction(
    ctx: &serenity::Context,
    reaction: &serenity::Reaction,
    kind: StarEventKind,
    data: &crate::Data,
) -> Result<(), Error> {
    let Some(event) = StarEvent::from_reaction(reaction, kind) else {
        return Ok(());
    };

    // All starboard transitions are serialized behind this one lock so two
    // events can never race the tally-read-then-act sequence.
    let _guard = data.starboard_lock.lock().await;

    let transport = DiscordTransport {
        ctx,
        guild_id: event.guild_id,
    };
    let outcome = process_star_event(&transport, &data.starboard, &event).await?;
    log::debug!(
        "starboard: message {} -> {:?}",
        event.message_id,
        outcome
    );
    Ok(())
}

/// The synchronizer state machine. Runs once per star event, under the
/// global starboard lock.
pub(crate) async fn process_star_event<T: StarboardTransport>(
    transport: &T,
    store: &Database,
    event: &StarEvent,
) -> Result<SyncOutcome, Error> {
    let Some(snapshot) = transport.fetch_source(event).await? else {
        // Source message is gone; drop whatever we still mirror for it.
        return match store.get(event.message_id).await? {
            Some(record) => {
                if let Some(raw) = &record.mirror_message_id {
                    let mirror_id: u64 = raw.parse()?;
                    if let Err(TransportError::Other(e)) =
                        transport.delete_mirror(mirror_id).await
                    {
                        log::warn!("failed to delete orphaned mirror {mirror_id}: {e}");
                    }
                }
                store.delete(event.message_id).await?;
                Ok(SyncOutcome::Demoted)
            }
            None => Ok(SyncOutcome::Ignored),
        };
    };

    if event.kind == StarEventKind::Add && event.actor_id == snapshot.author_id {
        transport.retract_self_star(event, &snapshot).await;
        return Ok(SyncOutcome::SelfStarRejected);
    }

    let tally = snapshot.star_tally;

    // Losing the last star always demotes, no matter what the cap was when
    // the mirror was created.
    if tally == 0 {
        return match store.get(event.message_id).await? {
            Some(record) => {
                if let Some(raw) = &record.mirror_message_id {
                    let mirror_id: u64 = raw.parse()?;
                    if let Err(TransportError::Other(e)) =
                        transport.delete_mirror(mirror_id).await
                    {
                        log::warn!("failed to delete mirror {mirror_id} on demotion: {e}");
                    }
                }
                store.delete(event.message_id).await?;
                Ok(SyncOutcome::Demoted)
            }
            None => Ok(SyncOutcome::Ignored),
        };
    }

    let (record, created) = store
        .get_or_create(event.message_id, event.channel_id)
        .await?;

    if created {
        let cap = qualifying_cap(snapshot.population);
        if !qualifies(tally, cap) {
            // Not eligible yet; the record only exists to make this check
            // atomic, so take it back out.
            store.delete(event.message_id).await?;
            return Ok(SyncOutcome::BelowThreshold);
        }
        return match transport.post_mirror(&snapshot).await? {
            Some(mirror_id) => {
                store.set_mirror_message(event.message_id, mirror_id).await?;
                transport.schedule_archive(mirror_id);
                Ok(SyncOutcome::Posted(mirror_id))
            }
            None => {
                log::warn!(
                    "guild {} has no #{STARBOARD_CHANNEL_NAME} channel",
                    event.guild_id
                );
                Ok(SyncOutcome::NoStarboardChannel)
            }
        };
    }

    match &record.mirror_message_id {
        Some(raw) => {
            let mirror_id: u64 = raw.parse()?;
            match transport.edit_mirror(mirror_id, &snapshot).await {
                Ok(()) => {
                    transport.schedule_archive(mirror_id);
                    Ok(SyncOutcome::Edited(mirror_id))
                }
                Err(TransportError::NotFound) => {
                    // Mirror was deleted out-of-band; recreate it.
                    match transport.post_mirror(&snapshot).await? {
                        Some(new_id) => {
                            store.set_mirror_message(event.message_id, new_id).await?;
                            transport.schedule_archive(new_id);
                            Ok(SyncOutcome::Reposted(new_id))
                        }
                        None => {
                            // The channel vanished along with the mirror;
                            // drop the stale reference so the record reads
                            // like any other channel-less one.
                            log::warn!(
                                "mirror {mirror_id} is gone and guild {} has no \
                                 #{STARBOARD_CHANNEL_NAME} channel to repost into",
                                event.guild_id
                            );
                            store.clear_mirror_message(event.message_id).await?;
                            Ok(SyncOutcome::NoStarboardChannel)
                        }
                    }
                }
                Err(TransportError::Other(e)) => {
                    log::warn!("failed to edit mirror {mirror_id}: {e}");
                    Ok(SyncOutcome::Unchanged)
                }
            }
        }
        // A record without a mirror means no starboard channel existed when
        // it qualified; nothing to sync until the tally drops to zero.
        None => Ok(SyncOutcome::Unchanged),
    }
}

struct DiscordTransport<'a> {
    ctx: &'a serenity::Context,
    guild_id: u64,
}

impl StarboardTransport for DiscordTransport<'_> {
    async fn fetch_source(
        &self,
        event: &StarEvent,
    ) -> Result<Option<SourceMessageSnapshot>, Error> {
        let message = match serenity::ChannelId::new(event.channel_id)
            .message(&self.ctx.http, serenity::MessageId::new(event.message_id))
            .await
        {
            Ok(message) => message,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = snapshot_from_message(self.ctx, event.guild_id, &message).await?;
        Ok(Some(snapshot))
    }

    async fn retract_self_star(&self, event: &StarEvent, snapshot: &SourceMessageSnapshot) {
        let channel = serenity::ChannelId::new(event.channel_id);
        let message = serenity::MessageId::new(event.message_id);

        // Needs manage-messages; if we lack it the star just stays.
        if let Err(e) = channel
            .delete_reaction(
                &self.ctx.http,
                message,
                Some(serenity::UserId::new(event.actor_id)),
                serenity::ReactionType::Unicode(STAR_EMOJI.to_string()),
            )
            .await
        {
            log::debug!("could not retract self-star on {}: {e}", event.message_id);
        }

        let reply = serenity::CreateMessage::new()
            .content(format!(
                "You can't star your own messages, <@{}>.",
                snapshot.author_id
            ))
            .reference_message((channel, message));
        if let Err(e) = channel.send_message(&self.ctx.http, reply).await {
            log::warn!("could not send self-star rejection: {e}");
        }
    }

    async fn post_mirror(&self, snapshot: &SourceMessageSnapshot) -> Result<Option<u64>, Error> {
        let Some(channel) = starboard_channel(self.ctx, snapshot.guild_id).await? else {
            return Ok(None);
        };
        let embeds = assemble_mirror_embeds(snapshot, snapshot.star_tally);
        let message = channel
            .send_message(&self.ctx.http, serenity::CreateMessage::new().embeds(embeds))
            .await?;
        Ok(Some(message.id.get()))
    }

    async fn edit_mirror(
        &self,
        mirror_message_id: u64,
        snapshot: &SourceMessageSnapshot,
    ) -> Result<(), TransportError> {
        let Some(channel) = starboard_channel(self.ctx, snapshot.guild_id)
            .await
            .map_err(TransportError::Other)?
        else {
            return Err(TransportError::NotFound);
        };
        let embeds = assemble_mirror_embeds(snapshot, snapshot.star_tally);
        channel
            .edit_message(
                &self.ctx.http,
                serenity::MessageId::new(mirror_message_id),
                serenity::EditMessage::new().embeds(embeds),
            )
            .await?;
        Ok(())
    }

    async fn delete_mirror(&self, mirror_message_id: u64) -> Result<(), TransportError> {
        // The record only stores the mirror's message id; the channel is
        // always the guild's starboard channel.
        let Some(channel) = starboard_channel(self.ctx, self.guild_id)
            .await
            .map_err(TransportError::Other)?
        else {
            return Err(TransportError::NotFound);
        };
        channel
            .delete_message(&self.ctx.http, serenity::MessageId::new(mirror_message_id))
            .await?;
        Ok(())
    }

    fn schedule_archive(&self, mirror_message_id: u64) {
        let ctx = self.ctx.clone();
        let guild_id = self.guild_id;
        tokio::spawn(async move {
            let channel = match starboard_channel(&ctx, guild_id).await {
                Ok(Some(channel)) => channel,
                _ => return,
            };
            let tier = guild_premium_tier(&ctx, guild_id).await;
            let limit = image_archiver::effective_upload_limit(
                image_archiver::reported_upload_limit(tier),
            );
            image_archiver::archive_image(
                ctx.http.clone(),
                channel,
                serenity::MessageId::new(mirror_message_id),
                limit,
            )
            .await;
        });
    }
}

/// Build a [`SourceMessageSnapshot`] from a live message: star tally, one
/// level of reply resolution, rich embeds to carry over, and the eligible
/// population for the threshold policy.
pub(crate) async fn snapshot_from_message(
    ctx: &serenity::Context,
    guild_id: u64,
    message: &serenity::Message,
) -> Result<SourceMessageSnapshot, Error> {
    let star_tally = message
        .reactions
        .iter()
        .find(|reaction| reaction.reaction_type.to_string() == STAR_EMOJI)
        .map(|reaction| reaction.count)
        .unwrap_or(0);

    let reply = resolve_reply(ctx, message).await;

    let attachments = message
        .attachments
        .iter()
        .map(|attachment| SnapshotAttachment {
            url: attachment.url.clone(),
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            spoiler: attachment.filename.starts_with("SPOILER_"),
            size: attachment.size,
        })
        .collect();

    let extra_embeds = message
        .embeds
        .iter()
        .filter(|embed| embed.kind.as_deref() == Some("rich"))
        .take(MAX_COPIED_EMBEDS)
        .cloned()
        .map(serenity::CreateEmbed::from)
        .collect();

    let population = eligible_population(ctx, guild_id, message.channel_id.get()).await;

    Ok(SourceMessageSnapshot {
        message_id: message.id.get(),
        channel_id: message.channel_id.get(),
        guild_id,
        author_id: message.author.id.get(),
        author_name: message.author.display_name().to_string(),
        author_avatar_url: message.author.face(),
        content: message.content.clone(),
        created_at: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_default(),
        edited_at: message
            .edited_timestamp
            .and_then(|t| DateTime::from_timestamp(t.unix_timestamp(), 0)),
        attachments,
        reply,
        extra_embeds,
        star_tally,
        population,
    })
}

/// One reply hop only; unfetchable references are dropped silently.
async fn resolve_reply(
    ctx: &serenity::Context,
    message: &serenity::Message,
) -> Option<ReplyExcerpt> {
    if let Some(referenced) = &message.referenced_message {
        return Some(reply_excerpt(referenced));
    }
    let reference = message.message_reference.as_ref()?;
    let referenced_id = reference.message_id?;
    let referenced = reference
        .channel_id
        .message(&ctx.http, referenced_id)
        .await
        .ok()?;
    Some(reply_excerpt(&referenced))
}

fn reply_excerpt(message: &serenity::Message) -> ReplyExcerpt {
    ReplyExcerpt {
        author_name: message.author.display_name().to_string(),
        jump_url: message.link(),
        content: message.content.clone(),
    }
}

/// Thread member count for threads, guild member count otherwise; cached
/// guild data first, then a counted guild fetch.
async fn eligible_population(
    ctx: &serenity::Context,
    guild_id: u64,
    channel_id: u64,
) -> u64 {
    let channel = serenity::ChannelId::new(channel_id)
        .to_channel(ctx)
        .await
        .ok()
        .and_then(|channel| channel.guild());

    if let Some(channel) = &channel {
        let is_thread = matches!(
            channel.kind,
            serenity::ChannelType::PublicThread
                | serenity::ChannelType::PrivateThread
                | serenity::ChannelType::NewsThread
        );
        if is_thread {
            if let Some(count) = channel.member_count {
                return u64::from(count);
            }
        }
    }

    let cached = ctx
        .cache
        .guild(serenity::GuildId::new(guild_id))
        .map(|guild| guild.member_count);
    if let Some(count) = cached {
        if count > 0 {
            return count;
        }
    }

    serenity::GuildId::new(guild_id)
        .to_partial_guild_with_counts(&ctx.http)
        .await
        .ok()
        .and_then(|guild| guild.approximate_member_count)
        .unwrap_or(0)
}

async fn starboard_channel(
    ctx: &serenity::Context,
    guild_id: u64,
) -> Result<Option<serenity::ChannelId>, Error> {
    let channels = serenity::GuildId::new(guild_id).channels(&ctx.http).await?;
    Ok(channels
        .values()
        .find(|channel| {
            channel.kind == serenity::ChannelType::Text
                && channel.name == STARBOARD_CHANNEL_NAME
        })
        .map(|channel| channel.id))
}

async fn guild_premium_tier(
    ctx: &serenity::Context,
    guild_id: u64,
) -> serenity::PremiumTier {
    let cached = ctx
        .cache
        .guild(serenity::GuildId::new(guild_id))
        .map(|guild| guild.premium_tier);
    if let Some(tier) = cached {
        return tier;
    }
    serenity::GuildId::new(guild_id)
        .to_partial_guild(&ctx.http)
        .await
        .map(|guild| guild.premium_tier)
        .unwrap_or(serenity::PremiumTier::Tier0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockTransport {
        snapshot: Mutex<Option<SourceMessageSnapshot>>,
        has_channel: bool,
        next_mirror_id: AtomicU64,
        posted: Mutex<Vec<u64>>,
        edited: Mutex<Vec<u64>>,
        edited_content: Mutex<Vec<String>>,
        deleted: Mutex<Vec<u64>>,
        archived: Mutex<Vec<u64>>,
        missing_mirrors: Mutex<HashSet<u64>>,
        retractions: AtomicUsize,
    }

    impl MockTransport {
        fn new(snapshot: Option<SourceMessageSnapshot>) -> Self {
            Self {
                snapshot: Mutex::new(snapshot),
                has_channel: true,
                next_mirror_id: AtomicU64::new(9000),
                posted: Mutex::new(Vec::new()),
                edited: Mutex::new(Vec::new()),
                edited_content: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
                archived: Mutex::new(Vec::new()),
                missing_mirrors: Mutex::new(HashSet::new()),
                retractions: AtomicUsize::new(0),
            }
        }

        fn set_tally(&self, tally: u64) {
            let mut guard = self.snapshot.lock().unwrap();
            if let Some(snapshot) = guard.as_mut() {
                snapshot.star_tally = tally;
            }
        }

        fn mark_mirror_missing(&self, mirror_id: u64) {
            self.missing_mirrors.lock().unwrap().insert(mirror_id);
        }
    }

    impl StarboardTransport for MockTransport {
        async fn fetch_source(
            &self,
            _event: &StarEvent,
        ) -> Result<Option<SourceMessageSnapshot>, Error> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn retract_self_star(
            &self,
            _event: &StarEvent,
            _snapshot: &SourceMessageSnapshot,
        ) {
            self.retractions.fetch_add(1, Ordering::SeqCst);
        }

        async fn post_mirror(
            &self,
            _snapshot: &SourceMessageSnapshot,
        ) -> Result<Option<u64>, Error> {
            if !self.has_channel {
                return Ok(None);
            }
            let id = self.next_mirror_id.fetch_add(1, Ordering::SeqCst);
            self.posted.lock().unwrap().push(id);
            Ok(Some(id))
        }

        async fn edit_mirror(
            &self,
            mirror_message_id: u64,
            snapshot: &SourceMessageSnapshot,
        ) -> Result<(), TransportError> {
            if self
                .missing_mirrors
                .lock()
                .unwrap()
                .contains(&mirror_message_id)
            {
                return Err(TransportError::NotFound);
            }
            self.edited.lock().unwrap().push(mirror_message_id);
            self.edited_content
                .lock()
                .unwrap()
                .push(snapshot.content.clone());
            Ok(())
        }

        async fn delete_mirror(&self, mirror_message_id: u64) -> Result<(), TransportError> {
            self.deleted.lock().unwrap().push(mirror_message_id);
            Ok(())
        }

        fn schedule_archive(&self, mirror_message_id: u64) {
            self.archived.lock().unwrap().push(mirror_message_id);
        }
    }

    fn snapshot(tally: u64, population: u64) -> SourceMessageSnapshot {
        SourceMessageSnapshot {
            message_id: 111,
            channel_id: 222,
            guild_id: 333,
            author_id: 444,
            author_name: "tester".into(),
            author_avatar_url: "https://cdn.example/avatar.png".into(),
            content: "hello".into(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            edited_at: None,
            attachments: vec![],
            reply: None,
            extra_embeds: vec![],
            star_tally: tally,
            population,
        }
    }

    fn event(kind: StarEventKind) -> StarEvent {
        StarEvent {
            message_id: 111,
            channel_id: 222,
            guild_id: 333,
            actor_id: 555,
            kind,
        }
    }

    async fn memory_db() -> Database {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Database::from_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn below_cap_leaves_no_record() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(9, 100)));

        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::BelowThreshold);
        assert!(store.get(111).await.unwrap().is_none());
        assert!(transport.posted.lock().unwrap().is_empty());

        // firing the same ineligible event again still creates nothing
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::BelowThreshold);
        assert!(store.get(111).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn crossing_cap_posts_exactly_once() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(10, 100)));

        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Posted(9000));

        let record = store.get(111).await.unwrap().unwrap();
        assert_eq!(record.mirror_message_id.as_deref(), Some("9000"));
        assert_eq!(*transport.archived.lock().unwrap(), vec![9000]);

        // the next star edits the existing mirror instead of posting again
        transport.set_tally(11);
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Edited(9000));
        assert_eq!(transport.posted.lock().unwrap().len(), 1);
        assert_eq!(*transport.edited.lock().unwrap(), vec![9000]);
    }

    #[tokio::test]
    async fn self_star_never_touches_the_store() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(50, 100)));
        let mut ev = event(StarEventKind::Add);
        ev.actor_id = 444; // the author

        let outcome = process_star_event(&transport, &store, &ev).await.unwrap();

        assert_eq!(outcome, SyncOutcome::SelfStarRejected);
        assert_eq!(transport.retractions.load(Ordering::SeqCst), 1);
        assert!(store.get(111).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn self_unstar_is_not_special() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(10, 100)));
        let mut ev = event(StarEventKind::Remove);
        ev.actor_id = 444;

        let outcome = process_star_event(&transport, &store, &ev).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Posted(9000));
        assert_eq!(transport.retractions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn losing_all_stars_demotes_regardless_of_cap() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(10, 100)));

        process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        transport.set_tally(0);
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Remove))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Demoted);
        assert_eq!(*transport.deleted.lock().unwrap(), vec![9000]);
        assert!(store.get(111).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_tally_without_record_is_ignored() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(0, 100)));

        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Remove))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Ignored);
        assert!(transport.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn source_edit_is_reflected_on_next_event() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(10, 100)));

        process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        {
            let mut guard = transport.snapshot.lock().unwrap();
            guard.as_mut().unwrap().content = "edited content".into();
        }
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Edited(9000));
        assert_eq!(
            *transport.edited_content.lock().unwrap(),
            vec!["edited content".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_mirror_is_reposted() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(10, 100)));

        process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        transport.mark_mirror_missing(9000);

        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Reposted(9001));
        let record = store.get(111).await.unwrap().unwrap();
        assert_eq!(record.mirror_message_id.as_deref(), Some("9001"));
        assert!(transport.archived.lock().unwrap().contains(&9001));
    }

    #[tokio::test]
    async fn lost_mirror_without_channel_clears_stale_mirror_id() {
        let store = memory_db().await;
        let mut transport = MockTransport::new(Some(snapshot(10, 100)));

        process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        // the mirror and the whole starboard channel disappear out-of-band
        transport.mark_mirror_missing(9000);
        transport.has_channel = false;

        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::NoStarboardChannel);
        let record = store.get(111).await.unwrap().unwrap();
        assert!(record.mirror_message_id.is_none());
    }

    #[tokio::test]
    async fn missing_source_cleans_up_mirror_and_record() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(10, 100)));

        process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();

        *transport.snapshot.lock().unwrap() = None;
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Remove))
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Demoted);
        assert_eq!(*transport.deleted.lock().unwrap(), vec![9000]);
        assert!(store.get(111).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_starboard_channel_keeps_record_without_mirror() {
        let store = memory_db().await;
        let mut transport = MockTransport::new(Some(snapshot(10, 100)));
        transport.has_channel = false;

        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::NoStarboardChannel);

        let record = store.get(111).await.unwrap().unwrap();
        assert!(record.mirror_message_id.is_none());

        // with a mirror still unposted there is nothing to sync
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);

        // but losing all stars still cleans the record up
        transport.set_tally(0);
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Remove))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Demoted);
        assert!(store.get(111).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_lifecycle_population_one_hundred() {
        let store = memory_db().await;
        let transport = MockTransport::new(Some(snapshot(9, 100)));

        // 9 stars: nothing
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::BelowThreshold);
        assert!(store.get(111).await.unwrap().is_none());

        // 10th star: posted
        transport.set_tally(10);
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Add))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Posted(9000));

        // back to 0: mirror and record both gone
        transport.set_tally(0);
        let outcome = process_star_event(&transport, &store, &event(StarEventKind::Remove))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Demoted);
        assert_eq!(*transport.deleted.lock().unwrap(), vec![9000]);
        assert!(store.get(111).await.unwrap().is_none());
    }
}
