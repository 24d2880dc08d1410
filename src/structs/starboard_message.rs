use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};

/// The one reaction emoji that counts toward the starboard.
pub const STAR_EMOJI: &str = "\u{2B50}";
/// Shown in place of the star count when a message has zero stars.
pub const NO_ENTRY_EMOJI: &str = "\u{1F6AB}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarEventKind {
    Add,
    Remove,
}

/// A normalized star reaction notification. Only built for guild-scoped
/// events carrying [`STAR_EMOJI`]; everything else is dropped at ingest.
#[derive(Debug, Clone)]
pub struct StarEvent {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub actor_id: u64,
    pub kind: StarEventKind,
}

impl StarEvent {
    /// Guard for incoming reaction notifications. Returns `None` for DM
    /// reactions, non-star emoji, and reactions with no known actor.
    pub fn from_reaction(reaction: &serenity::Reaction, kind: StarEventKind) -> Option<Self> {
        let guild_id = reaction.guild_id?;
        if reaction.emoji.to_string() != STAR_EMOJI {
            return None;
        }
        let actor_id = reaction.user_id?;

        Some(Self {
            message_id: reaction.message_id.get(),
            channel_id: reaction.channel_id.get(),
            guild_id: guild_id.get(),
            actor_id: actor_id.get(),
            kind,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotAttachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub spoiler: bool,
    pub size: u32,
}

/// One-level resolved reply reference. Deeper chains are never followed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyExcerpt {
    pub author_name: String,
    pub jump_url: String,
    pub content: String,
}

/// Read-through view of a live source message, rebuilt on every event.
/// Never persisted; its staleness window is a single processing step.
#[derive(Debug, Clone)]
pub struct SourceMessageSnapshot {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_avatar_url: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub attachments: Vec<SnapshotAttachment>,
    pub reply: Option<ReplyExcerpt>,
    /// Rich embeds carried over from the source message, already converted
    /// for reposting.
    pub extra_embeds: Vec<serenity::CreateEmbed>,
    /// Live count of [`STAR_EMOJI`] reactions at fetch time.
    pub star_tally: u64,
    /// Thread member count for threads, guild member count otherwise.
    pub population: u64,
}

impl SourceMessageSnapshot {
    pub fn jump_url(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.message_id
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MirrorRecord {
    pub id: i64,
    pub source_message_id: String,
    pub source_channel_id: String,
    pub mirror_message_id: Option<String>,
    pub created_at: Option<String>,
}
