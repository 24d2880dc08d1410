use poise::serenity_prelude as serenity;

use crate::structs::starboard_message::{
    SourceMessageSnapshot, NO_ENTRY_EMOJI, STAR_EMOJI,
};

/// Fraction of the eligible population a message must collect in stars.
pub const STAR_RATIO: f64 = 0.1;

/// Embed field values are capped by Discord at 1024 characters.
const FIELD_VALUE_LIMIT: usize = 1024;

/// A mirror message carries the rendered embed plus copied rich embeds,
/// never more than 10 total.
const MAX_MIRROR_EMBEDS: usize = 10;

const EMBED_COLOUR: u32 = 0x00F1_C40F;

/// The dynamic star cap for a population. A population reported as 0 is
/// treated as 1 so a lone star can still qualify.
pub fn qualifying_cap(population: u64) -> f64 {
    population.max(1) as f64 * STAR_RATIO
}

/// Caps are fractional and compared unrounded.
pub fn qualifies(tally: u64, cap: f64) -> bool {
    tally as f64 >= cap
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn star_display(tally: u64) -> String {
    if tally > 5 {
        format!("{STAR_EMOJI}x{}", group_thousands(tally))
    } else if tally == 0 {
        NO_ENTRY_EMOJI.to_string()
    } else {
        STAR_EMOJI.repeat(tally as usize)
    }
}

fn shorten(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    if budget <= 3 {
        return text.chars().take(budget).collect();
    }
    let head: String = text.chars().take(budget - 3).collect();
    format!("{head}...")
}

/// Build the starboard embed for a source message. Pure: identical inputs
/// produce identical embeds.
pub fn render(snapshot: &SourceMessageSnapshot, tally: u64) -> serenity::CreateEmbed {
    let jump_url = snapshot.jump_url();

    let mut info = format!(
        "Star count: {}\nChannel: <#{}>\nAuthor: <@{}>\nURL: [jump]({})\nSent: <t:{}:R>",
        star_display(tally),
        snapshot.channel_id,
        snapshot.author_id,
        jump_url,
        snapshot.created_at.timestamp(),
    );
    if let Some(edited) = snapshot.edited_at {
        info.push_str(&format!("\nLast edited: <t:{}:R>", edited.timestamp()));
    }

    let author = serenity::CreateEmbedAuthor::new(&snapshot.author_name)
        .url(&jump_url)
        .icon_url(&snapshot.author_avatar_url);

    let mut embed = serenity::CreateEmbed::default()
        .colour(serenity::Colour::new(EMBED_COLOUR))
        .description(&snapshot.content)
        .author(author)
        .field("Info", info, false);

    if let Ok(timestamp) =
        serenity::Timestamp::from_unix_timestamp(snapshot.created_at.timestamp())
    {
        embed = embed.timestamp(timestamp);
    }

    if let Some(reply) = &snapshot.reply {
        let mut value = format!("[Message by {}]({})", reply.author_name, reply.jump_url);
        if !reply.content.is_empty() {
            value.push_str(":\n>>> ");
            let budget = FIELD_VALUE_LIMIT.saturating_sub(value.chars().count());
            value.push_str(&shorten(&reply.content, budget));
        }
        embed = embed.field("In reply to", value, false);
    }

    let mut image_set = false;
    for (index, attachment) in snapshot.attachments.iter().enumerate() {
        let name = format!("Attachment #{index}");
        if attachment.spoiler {
            embed = embed.field(
                name,
                format!("||[{}]({})||", attachment.filename, attachment.url),
                false,
            );
        } else {
            let is_image = attachment
                .content_type
                .as_deref()
                .is_some_and(|kind| kind.starts_with("image"));
            if is_image && !image_set {
                embed = embed.image(&attachment.url);
                image_set = true;
            }
            embed = embed.field(
                name,
                format!("[{}]({})", attachment.filename, attachment.url),
                false,
            );
        }
    }

    embed
}

/// The rendered embed followed by the source's rich embeds, hard-capped at
/// the transport's 10 embed maximum.
pub fn assemble_mirror_embeds(
    snapshot: &SourceMessageSnapshot,
    tally: u64,
) -> Vec<serenity::CreateEmbed> {
    let mut embeds = vec![render(snapshot, tally)];
    embeds.extend(snapshot.extra_embeds.iter().cloned());
    embeds.truncate(MAX_MIRROR_EMBEDS);
    embeds
}
