use std::sync::Arc;

use poise::serenity_prelude as serenity;

use crate::types::Error;

const ARCHIVER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Starbot-Archiver/0.1";

const BASE_TIER_REPORTED_LIMIT: u64 = 8 * 1024 * 1024;
// Discord actually accepts 25 MiB on guilds that report the 8 MiB base tier.
const BASE_TIER_ACTUAL_LIMIT: u64 = 25 * 1024 * 1024;

pub fn reported_upload_limit(tier: serenity::PremiumTier) -> u64 {
    match tier {
        serenity::PremiumTier::Tier2 => 50 * 1024 * 1024,
        serenity::PremiumTier::Tier3 => 100 * 1024 * 1024,
        _ => BASE_TIER_REPORTED_LIMIT,
    }
}

pub fn effective_upload_limit(reported: u64) -> u64 {
    if reported == BASE_TIER_REPORTED_LIMIT {
        BASE_TIER_ACTUAL_LIMIT
    } else {
        reported
    }
}

/// Whether a downloaded payload may be re-uploaded. A payload exactly at the
/// limit is rejected; the limit is what Discord refuses, not what it accepts.
fn payload_within_limit(len: u64, limit: u64) -> bool {
    len < limit
}

fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed.path_segments().and_then(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .last()
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| "image".to_string())
}

/// Re-host the mirror's primary embed image as a local attachment so the
/// starboard entry survives the original host going away. Best effort: runs
/// detached from the synchronizer and only ever logs its failures.
pub async fn archive_image(
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
    mirror_message_id: serenity::MessageId,
    upload_limit: u64,
) {
    if let Err(e) = try_archive(&http, channel_id, mirror_message_id, upload_limit).await {
        log::warn!("image archive for starboard message {mirror_message_id} failed: {e}");
    }
}

async fn try_archive(
    http: &Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
    mirror_message_id: serenity::MessageId,
    upload_limit: u64,
) -> Result<(), Error> {
    let message = channel_id.message(http, mirror_message_id).await?;
    let Some(first_embed) = message.embeds.first() else {
        return Ok(());
    };
    let Some(image) = first_embed.image.clone() else {
        return Ok(());
    };
    // Already re-hosted on a previous pass.
    if image.url.starts_with("attachment://") {
        return Ok(());
    }

    let filename = filename_from_url(&image.url);
    let client = reqwest::Client::builder()
        .user_agent(ARCHIVER_USER_AGENT)
        .build()?;

    let response = match client.get(&image.url).send().await {
        Ok(response) => response,
        Err(_) => match &image.proxy_url {
            Some(proxy_url) => client.get(proxy_url).send().await?,
            None => return Ok(()),
        },
    };
    if !response.status().is_success() {
        return Ok(());
    }

    let bytes = response.bytes().await?;
    if !payload_within_limit(bytes.len() as u64, upload_limit) {
        log::debug!(
            "skipping archive of {}: {} bytes exceeds the {upload_limit} byte limit",
            image.url,
            bytes.len()
        );
        return Ok(());
    }

    let mut embeds = Vec::with_capacity(message.embeds.len());
    embeds.push(
        serenity::CreateEmbed::from(first_embed.clone())
            .image(format!("attachment://{filename}")),
    );
    embeds.extend(
        message
            .embeds
            .iter()
            .skip(1)
            .cloned()
            .map(serenity::CreateEmbed::from),
    );

    let edit = serenity::EditMessage::new()
        .embeds(embeds)
        .new_attachment(serenity::CreateAttachment::bytes(bytes.to_vec(), filename));
    channel_id
        .edit_message(http, mirror_message_id, edit)
        .await?;

    Ok(())
}
