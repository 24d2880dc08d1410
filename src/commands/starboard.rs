pub(crate) use crate::types::{Context, Data, Error};

use poise::serenity_prelude as serenity;

use crate::helpers::star_embed;
use crate::helpers::starboard_manager::snapshot_from_message;

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        starboard_info(),
        // add more here
    ]
}

/// Renders the starboard embed for any message. Read-only; never touches
/// the mirror store.
#[poise::command(context_menu_command = "Starboard Info", guild_only)]
pub async fn starboard_info(
    ctx: Context<'_>,
    message: serenity::Message,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().unwrap().get();

    let snapshot = snapshot_from_message(ctx.serenity_context(), guild_id, &message).await?;
    let embed = star_embed::render(&snapshot, snapshot.star_tally);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
