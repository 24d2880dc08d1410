pub mod image_archiver;
pub mod star_embed;
pub mod starboard;
pub mod starboard_manager;
