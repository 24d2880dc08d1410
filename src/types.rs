use poise::futures_util::lock::Mutex;

pub struct Data {
    pub starboard: crate::helpers::starboard::Database,
    /// Serializes every starboard transition; see `starboard_manager`.
    pub starboard_lock: Mutex<()>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type Context<'a> = poise::Context<'a, Data, Error>;
