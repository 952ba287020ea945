use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// Custom ids carried by the control buttons.
///
/// Every id is `<component>__<action>`; the interaction handler routes on
/// the part before the separator.
pub mod button_ids {
    pub const SEPARATOR: &str = "__";
    pub const COMPONENT: &str = "music";

    pub const PAUSE: &str = "music__pause";
    pub const RESUME: &str = "music__resume";
    pub const SKIP: &str = "music__skip";
    pub const STOP: &str = "music__stop";
    pub const QUEUE: &str = "music__queue";
}

/// Actions a music button can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicAction {
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
}

impl MusicAction {
    /// Parses a `music__<action>` custom id.
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        let (component, action) = custom_id.split_once(button_ids::SEPARATOR)?;
        if component != button_ids::COMPONENT {
            return None;
        }
        match action {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "skip" => Some(Self::Skip),
            "stop" => Some(Self::Stop),
            "queue" => Some(Self::Queue),
            _ => None,
        }
    }
}

/// Player controls attached to the "Now Playing" message.
pub fn create_player_buttons() -> Vec<CreateActionRow> {
    let pause_btn = CreateButton::new(button_ids::PAUSE)
        .emoji('⏸')
        .label("Pause")
        .style(ButtonStyle::Secondary);

    let resume_btn = CreateButton::new(button_ids::RESUME)
        .emoji('▶')
        .label("Resume")
        .style(ButtonStyle::Secondary);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .label("Skip")
        .style(ButtonStyle::Primary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .label("Stop")
        .style(ButtonStyle::Danger);

    let queue_btn = CreateButton::new(button_ids::QUEUE)
        .emoji('📋')
        .label("Queue")
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![
        pause_btn, resume_btn, skip_btn, stop_btn, queue_btn,
    ])]
}
