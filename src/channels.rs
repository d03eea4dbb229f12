//! Channel naming shared with the transport: the literal `main`, plus
//! per-room `play@CODE` and `watch@CODE` channels.

pub const MAIN_CHANNEL: &str = "main";

const ATTRIBUTE_SEPARATOR: char = '@';
const PLAY_TAG: &str = "play";
const WATCH_TAG: &str = "watch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Play,
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Main,
    Room { mode: Mode, code: String },
}

/// Parse a channel name; `None` means the format is unknown.
pub fn parse(channel: &str) -> Option<Channel> {
    if channel == MAIN_CHANNEL {
        return Some(Channel::Main);
    }

    let (mode, code) = channel.split_once(ATTRIBUTE_SEPARATOR)?;
    if code.is_empty() {
        return None;
    }

    let mode = match mode {
        PLAY_TAG => Mode::Play,
        WATCH_TAG => Mode::Watch,
        _ => return None,
    };

    Some(Channel::Room {
        mode,
        code: code.to_string(),
    })
}

pub fn play(code: &str) -> String {
    format!("{PLAY_TAG}{ATTRIBUTE_SEPARATOR}{code}")
}

pub fn watch(code: &str) -> String {
    format!("{WATCH_TAG}{ATTRIBUTE_SEPARATOR}{code}")
}

pub fn is_room(channel: &str) -> bool {
    matches!(parse(channel), Some(Channel::Room { .. }))
}
