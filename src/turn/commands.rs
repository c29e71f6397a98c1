//! Exit and save keywords, matched the same way for typed and spoken input.

use crate::config::TurnSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Save,
    Say(String),
}

/// Punctuation Whisper likes to append to one-word sentences.
fn strip_decoration(text: &str) -> &str {
    text.trim().trim_matches(|ch: char| {
        ch.is_whitespace() || matches!(ch, '。' | '！' | '？' | '，' | '.' | '!' | '?' | ',')
    })
}

fn matches_keyword(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| text.eq_ignore_ascii_case(keyword.trim()))
}

pub fn classify(text: &str, settings: &TurnSettings) -> Command {
    let bare = strip_decoration(text);
    if matches_keyword(bare, &settings.exit_keywords) {
        Command::Exit
    } else if matches_keyword(bare, &settings.save_keywords) {
        Command::Save
    } else {
        Command::Say(text.trim().to_string())
    }
}
