use std::fmt;

/// The doctor's five-level affect, ordered from calm to hysterical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Mood {
    Calm,
    #[default]
    SlightlyTense,
    ModeratelyTense,
    Panicked,
    Hysterical,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Calm,
        Mood::SlightlyTense,
        Mood::ModeratelyTense,
        Mood::Panicked,
        Mood::Hysterical,
    ];

    /// Label the model is asked to use, and the one shown to the operator.
    pub fn label(self) -> &'static str {
        match self {
            Mood::Calm => "平静",
            Mood::SlightlyTense => "轻微紧张",
            Mood::ModeratelyTense => "中度紧张",
            Mood::Panicked => "极度恐慌",
            Mood::Hysterical => "惊慌失措",
        }
    }

    /// 1 (calm) through 5 (hysterical).
    pub fn level(self) -> u8 {
        match self {
            Mood::Calm => 1,
            Mood::SlightlyTense => 2,
            Mood::ModeratelyTense => 3,
            Mood::Panicked => 4,
            Mood::Hysterical => 5,
        }
    }

    /// Emotion phrase for the synthesized voice.
    pub fn speaking_style(self) -> &'static str {
        match self {
            Mood::Calm => "平静",
            Mood::SlightlyTense => "有些紧张",
            Mood::ModeratelyTense => "紧张",
            Mood::Panicked => "非常紧张",
            Mood::Hysterical => "极度惊恐",
        }
    }

    /// Accepts the Chinese labels, English names and the 1-5 level.
    pub fn parse(text: &str) -> Option<Mood> {
        let trimmed = text.trim();
        if let Some(mood) = Mood::ALL.into_iter().find(|mood| mood.label() == trimmed) {
            return Some(mood);
        }
        let key: String = trimmed
            .to_ascii_lowercase()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "calm" | "1" => Some(Mood::Calm),
            "slightlytense" | "2" => Some(Mood::SlightlyTense),
            "moderatelytense" | "3" => Some(Mood::ModeratelyTense),
            "panicked" | "panic" | "4" => Some(Mood::Panicked),
            "hysterical" | "5" => Some(Mood::Hysterical),
            _ => None,
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
