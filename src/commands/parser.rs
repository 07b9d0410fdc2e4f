//! Wake phrase and trigger phrase parsing
//!
//! Recognized speech like `"뮤직봇 다시재생 지금"` is reduced to a canonical
//! command (`resume`) and an argument string (`지금`). Trigger phrases are
//! tried longest first so a specific phrase always beats a shorter phrase
//! it begins with.

/// One trigger phrase and the canonical command it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub phrase: String,
    pub command: String,
}

impl CommandEntry {
    /// Create an entry; the phrase is normalized to trimmed lowercase
    #[must_use]
    pub fn new(phrase: &str, command: &str) -> Self {
        Self {
            phrase: phrase.trim().to_lowercase(),
            command: command.trim().to_string(),
        }
    }
}

/// Built-in Korean trigger phrases
const DEFAULT_ENTRIES: &[(&str, &str)] = &[
    // play
    ("재생", "play"),
    ("플레이", "play"),
    ("틀어줘", "play"),
    ("들려줘", "play"),
    ("노래틀어줘", "play"),
    ("음악틀어줘", "play"),
    // pause
    ("일시정지", "pause"),
    ("멈춰", "pause"),
    ("정지", "pause"),
    ("멈춰줘", "pause"),
    // resume
    ("다시재생", "resume"),
    ("계속", "resume"),
    ("다시", "resume"),
    ("계속재생", "resume"),
    ("이어서", "resume"),
    // skip
    ("스킵", "skip"),
    ("건너뛰기", "skip"),
    ("넘겨", "skip"),
    ("다음", "skip"),
    ("다음곡", "skip"),
    ("넘겨줘", "skip"),
    // queue
    ("큐", "queue"),
    ("대기열", "queue"),
    ("목록", "queue"),
    ("재생목록", "queue"),
    // now playing
    ("지금재생", "np"),
    ("현재곡", "np"),
    ("지금곡", "np"),
    ("뭐나와", "np"),
    ("뭐틀고있어", "np"),
    // volume
    ("볼륨", "volume"),
    ("음량", "volume"),
    ("소리", "volume"),
    ("크기", "volume"),
    // shuffle
    ("셔플", "shuffle"),
    ("섞기", "shuffle"),
    ("랜덤", "shuffle"),
    // repeat
    ("반복", "repeat"),
    ("리피트", "repeat"),
    ("무한반복", "repeat"),
    // disconnect
    ("나와", "disconnect"),
    ("종료", "disconnect"),
    ("끊어", "disconnect"),
    ("그만", "disconnect"),
    ("나가", "disconnect"),
    ("꺼져", "disconnect"),
    // summon
    ("와", "summon"),
    ("이리와", "summon"),
    ("오", "summon"),
    ("소환", "summon"),
    // clear
    ("클리어", "clear"),
    ("전부삭제", "clear"),
    ("다지워", "clear"),
    ("목록지워", "clear"),
];

/// Trigger phrase table, kept in matching order (longest phrase first)
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    /// Build a table from entries
    ///
    /// Empty phrases are skipped. A repeated phrase keeps its last mapping.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = CommandEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    /// The built-in Korean music bot phrases
    #[must_use]
    pub fn korean() -> Self {
        Self::from_pairs(DEFAULT_ENTRIES)
    }

    /// Build a table from `(phrase, command)` pairs
    #[must_use]
    pub fn from_pairs<P: AsRef<str>, C: AsRef<str>>(pairs: &[(P, C)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(p, c)| CommandEntry::new(p.as_ref(), c.as_ref())),
        )
    }

    /// Add or replace an entry
    pub fn insert(&mut self, entry: CommandEntry) {
        if entry.phrase.is_empty() || entry.command.is_empty() {
            return;
        }

        self.entries.retain(|e| e.phrase != entry.phrase);
        self.entries.push(entry);
        // Stable sort: equal-length phrases keep insertion order
        self.entries
            .sort_by_key(|e| std::cmp::Reverse(e.phrase.chars().count()));
    }

    /// Entries in matching order
    #[must_use]
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Number of trigger phrases
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no phrases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct canonical commands, sorted
    #[must_use]
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.entries.iter().map(|e| e.command.as_str()).collect();
        commands.sort_unstable();
        commands.dedup();
        commands
    }

    /// Longest trigger phrase that prefixes `text`
    #[must_use]
    pub fn match_prefix<'a>(&'a self, text: &str) -> Option<&'a CommandEntry> {
        self.entries.iter().find(|e| text.starts_with(&e.phrase))
    }
}

/// A recognized command and its argument string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Canonical command name
    pub command: String,

    /// Text following the trigger phrase, trimmed
    pub args: String,

    /// Trigger phrase that matched
    pub phrase: String,
}

/// Detects the wake phrase and maps the rest of the utterance to a command
#[derive(Debug, Clone)]
pub struct CommandParser {
    wake_phrase: String,
    table: CommandTable,
}

impl CommandParser {
    /// Create a parser; the wake phrase is normalized to trimmed lowercase
    #[must_use]
    pub fn new(wake_phrase: &str, table: CommandTable) -> Self {
        let wake_phrase = wake_phrase.trim().to_lowercase();
        tracing::debug!(wake_phrase = %wake_phrase, phrases = table.len(), "command parser initialized");
        Self { wake_phrase, table }
    }

    /// The normalized wake phrase
    #[must_use]
    pub fn wake_phrase(&self) -> &str {
        &self.wake_phrase
    }

    /// The trigger phrase table
    #[must_use]
    pub const fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Whether `text` addresses the bot
    ///
    /// Plain substring containment: the wake phrase inside a longer word
    /// also counts.
    #[must_use]
    pub fn is_voice_command(&self, text: &str) -> bool {
        !self.wake_phrase.is_empty() && text.trim().to_lowercase().contains(&self.wake_phrase)
    }

    /// Example prefix a user says before a command
    #[must_use]
    pub fn command_prefix(&self) -> String {
        format!("{} ", self.wake_phrase)
    }

    /// Parse recognized text into a command
    ///
    /// Returns `None` when the wake phrase is absent, nothing follows it, or
    /// no trigger phrase prefixes the remainder.
    #[must_use]
    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        if self.wake_phrase.is_empty() {
            return None;
        }

        let text = text.trim().to_lowercase();
        let start = text.find(&self.wake_phrase)?;
        let remainder = text[start + self.wake_phrase.len()..].trim();

        if remainder.is_empty() {
            return None;
        }

        let Some(entry) = self.table.match_prefix(remainder) else {
            tracing::debug!(remainder, "no matching command phrase");
            return None;
        };

        let args = remainder[entry.phrase.len()..].trim().to_string();
        tracing::info!(command = %entry.command, args = %args, "parsed voice command");

        Some(ParsedCommand {
            command: entry.command.clone(),
            args,
            phrase: entry.phrase.clone(),
        })
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_WAKE_PHRASE, CommandTable::korean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::new("뮤직봇", CommandTable::korean())
    }

    #[test]
    fn test_no_wake_phrase_is_none() {
        assert!(parser().parse("스킵").is_none());
        assert!(parser().parse("").is_none());
    }

    #[test]
    fn test_wake_phrase_alone_is_none() {
        assert!(parser().parse("  뮤직봇  ").is_none());
    }

    #[test]
    fn test_unknown_phrase_is_none() {
        assert!(parser().parse("뮤직봇 안녕하세요").is_none());
    }

    #[test]
    fn test_simple_command() {
        let parsed = parser().parse("뮤직봇 스킵").unwrap();
        assert_eq!(parsed.command, "skip");
        assert_eq!(parsed.args, "");
    }

    #[test]
    fn test_longest_phrase_wins() {
        let table = CommandTable::from_pairs(&[("다시", "restart"), ("다시재생", "resume")]);
        let parser = CommandParser::new("뮤직봇", table);

        let parsed = parser.parse("뮤직봇 다시재생 지금").unwrap();
        assert_eq!(parsed.command, "resume");
        assert_eq!(parsed.phrase, "다시재생");
        assert_eq!(parsed.args, "지금");

        let parsed = parser.parse("뮤직봇 다시 해줘").unwrap();
        assert_eq!(parsed.command, "restart");
        assert_eq!(parsed.args, "해줘");
    }

    #[test]
    fn test_arguments_follow_phrase() {
        let parsed = parser().parse("뮤직봇 재생 아이유 좋은 날").unwrap();
        assert_eq!(parsed.command, "play");
        assert_eq!(parsed.args, "아이유 좋은 날");
    }

    #[test]
    fn test_text_before_wake_phrase_is_ignored() {
        let parsed = parser().parse("음 저기 뮤직봇 볼륨 50").unwrap();
        assert_eq!(parsed.command, "volume");
        assert_eq!(parsed.args, "50");
    }

    #[test]
    fn test_first_occurrence_of_wake_phrase() {
        let parsed = parser().parse("뮤직봇 스킵 뮤직봇 정지").unwrap();
        assert_eq!(parsed.command, "skip");
        assert_eq!(parsed.args, "뮤직봇 정지");
    }

    #[test]
    fn test_case_insensitive_wake_phrase() {
        let parser = CommandParser::new("Music Bot", CommandTable::from_pairs(&[("skip", "skip")]));
        let parsed = parser.parse("hey MUSIC BOT Skip").unwrap();
        assert_eq!(parsed.command, "skip");
    }

    #[test]
    fn test_wake_phrase_inside_word_still_matches() {
        let parser = CommandParser::new("bot", CommandTable::from_pairs(&[("skip", "skip")]));
        assert!(parser.is_voice_command("robotics"));
        assert_eq!(parser.parse("robot skip").unwrap().command, "skip");
    }

    #[test]
    fn test_phrase_without_space_before_args() {
        let parsed = parser().parse("뮤직봇 볼륨50").unwrap();
        assert_eq!(parsed.command, "volume");
        assert_eq!(parsed.args, "50");
    }

    #[test]
    fn test_table_replaces_duplicate_phrase() {
        let mut table = CommandTable::korean();
        let before = table.len();
        table.insert(CommandEntry::new("스킵", "next"));

        assert_eq!(table.len(), before);
        assert_eq!(table.match_prefix("스킵").unwrap().command, "next");
    }

    #[test]
    fn test_table_sorted_longest_first() {
        let table = CommandTable::korean();
        let lengths: Vec<usize> = table
            .entries()
            .iter()
            .map(|e| e.phrase.chars().count())
            .collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
        assert!(table.commands().contains(&"summon"));
    }

    #[test]
    fn test_command_prefix() {
        assert_eq!(parser().command_prefix(), "뮤직봇 ");
        assert!(parser().is_voice_command("뮤직봇 재생"));
        assert!(!parser().is_voice_command("재생"));
    }
}
