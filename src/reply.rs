//! Reply text for archived content.

use crate::commentary::Commentary;
use crate::config::{Config, StorageNetwork};
use crate::constants::COMMENTARY_CONFIDENCE_THRESHOLD;

/// Commentary shorter than this after shortening is not worth including.
const MIN_COMMENTARY_CHARS: usize = 20;

/// Longest handle the network allows.
const MAX_HANDLE_CHARS: usize = 15;

/// Length of a CIDv1 in base32, as returned by the pinning service.
const CID_CHARS: usize = 59;

/// Public explorer URL of an archived object.
#[must_use]
pub fn archive_link(explorer_base: &str, network: StorageNetwork, cid: &str) -> String {
    format!(
        "{}/{}/permanent-storage/files/{cid}",
        explorer_base.trim_end_matches('/'),
        network.as_str()
    )
}

/// Smallest character limit that still fits the shortest mention reply for
/// any handle.
#[must_use]
pub fn minimum_reply_limit(explorer_base: &str, network: StorageNetwork) -> usize {
    let link = archive_link(explorer_base, network, &"x".repeat(CID_CHARS));
    // "@" + handle + " " + link
    MAX_HANDLE_CHARS + 2 + link.chars().count()
}

/// Commentary is only shown when the model was reasonably sure of it.
#[must_use]
pub fn should_include_commentary(commentary: &Commentary) -> bool {
    commentary.confidence > COMMENTARY_CONFIDENCE_THRESHOLD
}

/// Collapse whitespace and shorten `text` to at most `limit` characters.
///
/// Long text is cut at a word boundary when one exists in the last fifth of
/// the allowed length, and always ends in `...` when shortened.
#[must_use]
pub fn sanitize_for_platform(text: &str, limit: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= limit {
        return cleaned;
    }

    let truncated: String = cleaned.chars().take(limit.saturating_sub(3)).collect();
    let last_space = truncated
        .chars()
        .enumerate()
        .filter(|(_, c)| *c == ' ')
        .map(|(i, _)| i)
        .last();

    match last_space {
        Some(idx) if idx as f64 > limit as f64 * 0.8 => {
            let head: String = truncated.chars().take(idx).collect();
            format!("{head}...")
        }
        _ => format!("{truncated}..."),
    }
}

/// Builds the replies sent after an archive completes.
#[derive(Debug, Clone)]
pub struct ReplyComposer {
    explorer_base: String,
    network: StorageNetwork,
    char_limit: usize,
}

impl ReplyComposer {
    #[must_use]
    pub fn new(explorer_base: &str, network: StorageNetwork, char_limit: usize) -> Self {
        Self {
            explorer_base: explorer_base.to_string(),
            network,
            char_limit,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.explorer_base_url,
            config.storage_network,
            config.reply_char_limit,
        )
    }

    #[must_use]
    pub fn link(&self, cid: &str) -> String {
        archive_link(&self.explorer_base, self.network, cid)
    }

    /// Reply to a mention, with commentary when it is confident enough and
    /// fits next to the link.
    ///
    /// Falls back to the plain reply, then to the bare link when the plain
    /// reply is over the character limit.
    #[must_use]
    pub fn mention_reply(&self, username: &str, cid: &str, commentary: Option<&Commentary>) -> String {
        if let Some(reply) = commentary
            .filter(|c| should_include_commentary(c))
            .and_then(|c| self.commentary_reply(username, &c.commentary, cid))
        {
            return reply;
        }

        let plain = self.plain_reply(username, cid);
        if plain.chars().count() <= self.char_limit {
            plain
        } else {
            self.short_reply(username, cid)
        }
    }

    /// `@user {link}`.
    #[must_use]
    pub fn short_reply(&self, username: &str, cid: &str) -> String {
        format!("@{username} {}", self.link(cid))
    }

    #[must_use]
    pub fn plain_reply(&self, username: &str, cid: &str) -> String {
        format!(
            "@{username} Here is the cid: {cid}, and it is accessible at {}",
            self.link(cid)
        )
    }

    /// `@user {commentary}\n\nArchived: {link}` within the character limit.
    ///
    /// The link is never shortened; the commentary gives way instead. `None`
    /// when too little room is left for meaningful commentary.
    #[must_use]
    pub fn commentary_reply(&self, username: &str, commentary: &str, cid: &str) -> Option<String> {
        let prefix = format!("@{username} ");
        let suffix = format!("\n\nArchived: {}", self.link(cid));
        let budget = self
            .char_limit
            .checked_sub(prefix.chars().count() + suffix.chars().count())?;
        if budget < MIN_COMMENTARY_CHARS {
            return None;
        }

        let body = sanitize_for_platform(commentary, budget);
        if body.is_empty() {
            return None;
        }
        Some(format!("{prefix}{body}{suffix}"))
    }

    #[must_use]
    pub fn dm_reply(&self, cid: &str) -> String {
        format!(
            "Here is the cid: {cid}, and it is accessible at {}",
            self.link(cid)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID: &str = "bafkr6ie7ppwbhwpbh4ubxvb3g6l4hl3fyozlyrmn3ej2xewwrjsnhjkmoi";

    fn composer() -> ReplyComposer {
        ReplyComposer::new(
            "https://astral.autonomys.xyz",
            StorageNetwork::Mainnet,
            280,
        )
    }

    fn commentary(text: &str, confidence: f64) -> Commentary {
        Commentary {
            commentary: text.to_string(),
            confidence,
            topics: vec![],
        }
    }

    #[test]
    fn test_archive_link() {
        assert_eq!(
            archive_link("https://astral.autonomys.xyz/", StorageNetwork::Taurus, "bafy1"),
            "https://astral.autonomys.xyz/taurus/permanent-storage/files/bafy1"
        );
    }

    #[test]
    fn test_plain_reply() {
        assert_eq!(
            composer().plain_reply("bob", "bafy1"),
            "@bob Here is the cid: bafy1, and it is accessible at https://astral.autonomys.xyz/mainnet/permanent-storage/files/bafy1"
        );
    }

    #[test]
    fn test_dm_reply() {
        assert_eq!(
            composer().dm_reply("bafy1"),
            "Here is the cid: bafy1, and it is accessible at https://astral.autonomys.xyz/mainnet/permanent-storage/files/bafy1"
        );
    }

    #[test]
    fn test_sanitize_short_text_only_collapses_whitespace() {
        assert_eq!(sanitize_for_platform("  a \n\n b\tc ", 280), "a b c");
    }

    #[test]
    fn test_sanitize_cuts_at_late_word_boundary() {
        let text = "word ".repeat(60);
        let out = sanitize_for_platform(&text, 280);
        assert!(out.chars().count() <= 280);
        assert!(out.ends_with("word..."));
    }

    #[test]
    fn test_sanitize_hard_truncates_without_late_space() {
        let text = "x".repeat(300);
        let out = sanitize_for_platform(&text, 280);
        assert_eq!(out.chars().count(), 280);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..277], &text[..277]);
    }

    #[test]
    fn test_sanitize_counts_chars_not_bytes() {
        let text = "é".repeat(50);
        assert_eq!(sanitize_for_platform(&text, 50), text);
        assert_eq!(sanitize_for_platform(&text, 10).chars().count(), 10);
    }

    #[test]
    fn test_commentary_threshold() {
        assert!(!should_include_commentary(&commentary("meh", 0.25)));
        assert!(!should_include_commentary(&commentary("meh", 0.3)));
        assert!(should_include_commentary(&commentary("good", 0.35)));
    }

    #[test]
    fn test_mention_reply_drops_low_confidence_commentary() {
        let c = commentary("A thread worth keeping", 0.25);
        assert_eq!(
            composer().mention_reply("bob", CID, Some(&c)),
            composer().plain_reply("bob", CID)
        );
    }

    #[test]
    fn test_mention_reply_includes_confident_commentary() {
        let c = commentary("A thread worth keeping", 0.35);
        let reply = composer().mention_reply("bob", CID, Some(&c));
        assert!(reply.starts_with("@bob A thread worth keeping\n\nArchived: "));
        assert!(reply.ends_with(&composer().link(CID)));
    }

    #[test]
    fn test_long_commentary_is_shortened_but_link_kept() {
        let c = commentary(&"archival ".repeat(60), 0.9);
        let reply = composer().mention_reply("bob", CID, Some(&c));

        assert!(reply.chars().count() <= 280);
        assert!(reply.ends_with(&format!("\n\nArchived: {}", composer().link(CID))));
        assert!(reply.contains("..."));
    }

    #[test]
    fn test_commentary_dropped_when_no_room() {
        let tight = ReplyComposer::new("https://astral.autonomys.xyz", StorageNetwork::Mainnet, 140);
        assert!(tight.commentary_reply("bob", "hello", CID).is_none());
        let c = commentary("hello there", 0.9);
        assert_eq!(
            tight.mention_reply("bob", CID, Some(&c)),
            format!("@bob {}", tight.link(CID))
        );
    }

    #[test]
    fn test_minimum_reply_limit() {
        assert_eq!(
            minimum_reply_limit("https://astral.autonomys.xyz", StorageNetwork::Mainnet),
            137
        );
        assert_eq!(
            minimum_reply_limit("https://astral.autonomys.xyz/", StorageNetwork::Taurus),
            136
        );
    }

    #[test]
    fn test_mention_reply_never_exceeds_limit() {
        let base = "https://astral.autonomys.xyz";
        let long = commentary(&"archival ".repeat(60), 0.9);
        let short = commentary("A thread worth keeping", 0.9);

        for network in [StorageNetwork::Mainnet, StorageNetwork::Taurus] {
            let minimum = minimum_reply_limit(base, network);
            for limit in minimum..=400 {
                let composer = ReplyComposer::new(base, network, limit);
                for username in ["bob", "some_long_user1"] {
                    for c in [None, Some(&long), Some(&short)] {
                        let reply = composer.mention_reply(username, CID, c);
                        assert!(
                            reply.chars().count() <= limit,
                            "{} chars at limit {limit}: {reply}",
                            reply.chars().count()
                        );
                        assert!(reply.ends_with(&composer.link(CID)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_plain_reply_kept_when_it_fits() {
        let plain = composer().plain_reply("some_long_user1", CID);
        assert!(plain.chars().count() <= 280);
        assert_eq!(composer().mention_reply("some_long_user1", CID, None), plain);
    }
}
