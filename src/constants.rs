//! Shared constants used across the application.

/// User agent string sent with API and media requests.
pub const BOT_USER_AGENT: &str = concat!("tweet-archive-bot/", env!("CARGO_PKG_VERSION"));

/// Commentary at or below this confidence is left out of replies.
pub const COMMENTARY_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Reply used for DMs that do not ask for an archive.
pub const DM_ACKNOWLEDGEMENT: &str =
    "Thanks for your message! Send me a link to a post and I'll archive it to permanent storage.";

/// Reply used when a DM points at a post that cannot be fetched.
pub const DM_POST_NOT_FOUND: &str =
    "Sorry, I couldn't find that post. It may have been deleted or be private.";
