//! Decide what a direct message is asking for.

use url::Url;

use crate::twitter::DirectMessage;

/// Id of the post a DM asks to archive, if it is an archive request.
///
/// A DM is an archive request when its first attached URL points at a
/// status; the post id is that URL's last path segment.
#[must_use]
pub fn interpret_dm(message: &DirectMessage) -> Option<String> {
    message.media_urls.first().and_then(|url| status_id(url))
}

/// Last path segment of a status URL, ignoring query string and fragment.
#[must_use]
pub fn status_id(url: &str) -> Option<String> {
    if !url.contains("status") {
        return None;
    }

    // Relative or malformed links still get a best-effort split.
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
}
