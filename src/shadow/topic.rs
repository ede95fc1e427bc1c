//! Shadow topic names.

use core::fmt::Write;

use heapless::String;

use super::config::MAX_SHADOW_TOPIC_LEN;
use super::error::Error;
use super::ShadowAction;

/// A shadow topic name.
pub type Topic = String<MAX_SHADOW_TOPIC_LEN>;

/// Which topic of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AckKind {
    Accepted,
    Rejected,
}

fn build(args: core::fmt::Arguments<'_>) -> Result<Topic, Error> {
    let mut topic = Topic::new();
    topic.write_fmt(args).map_err(|_| Error::InvalidArgument)?;
    Ok(topic)
}

/// `things/<thing>/shadow/<action>`
pub fn action_topic(thing: &str, action: ShadowAction) -> Result<Topic, Error> {
    build(format_args!("things/{}/shadow/{}", thing, action.as_str()))
}

pub(super) fn ack_topic(thing: &str, action: ShadowAction, kind: AckKind) -> Result<Topic, Error> {
    let suffix = match kind {
        AckKind::Accepted => "accepted",
        AckKind::Rejected => "rejected",
    };
    build(format_args!("things/{}/shadow/{}/{}", thing, action.as_str(), suffix))
}

/// `things/<thing>/shadow/update/delta`
pub fn delta_topic(thing: &str) -> Result<Topic, Error> {
    build(format_args!("things/{}/shadow/update/delta", thing))
}

/// The `<thing>` segment of a `things/<thing>/...` topic.
fn thing_of(topic: &str) -> Option<&str> {
    topic
        .strip_prefix("things/")?
        .split_once('/')
        .map(|(thing, _)| thing)
}

/// Whether `topic` is an accepted or a rejected response, judged by its last level.
pub(super) fn ack_kind(topic: &str) -> Option<AckKind> {
    match topic.rsplit('/').next() {
        Some("accepted") => Some(AckKind::Accepted),
        Some("rejected") => Some(AckKind::Rejected),
        _ => None,
    }
}

/// Whether a response on `topic` carries a version that gates deltas: a
/// `get/accepted` or a delta for the local thing.
pub(super) fn carries_version(topic: &str, thing: &str) -> bool {
    thing_of(topic) == Some(thing)
        && (topic.ends_with("/shadow/get/accepted") || topic.ends_with("/shadow/update/delta"))
}
