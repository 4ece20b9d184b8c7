//! Conversation list derived from message history.
//!
//! One row per counterpart the user has exchanged messages with, carrying the
//! most recent message and the number of unread messages from that
//! counterpart. Rows are recomputed on every call.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{message::Message, profile::Profile, profile::ProfileResolver};

/// Messages exchanged with one counterpart, before profile resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationGroup {
    pub counterpart: Uuid,
    pub last_message: Message,
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub participant: Profile,
    pub last_message: Message,
    pub unread_count: u32,
}

/// Group `messages` (all involving `me`) by counterpart.
///
/// The last message of a group is the one with the latest `created_at`; on a
/// tie the earlier entry in `messages` wins, so a newest-first input keeps its
/// own order. Unread counts only include messages sent by the counterpart to
/// `me`. Groups are returned newest first.
pub fn group_by_counterpart(me: &Uuid, messages: &[Message]) -> Vec<ConversationGroup> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut groups: Vec<ConversationGroup> = Vec::new();

    for msg in messages {
        let counterpart = msg.counterpart(me);
        let unread = u32::from(msg.sender_id == counterpart && msg.is_unread_for(me));
        match index.get(&counterpart) {
            Some(&i) => {
                let group = &mut groups[i];
                if msg.created_at > group.last_message.created_at {
                    group.last_message = msg.clone();
                }
                group.unread_count += unread;
            }
            None => {
                index.insert(counterpart, groups.len());
                groups.push(ConversationGroup {
                    counterpart,
                    last_message: msg.clone(),
                    unread_count: unread,
                });
            }
        }
    }

    // stable: equal timestamps keep first-seen order
    groups.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    groups
}

/// Build the conversation list for `me`, resolving each counterpart's profile.
///
/// Counterparts that resolve to neither a client nor an artisan (deleted
/// accounts) are left out.
pub fn summarize<R>(
    me: &Uuid,
    messages: &[Message],
    resolver: &R,
) -> anyhow::Result<Vec<ConversationSummary>>
where
    R: ProfileResolver + ?Sized,
{
    let mut out = Vec::new();
    for group in group_by_counterpart(me, messages) {
        match resolver.resolve(&group.counterpart)? {
            Some(participant) => out.push(ConversationSummary {
                participant,
                last_message: group.last_message,
                unread_count: group.unread_count,
            }),
            None => debug!(counterpart = %group.counterpart, "skipping conversation with unknown user"),
        }
    }
    Ok(out)
}
