//! Turning change events into notification records.

use super::types::{Actor, NotificationId, NotificationKind, NotificationRecord, Target};
use crate::types::{Author, ChangeEvent, EntityId, EntityType, MutationKind, Post, Reply, Vote};
use std::sync::atomic::{AtomicU64, Ordering};

/// Longest excerpt of reply text put into a message, in characters.
const EXCERPT_CHARS: usize = 80;

/// Builds notification records and assigns their ids.
///
/// Ids combine the source entity with a monotonic counter, so the same
/// change delivered twice yields two distinct records.
#[derive(Debug, Default)]
pub struct NotificationBuilder {
    counter: AtomicU64,
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// New and edited posts. Deletions produce nothing.
    pub fn from_post(&self, event: &ChangeEvent<Post>) -> Option<NotificationRecord> {
        let post = &event.record;
        let actor = post.author.as_ref().map(actor);

        let (kind, title, message) = match event.mutation_kind {
            MutationKind::Inserted => {
                let message = match &actor {
                    Some(actor) => format!("{} started \"{}\"", actor.display_name, post.title),
                    None => format!("New thread: \"{}\"", post.title),
                };
                (NotificationKind::NewPost, "New post", message)
            }
            MutationKind::Updated => {
                let message = match &event.previous_record {
                    Some(previous) if previous.title != post.title => {
                        format!("\"{}\" was renamed to \"{}\"", previous.title, post.title)
                    }
                    _ => format!("\"{}\" was edited", post.title),
                };
                (NotificationKind::UpdatedPost, "Post updated", message)
            }
            MutationKind::Deleted => return None,
        };

        let record = NotificationRecord::new(
            self.next_id(EntityType::Post, &post.id),
            kind,
            title,
            message,
            event.received_at,
        )
        .with_target(Target {
            entity_type: EntityType::Post,
            id: post.id.clone(),
        });

        Some(with_actor(record, actor))
    }

    /// New replies only.
    pub fn from_reply(&self, event: &ChangeEvent<Reply>) -> Option<NotificationRecord> {
        if event.mutation_kind != MutationKind::Inserted {
            return None;
        }

        let reply = &event.record;
        let actor = reply.author.as_ref().map(actor);
        let text = excerpt(&reply.content);

        let message = match (&actor, text.is_empty()) {
            (Some(actor), false) => format!("{} replied: {}", actor.display_name, text),
            (Some(actor), true) => format!("{} replied to a thread", actor.display_name),
            (None, false) => format!("New reply: {}", text),
            (None, true) => "Someone replied to a thread".to_string(),
        };

        let record = NotificationRecord::new(
            self.next_id(EntityType::Reply, &reply.id),
            NotificationKind::NewReply,
            "New reply",
            message,
            event.received_at,
        )
        .with_target(Target {
            entity_type: EntityType::Post,
            id: reply.post_id.clone(),
        });

        Some(with_actor(record, actor))
    }

    /// New or changed votes. Retracted votes produce nothing.
    pub fn from_vote(&self, event: &ChangeEvent<Vote>) -> Option<NotificationRecord> {
        if event.mutation_kind == MutationKind::Deleted {
            return None;
        }

        let vote = &event.record;
        let actor = vote.author.as_ref().map(actor);
        let verb = if vote.is_upvote() { "upvoted" } else { "downvoted" };

        let target = match (&vote.post_id, &vote.reply_id) {
            (Some(post), _) => Some(Target {
                entity_type: EntityType::Post,
                id: post.clone(),
            }),
            (None, Some(reply)) => Some(Target {
                entity_type: EntityType::Reply,
                id: reply.clone(),
            }),
            (None, None) => None,
        };
        let subject = if vote.reply_id.is_some() { "a reply" } else { "a post" };
        let who = actor
            .as_ref()
            .map(|a| a.display_name.as_str())
            .unwrap_or("Someone");

        let mut record = NotificationRecord::new(
            self.next_id(EntityType::Vote, &vote.id),
            NotificationKind::Vote,
            "New vote",
            format!("{who} {verb} {subject}"),
            event.received_at,
        );
        record.target = target;

        Some(with_actor(record, actor))
    }

    fn next_id(&self, entity: EntityType, source: &EntityId) -> NotificationId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        NotificationId(format!("{entity}-{source}-{n}"))
    }
}

fn actor(author: &Author) -> Actor {
    Actor {
        display_name: author.display_name.clone(),
        avatar_ref: author.avatar_url.clone(),
    }
}

fn with_actor(record: NotificationRecord, actor: Option<Actor>) -> NotificationRecord {
    match actor {
        Some(actor) => record.with_actor(actor),
        None => record,
    }
}

/// Whitespace-collapsed text, cut at `EXCERPT_CHARS` characters.
fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(EXCERPT_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::ScopeKey;
    use crate::types::Timestamp;

    fn event<T>(mutation_kind: MutationKind, entity_type: EntityType, record: T) -> ChangeEvent<T> {
        ChangeEvent {
            mutation_kind,
            entity_type,
            record,
            previous_record: None,
            received_at: Timestamp(1_000),
            scope: ScopeKey::Global,
        }
    }

    fn post(title: &str) -> Post {
        Post {
            id: "42".into(),
            title: title.into(),
            content: String::new(),
            category_id: None,
            author_id: None,
            author: Some(Author {
                display_name: "ada".into(),
                avatar_url: Some("avatars/ada.png".into()),
            }),
        }
    }

    fn reply(content: &str) -> Reply {
        Reply {
            id: "7".into(),
            post_id: "42".into(),
            content: content.into(),
            category_id: None,
            author_id: None,
            author: None,
        }
    }

    #[test]
    fn test_new_post() {
        let builder = NotificationBuilder::new();
        let record = builder
            .from_post(&event(MutationKind::Inserted, EntityType::Post, post("Rust 2024")))
            .unwrap();

        assert_eq!(record.kind, NotificationKind::NewPost);
        assert_eq!(record.message, "ada started \"Rust 2024\"");
        assert_eq!(record.timestamp, Timestamp(1_000));
        assert_eq!(record.target.as_ref().unwrap().id.as_str(), "42");
        assert_eq!(record.actor.as_ref().unwrap().avatar_ref.as_deref(), Some("avatars/ada.png"));
        assert!(!record.is_read());
    }

    #[test]
    fn test_renamed_post_mentions_both_titles() {
        let builder = NotificationBuilder::new();
        let mut change = event(MutationKind::Updated, EntityType::Post, post("new"));
        change.previous_record = Some(post("old"));

        let record = builder.from_post(&change).unwrap();
        assert_eq!(record.kind, NotificationKind::UpdatedPost);
        assert_eq!(record.message, "\"old\" was renamed to \"new\"");
    }

    #[test]
    fn test_deleted_post_yields_nothing() {
        let builder = NotificationBuilder::new();
        assert!(builder
            .from_post(&event(MutationKind::Deleted, EntityType::Post, post("x")))
            .is_none());
    }

    #[test]
    fn test_reply_targets_thread() {
        let builder = NotificationBuilder::new();
        let record = builder
            .from_reply(&event(MutationKind::Inserted, EntityType::Reply, reply("  hello \n world ")))
            .unwrap();

        assert_eq!(record.message, "New reply: hello world");
        let target = record.target.unwrap();
        assert_eq!(target.entity_type, EntityType::Post);
        assert_eq!(target.id.as_str(), "42");
        assert!(builder
            .from_reply(&event(MutationKind::Updated, EntityType::Reply, reply("x")))
            .is_none());
    }

    #[test]
    fn test_long_reply_is_cut_on_char_boundary() {
        let builder = NotificationBuilder::new();
        let text = "é".repeat(200);
        let record = builder
            .from_reply(&event(MutationKind::Inserted, EntityType::Reply, reply(&text)))
            .unwrap();

        let body = record.message.trim_start_matches("New reply: ");
        assert_eq!(body.chars().count(), EXCERPT_CHARS + 1);
        assert!(body.ends_with('…'));
    }

    #[test]
    fn test_vote_wording() {
        let builder = NotificationBuilder::new();
        let vote = Vote {
            id: "v1".into(),
            post_id: None,
            reply_id: Some("7".into()),
            user_id: None,
            value: -1,
            category_id: None,
            author: None,
        };

        let record = builder
            .from_vote(&event(MutationKind::Inserted, EntityType::Vote, vote))
            .unwrap();
        assert_eq!(record.message, "Someone downvoted a reply");
        assert_eq!(record.target.unwrap().entity_type, EntityType::Reply);
    }

    #[test]
    fn test_duplicate_delivery_gets_distinct_ids() {
        let builder = NotificationBuilder::new();
        let change = event(MutationKind::Inserted, EntityType::Post, post("dup"));

        let first = builder.from_post(&change).unwrap();
        let second = builder.from_post(&change).unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id.as_str().starts_with("post-42-"));
    }
}
