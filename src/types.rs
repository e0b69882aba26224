//! Core types shared by the realtime components.

use crate::subscriptions::ScopeKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a backend entity.
///
/// Backends send ids either as strings or as integers; both normalize to the
/// decimal string form so `"42"` and `42` name the same entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "WireId")]
pub struct EntityId(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<WireId> for EntityId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(s) => EntityId(s),
            WireId::Signed(n) => EntityId(n.to_string()),
            WireId::Unsigned(n) => EntityId(n.to_string()),
        }
    }
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

impl From<u64> for EntityId {
    fn from(n: u64) -> Self {
        EntityId(n.to_string())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What happened to the entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    #[serde(alias = "INSERT", alias = "insert", alias = "inserted")]
    Inserted,
    #[serde(alias = "UPDATE", alias = "update", alias = "updated")]
    Updated,
    #[serde(alias = "DELETE", alias = "delete", alias = "deleted")]
    Deleted,
}

/// Entity kinds the backend streams.
///
/// The set is closed: names outside it are unroutable and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Post,
    Reply,
    Vote,
}

impl EntityType {
    /// Classify a backend entity or table name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "post" | "posts" => Some(EntityType::Post),
            "reply" | "replies" => Some(EntityType::Reply),
            "vote" | "votes" => Some(EntityType::Vote),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Post => "post",
            EntityType::Reply => "reply",
            EntityType::Vote => "vote",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public profile of the user behind a change, when the backend embeds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(alias = "displayName", alias = "username")]
    pub display_name: String,
    #[serde(default, alias = "avatarUrl", alias = "avatar")]
    pub avatar_url: Option<String>,
}

/// A forum post (the head of a discussion thread).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "categoryId")]
    pub category_id: Option<EntityId>,
    #[serde(default, alias = "authorId")]
    pub author_id: Option<EntityId>,
    #[serde(default)]
    pub author: Option<Author>,
}

/// A reply inside a thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: EntityId,
    #[serde(alias = "postId")]
    pub post_id: EntityId,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "categoryId")]
    pub category_id: Option<EntityId>,
    #[serde(default, alias = "authorId")]
    pub author_id: Option<EntityId>,
    #[serde(default)]
    pub author: Option<Author>,
}

/// A vote on a post or a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: EntityId,
    #[serde(default, alias = "postId")]
    pub post_id: Option<EntityId>,
    #[serde(default, alias = "replyId")]
    pub reply_id: Option<EntityId>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<EntityId>,
    /// Positive for an upvote, negative for a downvote.
    #[serde(default = "default_vote_value", alias = "voteValue")]
    pub value: i32,
    #[serde(default, alias = "categoryId")]
    pub category_id: Option<EntityId>,
    #[serde(default)]
    pub author: Option<Author>,
}

fn default_vote_value() -> i32 {
    1
}

impl Vote {
    pub fn is_upvote(&self) -> bool {
        self.value >= 0
    }
}

/// Accessors the scope filter needs from a streamed record.
pub trait Scoped {
    /// Thread the record belongs to (the post id for posts themselves).
    fn thread_id(&self) -> Option<&EntityId>;

    /// Category the record's post belongs to, when known.
    fn category_id(&self) -> Option<&EntityId>;
}

impl Scoped for Post {
    fn thread_id(&self) -> Option<&EntityId> {
        Some(&self.id)
    }

    fn category_id(&self) -> Option<&EntityId> {
        self.category_id.as_ref()
    }
}

impl Scoped for Reply {
    fn thread_id(&self) -> Option<&EntityId> {
        Some(&self.post_id)
    }

    fn category_id(&self) -> Option<&EntityId> {
        self.category_id.as_ref()
    }
}

impl Scoped for Vote {
    fn thread_id(&self) -> Option<&EntityId> {
        self.post_id.as_ref()
    }

    fn category_id(&self) -> Option<&EntityId> {
        self.category_id.as_ref()
    }
}

/// A single mutation of a backend entity, as delivered to handlers.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent<T> {
    pub mutation_kind: MutationKind,
    pub entity_type: EntityType,
    /// Current payload. For deletions this is the last known state.
    pub record: T,
    /// Prior payload, when the backend sent one that decoded.
    pub previous_record: Option<T>,
    /// Assigned at ingestion; never taken from the network.
    pub received_at: Timestamp,
    /// Scope whose channel carried this event.
    pub scope: ScopeKey,
}
