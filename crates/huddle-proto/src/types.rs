//! Domain records carried by channel events.
//!
//! Records are referenced by string identifiers assigned by the service. Users
//! are referenced by rooms and messages, never owned by them.

use std::{collections::HashSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a chat room.
    RoomId
);
string_id!(
    /// Identifier of a user account.
    UserId
);
string_id!(
    /// Identifier of a persisted chat message.
    MessageId
);
string_id!(
    /// Identifier of a call negotiation.
    CallId
);

/// A user account as seen by other participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUser")]
pub struct User {
    /// Stable user ID.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Avatar URL, if the user set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    /// Create a user without an avatar.
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self { id: id.into(), username: username.into(), avatar: None }
    }
}

/// The service sends both `id` and `_id` for users; either is accepted.
#[derive(Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default, rename = "_id")]
    legacy_id: Option<UserId>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    avatar: Option<String>,
}

impl TryFrom<RawUser> for User {
    type Error = String;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        let id = raw.id.or(raw.legacy_id).ok_or_else(|| "user record without id".to_string())?;
        Ok(Self { id, username: raw.username, avatar: raw.avatar })
    }
}

/// Room visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomKind {
    /// One-to-one conversation.
    #[serde(alias = "private")]
    Private,
    /// Multi-member conversation.
    #[serde(alias = "group")]
    Group,
}

/// Summary of the most recent message in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawLastMessage")]
pub struct LastMessage {
    /// Message text (or file name for attachments).
    pub content: String,
    /// Author of the message.
    pub sender_id: UserId,
    /// Creation time of the message.
    pub timestamp: DateTime<Utc>,
}

impl LastMessage {
    /// Summary of a full message.
    pub fn of(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender_id: message.sender.id.clone(),
            timestamp: message.created_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLastMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    sender_id: Option<UserId>,
    #[serde(default)]
    sender: Option<User>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawLastMessage> for LastMessage {
    type Error = String;

    fn try_from(raw: RawLastMessage) -> Result<Self, Self::Error> {
        let sender_id = raw
            .sender_id
            .or(raw.sender.map(|user| user.id))
            .ok_or_else(|| "last message without sender".to_string())?;
        Ok(Self { content: raw.content, sender_id, timestamp: raw.timestamp })
    }
}

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Stable room ID.
    #[serde(rename = "_id", alias = "id")]
    pub id: RoomId,
    /// Private or group room.
    #[serde(rename = "type", alias = "kind")]
    pub kind: RoomKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        rename = "participants",
        alias = "members",
        deserialize_with = "unique_users"
    )]
    members: Vec<User>,
    /// Most recent message. `None` for a room without messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
}

impl Room {
    /// Create an empty room.
    pub fn new(id: impl Into<RoomId>, kind: RoomKind, name: impl Into<String>) -> Self {
        Self { id: id.into(), kind, name: name.into(), members: Vec::new(), last_message: None }
    }

    /// Add a member. Members are unique by ID; a repeated ID is ignored.
    #[must_use]
    pub fn with_member(mut self, user: User) -> Self {
        self.add_member(user);
        self
    }

    /// Add a member unless a member with the same ID exists.
    pub fn add_member(&mut self, user: User) {
        if !self.has_member(&user.id) {
            self.members.push(user);
        }
    }

    /// Members in the order the service listed them.
    pub fn members(&self) -> &[User] {
        &self.members
    }

    /// Check if a user is a member of this room.
    pub fn has_member(&self, user_id: &UserId) -> bool {
        self.members.iter().any(|member| &member.id == user_id)
    }
}

fn unique_users<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<User>, D::Error> {
    let users = Vec::<User>::deserialize(deserializer)?;
    let mut seen = HashSet::new();
    Ok(users.into_iter().filter(|user| seen.insert(user.id.clone())).collect())
}

/// Content type of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    #[serde(alias = "text")]
    Text,
    /// Emoji-only message.
    #[serde(alias = "emoji")]
    Emoji,
    /// Image attachment.
    #[serde(alias = "image")]
    Image,
    /// Any other file attachment.
    #[serde(alias = "file")]
    File,
}

/// Attachment type announced when sending a file (`image` or `file`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// `image/*` MIME types.
    Image,
    /// Everything else.
    File,
}

impl AttachmentKind {
    /// Derive the attachment kind from a MIME type.
    pub fn for_mime(mime_type: &str) -> Self {
        let is_image = mime_type
            .split_once('/')
            .is_some_and(|(top, _)| top.trim().eq_ignore_ascii_case("image"));
        if is_image { Self::Image } else { Self::File }
    }
}

impl From<AttachmentKind> for MessageKind {
    fn from(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image => Self::Image,
            AttachmentKind::File => Self::File,
        }
    }
}

/// Uploaded file descriptor, as returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Download URL.
    pub url: String,
    /// Original file name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    #[serde(rename = "type", alias = "mimeType")]
    pub mime_type: String,
}

/// A chat message. Immutable once created by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMessage")]
pub struct Message {
    /// Stable message ID.
    #[serde(rename = "_id")]
    pub id: MessageId,
    /// Room the message belongs to.
    #[serde(rename = "chatroom")]
    pub room_id: RoomId,
    /// Author.
    pub sender: User,
    /// Text content (file name for attachments).
    pub content: String,
    /// Content type.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Attachment, for image and file messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
    /// Creation time assigned by the service.
    pub created_at: DateTime<Utc>,
}

/// Accepts both the nested `file` object and the flat `fileUrl`/`fileName`
/// fields older service versions send.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "_id", alias = "id")]
    id: MessageId,
    #[serde(rename = "chatroom", alias = "roomId")]
    room_id: RoomId,
    sender: User,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    file: Option<FileAttachment>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    file_mime_type: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RawMessage> for Message {
    type Error = String;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let file = match (raw.file, raw.file_url, raw.file_name) {
            (Some(file), _, _) => Some(file),
            (None, Some(url), Some(name)) => Some(FileAttachment {
                url,
                name,
                size: raw.file_size.unwrap_or_default(),
                mime_type: raw.file_mime_type.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            id: raw.id,
            room_id: raw.room_id,
            sender: raw.sender,
            content: raw.content,
            kind: raw.kind,
            file,
            created_at: raw.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn user_accepts_either_id_field() {
        let legacy: User =
            serde_json::from_value(json!({"_id": "u1", "username": "ana"})).unwrap();
        let canonical: User = serde_json::from_value(
            json!({"_id": "u1", "id": "u1", "username": "ana", "email": "a@x"}),
        )
        .unwrap();

        assert_eq!(legacy, canonical);
        assert_eq!(legacy.id.as_str(), "u1");
    }

    #[test]
    fn user_without_id_is_rejected() {
        let result = serde_json::from_value::<User>(json!({"username": "ghost"}));
        assert!(result.is_err());
    }

    #[test]
    fn room_members_are_unique_by_id() {
        let room: Room = serde_json::from_value(json!({
            "_id": "r1",
            "type": "GROUP",
            "name": "ops",
            "participants": [
                {"id": "u1", "username": "ana"},
                {"id": "u2", "username": "bo"},
                {"id": "u1", "username": "ana (dup)"},
            ],
        }))
        .unwrap();

        let ids: Vec<_> = room.members().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["u1", "u2"]);
        assert_eq!(room.kind, RoomKind::Group);
    }

    #[test]
    fn with_member_ignores_duplicates() {
        let room = Room::new("r1", RoomKind::Private, "dm")
            .with_member(User::new("u1", "ana"))
            .with_member(User::new("u1", "ana"));
        assert_eq!(room.members().len(), 1);
    }

    #[test]
    fn last_message_accepts_nested_sender() {
        let last: LastMessage = serde_json::from_value(json!({
            "content": "hi",
            "sender": {"id": "u2", "username": "bo"},
            "timestamp": "2024-05-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(last.sender_id.as_str(), "u2");
    }

    #[test]
    fn message_assembles_flat_file_fields() {
        let message: Message = serde_json::from_value(json!({
            "_id": "m1",
            "chatroom": "r1",
            "sender": {"id": "u1", "username": "ana"},
            "content": "cat.png",
            "type": "IMAGE",
            "fileUrl": "https://cdn/cat.png",
            "fileName": "cat.png",
            "fileSize": 2048,
            "fileMimeType": "image/png",
            "createdAt": "2024-05-01T10:00:00.000Z",
        }))
        .unwrap();

        assert_eq!(message.kind, MessageKind::Image);
        let file = message.file.unwrap();
        assert_eq!(file.size, 2048);
        assert_eq!(file.mime_type, "image/png");
    }

    #[test]
    fn message_kind_defaults_to_text() {
        let message: Message = serde_json::from_value(json!({
            "id": "m1",
            "roomId": "r1",
            "sender": {"id": "u1", "username": "ana"},
            "content": "hello",
            "createdAt": "2024-05-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(message.kind, MessageKind::Text);
        assert!(message.file.is_none());
    }

    #[test]
    fn attachment_kind_from_mime() {
        assert_eq!(AttachmentKind::for_mime("image/png"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::for_mime("IMAGE/jpeg"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::for_mime("application/pdf"), AttachmentKind::File);
        assert_eq!(AttachmentKind::for_mime("image"), AttachmentKind::File);
        assert_eq!(AttachmentKind::for_mime(""), AttachmentKind::File);
    }
}
