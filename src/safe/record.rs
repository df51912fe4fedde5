//! Password records and the field masks used to select columns.
//!
//! On disk a record is a `StoredRecord`: its uuid and timestamps in the
//! clear, every text field encrypted together in one payload.  In memory
//! it is a decrypted `Record` whose text is wiped on drop.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::format::{base64_decode, base64_encode};

/// An exportable record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Group,
    Title,
    Username,
    Password,
    Url,
    CreatedAt,
    ModifiedAt,
    Uuid,
    Notes,
}

impl RecordField {
    /// Every field, in export column order.
    pub const ALL: [RecordField; 9] = [
        RecordField::Group,
        RecordField::Title,
        RecordField::Username,
        RecordField::Password,
        RecordField::Url,
        RecordField::CreatedAt,
        RecordField::ModifiedAt,
        RecordField::Uuid,
        RecordField::Notes,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Column name used in text exports.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Group => "Group",
            Self::Title => "Title",
            Self::Username => "Username",
            Self::Password => "Password",
            Self::Url => "URL",
            Self::CreatedAt => "Created",
            Self::ModifiedAt => "Modified",
            Self::Uuid => "UUID",
            Self::Notes => "Notes",
        }
    }

    /// Element name used in XML exports.
    pub fn xml_tag(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Title => "title",
            Self::Username => "username",
            Self::Password => "password",
            Self::Url => "url",
            Self::CreatedAt => "ctime",
            Self::ModifiedAt => "mtime",
            Self::Uuid => "uuid",
            Self::Notes => "notes",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column_name() == name)
    }

    pub fn from_xml_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.xml_tag() == tag)
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A set of record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMask(u16);

impl FieldMask {
    /// Every field.
    pub fn all() -> Self {
        RecordField::ALL.into_iter().fold(Self::none(), Self::with)
    }

    pub fn none() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn with(self, field: RecordField) -> Self {
        Self(self.0 | field.bit())
    }

    #[must_use]
    pub fn without(self, field: RecordField) -> Self {
        Self(self.0 & !field.bit())
    }

    pub fn contains(self, field: RecordField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Selected fields in export column order.
    pub fn fields(self) -> impl Iterator<Item = RecordField> {
        RecordField::ALL
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl Default for FieldMask {
    fn default() -> Self {
        Self::all()
    }
}

/// A decrypted password record.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Record {
    #[zeroize(skip)]
    pub uuid: Uuid,
    pub group: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub modified_at: DateTime<Utc>,
}

impl Record {
    /// A new record with a fresh uuid and the current time.
    pub fn new(title: &str, password: &str) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            group: String::new(),
            title: title.to_string(),
            username: String::new(),
            password: password.to_string(),
            url: String::new(),
            notes: String::new(),
            created_at: now,
            modified_at: now,
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    /// Identity used to detect duplicates on import.
    pub fn merge_key(&self) -> (&str, &str, &str) {
        (&self.group, &self.title, &self.username)
    }

    /// Text value of one field.  Timestamps are RFC 3339 in UTC.
    pub fn field(&self, field: RecordField) -> Cow<'_, str> {
        match field {
            RecordField::Group => Cow::Borrowed(self.group.as_str()),
            RecordField::Title => Cow::Borrowed(self.title.as_str()),
            RecordField::Username => Cow::Borrowed(self.username.as_str()),
            RecordField::Password => Cow::Borrowed(self.password.as_str()),
            RecordField::Url => Cow::Borrowed(self.url.as_str()),
            RecordField::Notes => Cow::Borrowed(self.notes.as_str()),
            RecordField::CreatedAt => {
                Cow::Owned(self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            RecordField::ModifiedAt => {
                Cow::Owned(self.modified_at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            RecordField::Uuid => Cow::Owned(self.uuid.to_string()),
        }
    }

    pub(crate) fn payload(&self) -> RecordPayload<'_> {
        RecordPayload {
            group: Cow::Borrowed(self.group.as_str()),
            title: Cow::Borrowed(self.title.as_str()),
            username: Cow::Borrowed(self.username.as_str()),
            password: Cow::Borrowed(self.password.as_str()),
            url: Cow::Borrowed(self.url.as_str()),
            notes: Cow::Borrowed(self.notes.as_str()),
        }
    }

    pub(crate) fn from_payload(stored: &StoredRecord, payload: RecordPayload<'_>) -> Self {
        Self {
            uuid: stored.uuid,
            group: payload.group.into_owned(),
            title: payload.title.into_owned(),
            username: payload.username.into_owned(),
            password: payload.password.into_owned(),
            url: payload.url.into_owned(),
            notes: payload.notes.into_owned(),
            created_at: stored.created_at,
            modified_at: stored.modified_at,
        }
    }
}

/// The encrypted part of a record, serialized as JSON before encryption.
#[derive(Serialize, Deserialize)]
pub(crate) struct RecordPayload<'a> {
    #[serde(borrow)]
    pub group: Cow<'a, str>,
    #[serde(borrow)]
    pub title: Cow<'a, str>,
    #[serde(borrow)]
    pub username: Cow<'a, str>,
    #[serde(borrow)]
    pub password: Cow<'a, str>,
    #[serde(borrow)]
    pub url: Cow<'a, str>,
    #[serde(borrow)]
    pub notes: Cow<'a, str>,
}

/// A record as stored in the safe file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub uuid: Uuid,

    /// Nonce + ciphertext of the record payload, base64 in JSON.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub payload: Vec<u8>,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}
