use serde::{Deserialize, Deserializer, Serialize};

/// A user record as held by the user directory.
///
/// The directory speaks `{ "id": .., "email": .., "password": "<phc hash>" }`; ids may
/// arrive as strings or numbers and are normalised to strings here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(rename = "password", alias = "passwordHash", alias = "password_hash", default)]
    pub password_hash: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self { id: id.into(), email: email.into(), password_hash: password_hash.into() }
    }

    /// Same identity: matching id and email. Hash rotation on the directory side does not change identity.
    pub fn same_identity(&self, other: &Principal) -> bool {
        self.id == other.id && self.email == other.email
    }
}

fn id_from_string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId { Str(String), Int(i64), Uint(u64) }
    Ok(match RawId::deserialize(de)? {
        RawId::Str(s) => s,
        RawId::Int(i) => i.to_string(),
        RawId::Uint(u) => u.to_string(),
    })
}
