use super::directory::{DirectoryError, DirectoryHandle};
use super::principal::Principal;

/// Converts between a principal and the id stored in the session payload.
#[derive(Clone)]
pub struct PrincipalSerializer {
    directory: DirectoryHandle,
}

impl PrincipalSerializer {
    pub fn new(directory: DirectoryHandle) -> Self { Self { directory } }

    pub fn serialize(&self, principal: &Principal) -> String {
        principal.id.clone()
    }

    /// `Ok(None)` when the directory no longer knows the id.
    pub async fn deserialize(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        self.directory.find_by_id(id).await
    }
}
