//! Identity and session management: credential verification, session records,
//! principal (de)serialization and the per-request access guard.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod directory;
mod verifier;
mod session;
mod serializer;
mod request_context;
mod guard;

pub use principal::Principal;
pub use directory::{DirectoryError, DirectoryHandle, HttpUserDirectory, MemoryDirectory, UserDirectory};
pub use verifier::{Argon2Check, AuthOutcome, DirectoryVerifier, IdentityVerifier, PasswordCheck, INVALID_CREDENTIALS};
pub use session::{gen_session_id, is_well_formed_id, SessionId, SessionRecord, SessionStore, SessionStoreError, PRINCIPAL_KEY};
pub use serializer::PrincipalSerializer;
pub use request_context::{AccessDenied, AuthState, RequestContext};
pub use guard::{AccessGuard, GuardedRequest, LoginOutcome, MISSING_CREDENTIALS};
