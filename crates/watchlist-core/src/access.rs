//! Ownership and visibility checks.
//!
//! Callers resolve the resource first and only then ask for a decision, so a
//! missing resource is always reported as not found rather than forbidden.

use crate::error::{WatchlistError, WatchlistResult};
use crate::models::Watchlist;

/// Anything whose access is decided by an owner and a visibility flag.
/// Notes and items are checked through their parent watchlist.
pub trait Guarded {
    fn owner_id(&self) -> &str;
    fn is_public(&self) -> bool;
}

impl Guarded for Watchlist {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn is_public(&self) -> bool {
        self.is_public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
}

pub fn is_permitted<R: Guarded + ?Sized>(
    resource: &R,
    requester: Option<&str>,
    capability: Capability,
) -> bool {
    let is_owner = requester.is_some_and(|r| r == resource.owner_id());
    match capability {
        Capability::Read => is_owner || resource.is_public(),
        Capability::Write => is_owner,
    }
}

pub fn ensure_readable<R: Guarded + ?Sized>(
    resource: &R,
    requester: Option<&str>,
) -> WatchlistResult<()> {
    if is_permitted(resource, requester, Capability::Read) {
        Ok(())
    } else {
        tracing::debug!(requester = ?requester, "Read denied on private resource");
        Err(WatchlistError::forbidden("This watchlist is private"))
    }
}

pub fn ensure_writable<R: Guarded + ?Sized>(resource: &R, requester: &str) -> WatchlistResult<()> {
    if is_permitted(resource, Some(requester), Capability::Write) {
        Ok(())
    } else {
        tracing::warn!(requester, owner = resource.owner_id(), "Write denied: not the owner");
        Err(WatchlistError::forbidden(
            "Only the owner can modify this watchlist",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Res {
        owner: &'static str,
        public: bool,
    }

    impl Guarded for Res {
        fn owner_id(&self) -> &str {
            self.owner
        }

        fn is_public(&self) -> bool {
            self.public
        }
    }

    #[test]
    fn test_owner_reads_and_writes_any_visibility() {
        for public in [true, false] {
            let res = Res { owner: "alice", public };
            assert!(is_permitted(&res, Some("alice"), Capability::Read));
            assert!(is_permitted(&res, Some("alice"), Capability::Write));
        }
    }

    #[test]
    fn test_others_read_only_public() {
        let public = Res { owner: "alice", public: true };
        let private = Res { owner: "alice", public: false };

        assert!(is_permitted(&public, Some("bob"), Capability::Read));
        assert!(is_permitted(&public, None, Capability::Read));
        assert!(!is_permitted(&private, Some("bob"), Capability::Read));
        assert!(!is_permitted(&private, None, Capability::Read));
    }

    #[test]
    fn test_nobody_else_writes() {
        let public = Res { owner: "alice", public: true };
        assert!(!is_permitted(&public, Some("bob"), Capability::Write));
        assert!(!is_permitted(&public, None, Capability::Write));
        assert!(ensure_writable(&public, "bob").is_err());
        assert!(ensure_readable(&public, None).is_ok());
    }
}
