//! The admit/block decision rule.
//!
//! A pure function of the resolved image identity, the policy snapshot, and
//! the compatibility flag. Memoization per container id lives in the monitor;
//! this module holds no state.

use crate::identity::ImageIdentity;
use crate::policy::PolicyStore;

/// The admission decision for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The container may run.
    Allow,
    /// The container must be stopped or removed.
    Block,
}

/// Decide whether a container's image is admitted.
///
/// Rules, in order:
/// 1. a resolved digest registered in the policy admits (exact string match);
/// 2. no digest and no tag blocks unconditionally — absence of identity is an
///    integrity failure, not an unregistered image, so compatibility mode
///    does not apply;
/// 3. compatibility mode admits anything else;
/// 4. everything else blocks.
pub fn decide(identity: &ImageIdentity, policy: &PolicyStore, allow_unregistered: bool) -> Verdict {
    if let Some(digest) = &identity.digest {
        if policy.contains_digest(digest) {
            return Verdict::Allow;
        }
    }

    if identity.is_unresolved() {
        return Verdict::Block;
    }

    if allow_unregistered {
        return Verdict::Allow;
    }

    Verdict::Block
}
