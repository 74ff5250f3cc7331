//! Authorization policy.
//!
//! Every privilege check goes through [`authorize`], which looks only at a
//! snapshot of the user's flags.

use crate::models::Capabilities;

/// Something a user may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Purchase,
    Administer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Neither the mailbox nor an administrator has vouched for the account.
    PendingVerification,
    NotAdmin,
}

impl DenyReason {
    /// Message shown to the client.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::PendingVerification => "Account pending verification",
            Self::NotAdmin => "Admin access required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether a user with `caps` may perform `action`.
#[must_use]
pub const fn authorize(caps: Capabilities, action: Action) -> Decision {
    match action {
        Action::Purchase if can_purchase(caps) => Decision::Allow,
        Action::Purchase => Decision::Deny(DenyReason::PendingVerification),
        Action::Administer if caps.is_admin => Decision::Allow,
        Action::Administer => Decision::Deny(DenyReason::NotAdmin),
    }
}

/// Admins, admin-approved and email-verified users may buy.
#[must_use]
pub const fn can_purchase(caps: Capabilities) -> bool {
    caps.is_admin || caps.is_admin_verified || caps.is_verified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(is_admin: bool, is_admin_verified: bool, is_verified: bool) -> Capabilities {
        Capabilities {
            is_admin,
            is_admin_verified,
            is_verified,
        }
    }

    #[test]
    fn test_can_purchase_truth_table() {
        for bits in 0u8..8 {
            let c = caps(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            assert_eq!(can_purchase(c), bits != 0, "flags {bits:03b}");
        }
    }

    #[test]
    fn test_purchase_denied_for_unverified() {
        assert_eq!(
            authorize(Capabilities::default(), Action::Purchase),
            Decision::Deny(DenyReason::PendingVerification)
        );
    }

    #[test]
    fn test_administer_requires_admin_flag() {
        // Approval alone does not make someone an admin.
        assert_eq!(
            authorize(caps(false, true, true), Action::Administer),
            Decision::Deny(DenyReason::NotAdmin)
        );
        assert!(authorize(caps(true, false, false), Action::Administer).is_allowed());
    }
}
