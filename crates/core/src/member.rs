use serde::{Deserialize, Serialize};
use std::fmt;

/// Shortest payment reference that may take part in auto-matching.
pub const MIN_REFERENCE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The part of a member record that payment matching cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPaymentProfile {
    pub user_id: MemberId,
    pub user_name: String,
    pub payment_reference: Option<String>,
}

impl MemberPaymentProfile {
    pub fn new(user_id: MemberId, user_name: &str, payment_reference: Option<&str>) -> Self {
        MemberPaymentProfile {
            user_id,
            user_name: user_name.to_string(),
            payment_reference: payment_reference.map(str::to_string),
        }
    }

    /// The reference used for matching: trimmed, and only when long enough.
    pub fn matchable_reference(&self) -> Option<&str> {
        self.payment_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| r.chars().count() >= MIN_REFERENCE_LEN)
    }

    pub fn has_reference(&self) -> bool {
        self.payment_reference
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reference_is_not_matchable() {
        let p = MemberPaymentProfile::new(MemberId(1), "Shal", Some("SHAL"));
        assert!(p.has_reference());
        assert_eq!(p.matchable_reference(), None);
    }

    #[test]
    fn five_characters_is_enough() {
        let p = MemberPaymentProfile::new(MemberId(1), "Ada", Some(" ADA01 "));
        assert_eq!(p.matchable_reference(), Some("ADA01"));
    }

    #[test]
    fn blank_reference_counts_as_missing() {
        let p = MemberPaymentProfile::new(MemberId(1), "Ada", Some("   "));
        assert!(!p.has_reference());
        assert!(!MemberPaymentProfile::new(MemberId(2), "Bob", None).has_reference());
    }
}
