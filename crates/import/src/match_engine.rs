use hackspace_core::{MatchedTransaction, MemberPaymentProfile, RawTransaction};

/// Links statement rows to members by payment reference.
///
/// A row matches a member when its description starts with the member's
/// payment reference, ignoring case. Profiles are tried in the order given
/// and the first hit wins; there is no scoring.
pub struct ReferenceMatcher<'a> {
    candidates: Vec<(String, &'a MemberPaymentProfile)>,
}

impl<'a> ReferenceMatcher<'a> {
    pub fn new(profiles: &'a [MemberPaymentProfile]) -> Self {
        let candidates = profiles
            .iter()
            .filter_map(|p| p.matchable_reference().map(|r| (r.to_lowercase(), p)))
            .collect();
        Self { candidates }
    }

    pub fn find_member(&self, description: &str) -> Option<&'a MemberPaymentProfile> {
        let description = description.to_lowercase();
        self.candidates
            .iter()
            .find(|(reference, _)| description.starts_with(reference.as_str()))
            .map(|(_, profile)| *profile)
    }

    pub fn match_transaction(&self, tx: RawTransaction) -> MatchedTransaction {
        match self.find_member(&tx.description) {
            Some(profile) => MatchedTransaction::auto(tx, profile),
            None => MatchedTransaction::unmatched(tx),
        }
    }
}

/// Pure: the same inputs always give the same output, in input order.
pub fn auto_match_transactions(
    transactions: Vec<RawTransaction>,
    profiles: &[MemberPaymentProfile],
) -> Vec<MatchedTransaction> {
    let matcher = ReferenceMatcher::new(profiles);
    transactions
        .into_iter()
        .map(|tx| matcher.match_transaction(tx))
        .collect()
}
