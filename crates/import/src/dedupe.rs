use std::collections::HashSet;

use hackspace_core::{DateRange, MatchedTransaction, TransactionSignature};

/// The inclusive window of already-persisted rows worth comparing against:
/// the earliest to the latest date in the new batch.
pub fn scan_range(transactions: &[MatchedTransaction]) -> Option<DateRange> {
    DateRange::spanning(transactions.iter().map(|t| t.transaction.transaction_date))
}

/// Flags every incoming row whose exact (date, description, amount) is
/// already persisted, or repeats an earlier row of the same batch. Only the
/// first copy of a signature can ever be stored. Returns the number flagged.
pub fn mark_duplicates<I>(transactions: &mut [MatchedTransaction], existing: I) -> usize
where
    I: IntoIterator<Item = TransactionSignature>,
{
    let mut seen: HashSet<TransactionSignature> = existing.into_iter().collect();
    let mut flagged = 0;
    for tx in transactions.iter_mut() {
        tx.is_duplicate = !seen.insert(tx.signature());
        if tx.is_duplicate {
            flagged += 1;
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hackspace_core::{Money, RawTransaction};
    use std::collections::BTreeMap;

    fn tx(day: u32, desc: &str, cents: i64) -> MatchedTransaction {
        MatchedTransaction::unmatched(RawTransaction {
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            description: desc.to_string(),
            amount: Money::from_cents(cents),
            reference: None,
            balance: None,
            raw_data: BTreeMap::new(),
        })
    }

    #[test]
    fn exact_signature_is_duplicate() {
        let existing = vec![tx(25, "ADA01 SUBS", 2500).signature()];
        let mut batch = vec![tx(25, "ADA01 SUBS", 2500), tx(26, "ADA01 SUBS", 2500)];
        assert_eq!(mark_duplicates(&mut batch, existing), 1);
        assert!(batch[0].is_duplicate);
        assert!(!batch[1].is_duplicate);
    }

    #[test]
    fn any_field_difference_is_not_duplicate() {
        let existing = vec![tx(25, "ADA01 SUBS", 2500).signature()];
        let mut batch = vec![
            tx(25, "ADA01 SUBS", 2501),
            tx(25, "ADA01 SUBS ", 2500),
            tx(24, "ADA01 SUBS", 2500),
        ];
        assert_eq!(mark_duplicates(&mut batch, existing), 0);
        assert!(batch.iter().all(|t| !t.is_duplicate));
    }

    #[test]
    fn repeat_within_batch_keeps_first_copy() {
        let mut batch = vec![
            tx(25, "ADA01 SUBS", 2500),
            tx(25, "ADA01 SUBS", 2500),
            tx(25, "ADA01 SUBS", 2500),
        ];
        assert_eq!(mark_duplicates(&mut batch, Vec::new()), 2);
        let flags: Vec<_> = batch.iter().map(|t| t.is_duplicate).collect();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn scan_range_covers_batch() {
        let batch = vec![tx(20, "A", 1), tx(3, "B", 1), tx(11, "C", 1)];
        let range = scan_range(&batch).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 1, 20).unwrap());
    }

    #[test]
    fn single_day_range_is_inclusive() {
        let batch = vec![tx(5, "A", 1), tx(5, "B", 2)];
        let range = scan_range(&batch).unwrap();
        assert!(range.is_single_day());
        assert!(range.contains(batch[0].transaction.transaction_date));
    }

    #[test]
    fn empty_batch_has_no_range() {
        assert!(scan_range(&[]).is_none());
    }
}
