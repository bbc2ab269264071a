//! Offset set validation.

use super::types::{OffsetList, OffsetRejection, ValidatedOffsets};

/// Check that a sorted offset list can describe an episode's chapters.
///
/// Two offsets (one theme) are always accepted. Four offsets (both themes)
/// must straddle the midpoint: one pair starting in each half.
pub fn validate_offsets(
    offsets: &OffsetList,
    duration_secs: f64,
) -> Result<ValidatedOffsets, OffsetRejection> {
    let half = duration_secs / 2.0;
    let values = offsets.as_slice();

    match values.len() {
        0 => Err(OffsetRejection::NoMatches),
        2 => Ok(ValidatedOffsets::new_unchecked(offsets.clone())),
        4 => {
            if values[0] > half && values[2] > half {
                Err(OffsetRejection::BothInSecondHalf)
            } else if values[0] < half && values[2] < half {
                Err(OffsetRejection::BothInFirstHalf)
            } else {
                Ok(ValidatedOffsets::new_unchecked(offsets.clone()))
            }
        }
        n => Err(OffsetRejection::WrongCount(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(offsets: &[f64], duration: f64) -> Result<ValidatedOffsets, OffsetRejection> {
        validate_offsets(&OffsetList::from_unsorted(offsets.to_vec()), duration)
    }

    #[test]
    fn empty_is_no_matches() {
        assert_eq!(check(&[], 1000.0), Err(OffsetRejection::NoMatches));
    }

    #[test]
    fn any_pair_is_valid() {
        assert!(check(&[100.0, 190.0], 1000.0).is_ok());
        assert!(check(&[900.0, 990.0], 1000.0).is_ok());
        assert!(check(&[0.0, 0.0], 1.0).is_ok());
    }

    #[test]
    fn both_pairs_in_first_half() {
        assert_eq!(
            check(&[100.0, 200.0, 300.0, 400.0], 1000.0),
            Err(OffsetRejection::BothInFirstHalf)
        );
    }

    #[test]
    fn both_pairs_in_second_half() {
        assert_eq!(
            check(&[600.0, 650.0, 700.0, 750.0], 1000.0),
            Err(OffsetRejection::BothInSecondHalf)
        );
    }

    #[test]
    fn straddling_pairs_are_valid() {
        let valid = check(&[100.0, 150.0, 700.0, 750.0], 1000.0).unwrap();
        assert_eq!(valid.as_slice(), &[100.0, 150.0, 700.0, 750.0]);
    }

    #[test]
    fn pair_starting_exactly_at_midpoint_is_valid() {
        assert!(check(&[100.0, 150.0, 500.0, 550.0], 1000.0).is_ok());
    }

    #[test]
    fn odd_counts_are_wrong() {
        assert_eq!(check(&[1.0, 2.0, 3.0], 1000.0), Err(OffsetRejection::WrongCount(3)));
        assert_eq!(
            check(&[1.0, 2.0, 3.0, 4.0, 5.0], 1000.0),
            Err(OffsetRejection::WrongCount(5))
        );
        assert_eq!(check(&[1.0], 1000.0), Err(OffsetRejection::WrongCount(1)));
    }
}
