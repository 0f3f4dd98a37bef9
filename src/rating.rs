use crate::review::Score;

/// Computes a title's display rating: the arithmetic mean of the scores
/// of its current reviews.
///
/// A title nobody has reviewed has no rating, which is not the same as
/// a rating of zero.
///
/// ```
/// use reviewdb::rating::aggregate_rating;
/// assert_eq!(aggregate_rating(&[]), None);
/// assert_eq!(aggregate_rating(&[7, 8, 10]), Some(25.0 / 3.0));
/// ```
pub fn aggregate_rating(scores: &[Score]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }

    let total: i64 = scores.iter().map(|&score| i64::from(score)).sum();

    Some(total as f64 / scores.len() as f64)
}
