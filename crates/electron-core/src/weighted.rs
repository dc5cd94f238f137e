//! Weighted choice by cumulative draw.

/// Pick the first label whose cumulative weight exceeds `draw`.
///
/// `draw` is expected in `[0, 1)`. Labels and weights are paired by index;
/// extra entries on either side are ignored. Returns `None` when `draw`
/// lands at or beyond the total weight, which only happens when the
/// weights sum to less than one.
pub fn choose<'a, T>(labels: &'a [T], weights: &[f64], draw: f64) -> Option<&'a T> {
    let mut cumulative = 0.0;
    for (label, weight) in labels.iter().zip(weights) {
        cumulative += weight;
        if draw < cumulative {
            return Some(label);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAVES: [&str; 4] = ["sine", "square", "triangle", "sawtooth"];
    const WEIGHTS: [f64; 4] = [0.4, 0.2, 0.2, 0.2];

    #[test]
    fn picks_bucket_by_cumulative_weight() {
        assert_eq!(choose(&WAVES, &WEIGHTS, 0.0), Some(&"sine"));
        assert_eq!(choose(&WAVES, &WEIGHTS, 0.39), Some(&"sine"));
        assert_eq!(choose(&WAVES, &WEIGHTS, 0.4), Some(&"square"));
        assert_eq!(choose(&WAVES, &WEIGHTS, 0.7), Some(&"triangle"));
        assert_eq!(choose(&WAVES, &WEIGHTS, 0.99), Some(&"sawtooth"));
    }

    #[test]
    fn draw_past_total_weight_picks_nothing() {
        assert_eq!(choose(&WAVES, &[0.1, 0.1, 0.1, 0.1], 0.5), None);
    }

    #[test]
    fn zero_weight_is_never_chosen() {
        let labels = ["a", "b"];
        assert_eq!(choose(&labels, &[0.0, 1.0], 0.0), Some(&"b"));
    }

    #[test]
    fn empty_table() {
        let labels: [&str; 0] = [];
        assert_eq!(choose(&labels, &[], 0.2), None);
    }
}
