//! Longest strictly increasing subsequence.

/// Positions in `values` forming a longest strictly increasing subsequence.
///
/// Patience sorting with predecessor links, `O(n log n)`. The returned
/// positions are ascending. When several subsequences share the maximum
/// length, the one ending in the smallest values is chosen.
///
/// ```rust
/// use sprig_core::list::longest_increasing_subsequence;
///
/// // 0 1 3 2 4 -> 0 1 2 4 (or 0 1 3 4), length 4
/// let lis = longest_increasing_subsequence(&[0, 1, 3, 2, 4]);
/// assert_eq!(lis.len(), 4);
/// ```
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    // tails[k] = position of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; values.len()];

    for (position, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&tail| values[tail] < value);
        if slot > 0 {
            predecessor[position] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }

    let mut sequence = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        sequence.push(position);
        cursor = predecessor[position];
    }
    sequence.reverse();
    sequence
}
