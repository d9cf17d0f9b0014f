/// Levenshtein distance, or the restricted Damerau (optimal string
/// alignment) distance when `transpositions` is set
pub fn edit_distance(a: &[u8], b: &[u8], transpositions: bool) -> usize {
    let len_a = a.len();
    let len_b = b.len();

    if len_a == 0 {
        return len_b;
    }
    if len_b == 0 {
        return len_a;
    }

    let mut prev_prev_row: Vec<usize> = vec![0; len_b + 1];
    let mut prev_row: Vec<usize> = (0..=len_b).collect();
    let mut curr_row = vec![0; len_b + 1];

    for i in 1..=len_a {
        curr_row[0] = i;

        for j in 1..=len_b {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };

            curr_row[j] = std::cmp::min(
                std::cmp::min(
                    prev_row[j] + 1,     // deletion
                    curr_row[j - 1] + 1, // insertion
                ),
                prev_row[j - 1] + cost,  // substitution
            );

            if transpositions && i > 1 && j > 1
                && a[i - 1] == b[j - 2]
                && a[i - 2] == b[j - 1]
            {
                curr_row[j] = std::cmp::min(curr_row[j], prev_prev_row[j - 2] + 1);
            }
        }

        std::mem::swap(&mut prev_prev_row, &mut prev_row);
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len_b]
}

/// Cheap reject on length before running the full table
pub fn within_distance(a: &[u8], b: &[u8], k: usize, transpositions: bool) -> bool {
    if a.len().abs_diff(b.len()) > k {
        return false;
    }
    edit_distance(a, b, transpositions) <= k
}
