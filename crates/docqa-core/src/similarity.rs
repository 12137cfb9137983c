//! Character-level similarity ratio based on longest matching blocks
//! (Ratcliff/Obershelp). `ratio = 2·M / (|a| + |b|)` where `M` is the total
//! length of the matching blocks found by recursively taking the longest
//! common substring and recursing on both sides.
//!
//! Pages of [`POPULAR_MIN_LEN`] characters or more treat their popular
//! characters (more than `len / 100 + 1` occurrences) as junk: they cannot
//! seed a match, only extend one found from rarer characters. On long pages
//! this lowers ratios, often to zero.
use std::collections::HashMap;

/// Indexed side length from which popular characters are dropped.
pub const POPULAR_MIN_LEN: usize = 200;

/// Precomputed index over one side (`b`) so many `a` strings can be compared
/// against it cheaply.
#[derive(Debug, Clone)]
pub struct Matcher {
    chars: Vec<char>,
    positions: HashMap<char, Vec<usize>>,
    counts: HashMap<char, usize>,
}

impl Matcher {
    pub fn new(b: &str) -> Self {
        let chars: Vec<char> = b.chars().collect();
        let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in chars.iter().enumerate() {
            positions.entry(*c).or_default().push(j);
        }
        let counts = positions.iter().map(|(c, js)| (*c, js.len())).collect();
        if chars.len() >= POPULAR_MIN_LEN {
            let limit = chars.len() / 100 + 1;
            positions.retain(|_, js| js.len() <= limit);
        }
        Self {
            chars,
            positions,
            counts,
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Exact ratio against `a`.
    pub fn ratio(&self, a: &[char]) -> f64 {
        let total = a.len() + self.chars.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * self.matching_chars(a) as f64 / total as f64
    }

    /// Upper bound on [`Matcher::ratio`] from character multiset intersection.
    pub fn quick_ratio(&self, a: &[char]) -> f64 {
        let total = a.len() + self.chars.len();
        if total == 0 {
            return 1.0;
        }
        let mut avail: HashMap<char, usize> = HashMap::new();
        let mut matches = 0usize;
        for c in a {
            let left = avail
                .entry(*c)
                .or_insert_with(|| self.counts.get(c).copied().unwrap_or(0));
            if *left > 0 {
                *left -= 1;
                matches += 1;
            }
        }
        2.0 * matches as f64 / total as f64
    }

    /// Total size of the matching blocks between `a` and the indexed side.
    fn matching_chars(&self, a: &[char]) -> usize {
        let mut queue = vec![(0, a.len(), 0, self.chars.len())];
        let mut matched = 0usize;
        // Scratch rows for the longest-match dynamic program, indexed by j + 1.
        let mut prev = vec![0usize; self.chars.len() + 1];
        let mut next = vec![0usize; self.chars.len() + 1];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.longest_match(a, alo, ahi, blo, bhi, &mut prev, &mut next);
            if k == 0 {
                continue;
            }
            matched += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        matched
    }

    /// Longest block `a[i..i+k] == b[j..j+k]` seeded from indexed characters
    /// inside the given windows, then widened over equal neighbours (popular
    /// ones included). Ties resolve to the earliest `i`, then the earliest `j`.
    #[allow(clippy::too_many_arguments)]
    fn longest_match<'b>(
        &self,
        a: &[char],
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
        mut prev: &'b mut [usize],
        mut next: &'b mut [usize],
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0usize);
        let mut touched_prev: Vec<usize> = Vec::new();
        let mut touched_next: Vec<usize> = Vec::new();
        for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
            if let Some(js) = self.positions.get(c) {
                for &j in js {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = prev[j] + 1;
                    next[j + 1] = k;
                    touched_next.push(j + 1);
                    if k > best_k {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_k = k;
                    }
                }
            }
            for idx in touched_prev.drain(..) {
                prev[idx] = 0;
            }
            std::mem::swap(&mut prev, &mut next);
            std::mem::swap(&mut touched_prev, &mut touched_next);
        }
        for idx in touched_prev.drain(..) {
            prev[idx] = 0;
        }
        while best_i > alo && best_j > blo && a[best_i - 1] == self.chars[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_k += 1;
        }
        while best_i + best_k < ahi
            && best_j + best_k < bhi
            && a[best_i + best_k] == self.chars[best_j + best_k]
        {
            best_k += 1;
        }
        (best_i, best_j, best_k)
    }
}

/// Upper bound on the ratio from lengths alone.
pub fn length_bound(a_len: usize, b_len: usize) -> f64 {
    let total = a_len + b_len;
    if total == 0 {
        return 1.0;
    }
    2.0 * a_len.min(b_len) as f64 / total as f64
}

/// Similarity ratio of two strings in `[0, 1]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    Matcher::new(b).ratio(&a)
}
