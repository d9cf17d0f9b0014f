//! Bit-parallel bounded edit distance automaton.
//!
//! For a pattern of length `m` and budget `k`, row `R[d]` is a bit set over
//! pattern positions: bit `i` is set when the first `i + 1` pattern bytes can
//! be aligned with the input read so far using at most `d` edits. Rows are
//! advanced one input byte at a time, so a trie walk can clone the
//! [`Context`] at each branch and drop it when the branch dies.
//!
//! With transpositions enabled the distance is the restricted Damerau
//! (optimal string alignment) distance.

use crate::core::error::{Error, ErrorKind, Result};

const WORD_BITS: usize = 64;

/// Fixed-width bit set over pattern positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMask {
    words: Vec<u64>,
    bits: usize,
}

impl PatternMask {
    pub fn zeros(bits: usize) -> Self {
        PatternMask {
            words: vec![0; bits.div_ceil(WORD_BITS)],
            bits,
        }
    }

    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.bits);
        self.words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
    }

    pub fn test(&self, i: usize) -> bool {
        i < self.bits && self.words[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    pub fn copy_from(&mut self, other: &PatternMask) {
        self.words.copy_from_slice(&other.words);
    }

    pub fn none(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Move every bit `n` positions up (towards the pattern end), n < 64
    pub fn shift_up(&mut self, n: usize) {
        debug_assert!(n > 0 && n < WORD_BITS);
        for i in (0..self.words.len()).rev() {
            let carry = if i > 0 { self.words[i - 1] >> (WORD_BITS - n) } else { 0 };
            self.words[i] = (self.words[i] << n) | carry;
        }
        self.trim();
    }

    pub fn and_with(&mut self, other: &PatternMask) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    pub fn or_with(&mut self, other: &PatternMask) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    fn trim(&mut self) {
        let used = self.bits % WORD_BITS;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }
}

/// Per-query matcher: the pattern's byte masks plus the starting rows
#[derive(Debug, Clone)]
pub struct FuzzyProcessor {
    m: usize,
    k: usize,
    transpositions: bool,
    /// Byte -> index into `masks`; 0 is the empty mask
    classes: [u16; 256],
    masks: Vec<PatternMask>,
    seed: Vec<PatternMask>,
}

/// Streaming state of one walk through the input
#[derive(Debug, Clone)]
pub struct Context {
    rows: Vec<PatternMask>,
    prev_rows: Vec<PatternMask>,
    /// Scratch reused by every `feed`
    next: Vec<PatternMask>,
    edit: PatternMask,
    lift: PatternMask,
    prev_class: usize,
    cnt: usize,
    cntp: usize,
    position: usize,
}

impl FuzzyProcessor {
    pub fn new(pattern: &[u8], k: usize, transpositions: bool) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::new(
                ErrorKind::UnsupportedQuery,
                "Fuzzy matching needs a non-empty pattern".to_string(),
            ));
        }
        let m = pattern.len();

        let mut classes = [0u16; 256];
        let mut masks = vec![PatternMask::zeros(m)];
        for (i, &c) in pattern.iter().enumerate() {
            if classes[c as usize] == 0 {
                classes[c as usize] = masks.len() as u16;
                masks.push(PatternMask::zeros(m));
            }
            masks[classes[c as usize] as usize].set(i);
        }

        // Row d starts with the first d pattern bytes deletable
        let mut seed = vec![PatternMask::zeros(m); k + 1];
        for (d, row) in seed.iter_mut().enumerate() {
            for i in 0..d.min(m) {
                row.set(i);
            }
        }

        Ok(FuzzyProcessor {
            m,
            k,
            transpositions,
            classes,
            masks,
            seed,
        })
    }

    pub fn context(&self) -> Context {
        let blank = PatternMask::zeros(self.m);
        Context {
            rows: self.seed.clone(),
            prev_rows: vec![blank.clone(); self.k + 1],
            next: vec![blank.clone(); self.k + 1],
            edit: blank.clone(),
            lift: blank,
            prev_class: 0,
            cnt: 0,
            cntp: 0,
            position: 0,
        }
    }

    /// Advance the context by one input byte
    pub fn feed(&self, ctx: &mut Context, c: u8) {
        let k = self.k;
        let class = self.classes[c as usize] as usize;
        let smap = &self.masks[class];
        let Context {
            rows,
            prev_rows,
            next,
            edit,
            lift,
            prev_class,
            cnt,
            cntp,
            position,
        } = ctx;
        let j = *position;

        for row in &mut next[..*cnt] {
            row.clear();
        }
        for d in *cnt..=k {
            let (below, rest) = next.split_at_mut(d);
            let row = &mut rest[0];

            // Match: extend an alignment that used at most d edits
            row.copy_from(&rows[d]);
            row.shift_up(1);
            if j <= d {
                row.set(0);
            }
            row.and_with(smap);

            // Substitution, insertion and deletion from row d - 1
            if d > *cnt {
                edit.copy_from(&rows[d - 1]);
                edit.or_with(&below[d - 1]);
                edit.shift_up(1);
                edit.or_with(&rows[d - 1]);
                if j < d {
                    edit.set(0);
                }
                row.or_with(edit);
            }
        }

        if self.transpositions && j > 0 {
            let prev_map = &self.masks[*prev_class];
            lift.copy_from(smap);
            lift.shift_up(1);

            for d in (*cntp + 1).max(1)..=k {
                edit.copy_from(&prev_rows[d - 1]);
                edit.shift_up(2);
                if j <= d && self.m > 1 {
                    edit.set(1);
                }
                edit.and_with(prev_map);
                edit.and_with(lift);
                next[d].or_with(edit);
            }
        }

        let mut new_cnt = *cnt;
        for d in *cnt..=k {
            if d == new_cnt && j >= d && next[d].none() {
                new_cnt = d + 1;
            }
        }

        // Old rows become history, the oldest buffer becomes scratch
        if self.transpositions {
            std::mem::swap(prev_rows, rows);
        }
        std::mem::swap(rows, next);

        *prev_class = class;
        *cntp = *cnt;
        *cnt = new_cnt;
        *position += 1;
    }

    pub fn feed_all(&self, ctx: &mut Context, input: &[u8]) {
        for &c in input {
            self.feed(ctx, c);
        }
    }

    /// False once no continuation of the input can come within budget
    pub fn is_viable(&self, ctx: &Context) -> bool {
        if self.transpositions {
            ctx.cnt <= self.k || ctx.cntp < self.k
        } else {
            ctx.cnt <= self.k
        }
    }

    /// The whole pattern aligns with the input read so far within budget
    pub fn is_final(&self, ctx: &Context) -> bool {
        ctx.rows[self.k].test(self.m - 1)
    }

    /// Smallest number of edits aligning the whole pattern with the input
    pub fn distance(&self, ctx: &Context) -> Option<usize> {
        (0..=self.k).find(|&d| ctx.rows[d].test(self.m - 1))
    }

    /// Distance between the pattern and a complete input, if within budget
    pub fn check(&self, input: &[u8]) -> Option<usize> {
        let mut ctx = self.context();
        for &c in input {
            self.feed(&mut ctx, c);
            if !self.is_viable(&ctx) {
                return None;
            }
        }
        self.distance(&ctx)
    }
}
