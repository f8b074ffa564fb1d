//! Buffered, rewindable character reader.
//!
//! html5gum's own [`Reader`](https://docs.rs/html5gum) trait (kept in spirit as the
//! `Source` trait below) is a bare pull interface with no buffering: `read_char` /
//! `try_read_string` delegate entirely to the borrow checker over a `&str`. This crate
//! needs substantially more — a buffered window, a single-slot mark/rewind with a
//! 1024-char reach, a small-string intern cache, and optional line/column tracking —
//! so `CharReader` is its own implementation, modeled on html5gum's
//! `PosTracker`/`GetPos` wrapper (`spans.rs`) for the position bookkeeping.

use std::fmt;

use crate::error::Failure;
use crate::position::LineIndex;

/// Minimal trait for anything that can hand `CharReader` more characters.
///
/// Mirrors html5gum's `Reader` trait shape (a narrow, swappable source) while
/// `CharReader` itself owns the buffering, mark/rewind, and caching machinery.
pub trait Source {
    /// Fill `buf` with up to `buf.len()` further characters, returning how many were
    /// written. Returns `0` at end of input.
    fn fill(&mut self, buf: &mut Vec<char>) -> Result<usize, Failure>;
}

/// Adapts an in-memory string into a [`Source`].
pub struct StringSource<'a> {
    chars: std::str::Chars<'a>,
}

impl<'a> StringSource<'a> {
    pub fn new(input: &'a str) -> Self {
        StringSource {
            chars: input.chars(),
        }
    }
}

impl<'a> Source for StringSource<'a> {
    fn fill(&mut self, buf: &mut Vec<char>) -> Result<usize, Failure> {
        let mut n = 0;
        for c in &mut self.chars {
            buf.push(c);
            n += 1;
            if n >= 4096 {
                break;
            }
        }
        Ok(n)
    }
}

/// Adapts any `std::io::Read` (assumed to carry valid UTF-8, since the core parser
/// works over already-decoded text) into a [`Source`].
pub struct ReadSource<R> {
    inner: R,
    leftover: Vec<u8>,
}

impl<R: std::io::Read> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        ReadSource {
            inner,
            leftover: Vec::new(),
        }
    }
}

impl<R: std::io::Read> Source for ReadSource<R> {
    fn fill(&mut self, buf: &mut Vec<char>) -> Result<usize, Failure> {
        let mut raw = std::mem::take(&mut self.leftover);
        let start = raw.len();
        raw.resize(start + 8192, 0);
        let read = self.inner.read(&mut raw[start..])?;
        raw.truncate(start + read);

        if read == 0 && raw.is_empty() {
            return Ok(0);
        }

        // Decode as much valid UTF-8 as is available; keep a trailing partial
        // sequence for the next fill.
        let (valid, after) = match std::str::from_utf8(&raw) {
            Ok(s) => (s, &[][..]),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                let (valid, after) = raw.split_at(valid_up_to);
                (std::str::from_utf8(valid).unwrap(), after)
            }
        };

        let mut n = 0;
        for c in valid.chars() {
            buf.push(c);
            n += 1;
        }
        self.leftover = after.to_vec();

        if n == 0 && read == 0 {
            if !self.leftover.is_empty() {
                return Err(Failure::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "truncated UTF-8 sequence at end of input",
                )));
            }
            return Ok(0);
        }

        Ok(n)
    }
}

const DEFAULT_BUFFER_SIZE: usize = 2048;
const STRING_CACHE_SLOTS: usize = 512;
const MARK_WINDOW: usize = 1024;
const CACHE_MAX_LEN: usize = 12;

/// A 512-slot open-addressed intern table for consumed substrings of length ≤ 12
///. Purely a latency optimization: behavior is identical to
/// allocating a fresh `String` every time.
struct StringCache {
    slots: Vec<Option<(u64, String)>>,
}

impl StringCache {
    fn new() -> Self {
        StringCache {
            slots: vec![None; STRING_CACHE_SLOTS],
        }
    }

    fn hash(s: &[char]) -> u64 {
        // FNV-1a over UTF-8 bytes of the run; cheap and adequate for a cache key.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for &c in s {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).as_bytes() {
                h ^= u64::from(*b);
                h = h.wrapping_mul(0x0000_0100_0000_01B3);
            }
        }
        h
    }

    fn get_or_insert(&mut self, run: &[char]) -> String {
        if run.is_empty() || run.len() > CACHE_MAX_LEN {
            return run.iter().collect();
        }
        let h = Self::hash(run);
        let idx = (h as usize) % self.slots.len();
        match &self.slots[idx] {
            Some((slot_hash, slot_str)) if *slot_hash == h && slot_str.chars().eq(run.iter().copied()) => {
                slot_str.clone()
            }
            _ => {
                let s: String = run.iter().collect();
                self.slots[idx] = Some((h, s.clone()));
                s
            }
        }
    }
}

/// A saved mark: the buffer index it was taken at, valid only until the next refill
/// evicts it.
#[derive(Clone, Copy)]
struct Mark {
    buf_index: usize,
    pos: usize,
}

/// Buffered, rewindable character source with position tracking and a small-string
/// cache.
///
/// `CharReader` keeps a sliding window of decoded characters in `buf[head..]`. `pos()`
/// is the absolute offset of `buf[head]` in the overall stream. A single mark can be
/// set; while set, refill is inhibited as long as the mark remains within
/// [`MARK_WINDOW`] characters of the current head, so that `rewind_to_mark()` is
/// always legal within that reach — sufficient to cover any legal HTML entity per spec.
pub struct CharReader<S> {
    source: S,
    buf: Vec<char>,
    // Absolute offset (in the whole stream) of buf[0].
    buf_base: usize,
    // Index into `buf` of the current head (not yet consumed).
    head: usize,
    mark: Option<Mark>,
    eof: bool,
    cache: StringCache,
    line_index: Option<LineIndex>,
    // Offset within `buf` up to which lines have already been scanned for '\n'.
    line_scanned_to: usize,
    last_contains_probe: Option<(Vec<char>, Option<usize>)>,
}

impl<S: Source> CharReader<S> {
    /// Construct a reader with the default buffer capacity and string-cache size.
    pub fn new(source: S) -> Self {
        CharReader {
            source,
            buf: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            buf_base: 0,
            head: 0,
            mark: None,
            eof: false,
            cache: StringCache::new(),
            line_index: None,
            line_scanned_to: 0,
            last_contains_probe: None,
        }
    }

    /// Enable line/column tracking. Must be called before the first read.
    pub fn track_lines(&mut self) {
        debug_assert_eq!(
            self.buf_base + self.head,
            0,
            "track_lines must be called before the first read"
        );
        self.line_index = Some(LineIndex::new());
    }

    /// Absolute character offset consumed so far.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.buf_base + self.head
    }

    /// 1-based line number at `pos`, or 0 if line tracking was never enabled.
    #[must_use]
    pub fn line_number(&self, pos: usize) -> u32 {
        self.line_index.as_ref().map_or(0, |idx| idx.line_number(pos))
    }

    /// 1-based column number at `pos`, or 0 if line tracking was never enabled.
    #[must_use]
    pub fn column_number(&self, pos: usize) -> u32 {
        self.line_index.as_ref().map_or(0, |idx| idx.column_number(pos))
    }

    fn ensure(&mut self, want: usize) -> Result<(), Failure> {
        while self.buf.len() - self.head < want && !self.eof {
            self.refill()?;
        }
        Ok(())
    }

    fn refill(&mut self) -> Result<(), Failure> {
        // Compact the buffer first, unless a mark is holding earlier data live.
        let keep_from = match self.mark {
            Some(m) => m.buf_index.min(self.head),
            None => self.head,
        };

        if keep_from > 0 {
            self.buf.drain(0..keep_from);
            self.buf_base += keep_from;
            self.head -= keep_from;
            if let Some(m) = &mut self.mark {
                m.buf_index -= keep_from;
            }
            self.line_scanned_to = self.line_scanned_to.saturating_sub(keep_from);
        }

        let before = self.buf.len();
        let n = self.source.fill(&mut self.buf)?;
        if n == 0 {
            self.eof = true;
        }

        if let Some(ref mut idx) = self.line_index {
            let scan_from = self.line_scanned_to.max(before);
            for (i, c) in self.buf[scan_from..].iter().enumerate() {
                if *c == '\n' {
                    idx.record_newline(self.buf_base + scan_from + i);
                }
            }
            self.line_scanned_to = self.buf.len();
        }

        self.last_contains_probe = None;
        Ok(())
    }

    /// Character at the head without consuming it.
    pub fn current(&mut self) -> Result<Option<char>, Failure> {
        self.ensure(1)?;
        Ok(self.buf.get(self.head).copied())
    }

    /// Consume and return the character at the head, advancing past it.
    pub fn consume(&mut self) -> Result<Option<char>, Failure> {
        self.ensure(1)?;
        match self.buf.get(self.head).copied() {
            Some(c) => {
                self.head += 1;
                Ok(Some(c))
            }
            None => Ok(None),
        }
    }

    /// Alias for [`CharReader::consume`] that discards the result.
    pub fn advance(&mut self) -> Result<(), Failure> {
        self.consume()?;
        Ok(())
    }

    /// Step back over the character most recently returned by [`CharReader::consume`].
    ///
    /// Only legal immediately following a `consume()` with no intervening refill
    ///. Violating this is a caller defect.
    pub fn unconsume(&mut self) {
        assert!(self.head > 0, "unconsume() without a preceding consume()");
        self.head -= 1;
    }

    /// Set the single rewind mark at the current head position.
    pub fn mark(&mut self) {
        self.mark = Some(Mark {
            buf_index: self.head,
            pos: self.pos(),
        });
    }

    /// Rewind the head back to the most recent [`CharReader::mark`].
    ///
    /// Legal as long as the mark is still within the [`MARK_WINDOW`]-char reach;
    /// violating that (holding a mark across more than 1024 consumed chars) is a
    /// caller defect since spec guarantees that window only.
    pub fn rewind_to_mark(&mut self) {
        let m = self.mark.expect("rewind_to_mark() without a preceding mark()");
        assert!(
            self.pos().saturating_sub(m.pos) <= MARK_WINDOW,
            "mark rewound beyond the guaranteed {MARK_WINDOW}-char window"
        );
        self.head = m.buf_index;
    }

    /// Release the current mark without rewinding.
    pub fn unmark(&mut self) {
        self.mark = None;
    }

    /// True if refill should be inhibited because an active mark is still in reach.
    fn mark_pins_buffer(&self) -> bool {
        matches!(self.mark, Some(m) if self.pos() - m.pos < MARK_WINDOW)
    }

    fn cache_consume(&mut self, from: usize, to: usize) -> String {
        let run: Vec<char> = self.buf[from..to].to_vec();
        self.cache.get_or_insert(&run)
    }

    /// Consume characters up to (not including) the first occurrence of `delim`,
    /// returning the consumed run. If `delim` is not found in the buffered window and
    /// more input remains, performs a *short read*: returns what's currently
    /// available rather than blocking indefinitely on refill.
    pub fn consume_to(&mut self, delim: char) -> Result<String, Failure> {
        loop {
            if let Some(idx) = self.buf[self.head..].iter().position(|&c| c == delim) {
                let end = self.head + idx;
                let s = self.cache_consume(self.head, end);
                self.head = end;
                return Ok(s);
            }
            if self.eof || self.mark_pins_buffer() {
                let s = self.cache_consume(self.head, self.buf.len());
                self.head = self.buf.len();
                return Ok(s);
            }
            self.refill()?;
        }
    }

    /// Consume characters up to (not including) the first occurrence of the literal
    /// string `delim`. On a short read, preserves at least `delim.len() - 1` trailing
    /// characters so the delimiter can't be missed across a refill boundary.
    pub fn consume_to_str(&mut self, delim: &str) -> Result<String, Failure> {
        let dchars: Vec<char> = delim.chars().collect();
        if dchars.is_empty() {
            return Ok(String::new());
        }
        loop {
            if let Some(idx) = find_subsequence(&self.buf[self.head..], &dchars) {
                let end = self.head + idx;
                let s = self.cache_consume(self.head, end);
                self.head = end;
                return Ok(s);
            }
            if self.eof {
                let s = self.cache_consume(self.head, self.buf.len());
                self.head = self.buf.len();
                return Ok(s);
            }
            if self.mark_pins_buffer() {
                let safe_end = self.buf.len().saturating_sub(dchars.len() - 1).max(self.head);
                let s = self.cache_consume(self.head, safe_end);
                self.head = safe_end;
                return Ok(s);
            }
            self.refill()?;
        }
    }

    /// Consume a maximal run of characters from `chars`.
    pub fn consume_to_any(&mut self, chars: &[char]) -> Result<String, Failure> {
        self.consume_matching(|c| !chars.contains(&c), None)
    }

    /// Like [`CharReader::consume_to_any`] but `chars` is pre-sorted, allowing a
    /// binary search instead of a linear scan per character.
    pub fn consume_to_any_sorted(&mut self, sorted_chars: &[char]) -> Result<String, Failure> {
        debug_assert!(sorted_chars.windows(2).all(|w| w[0] <= w[1]));
        self.consume_matching(|c| sorted_chars.binary_search(&c).is_err(), None)
    }

    /// Consume a maximal run of characters satisfying `predicate`, capped at
    /// `max_len` if given.
    pub fn consume_matching(
        &mut self,
        predicate: impl Fn(char) -> bool,
        max_len: Option<usize>,
    ) -> Result<String, Failure> {
        loop {
            let limit = max_len.map_or(self.buf.len(), |m| (self.head + m).min(self.buf.len()));
            if let Some(idx) = self.buf[self.head..limit].iter().position(|&c| !predicate(c)) {
                let end = self.head + idx;
                let s = self.cache_consume(self.head, end);
                self.head = end;
                return Ok(s);
            }
            if max_len.map_or(false, |m| self.buf.len() - self.head >= m) {
                let end = self.head + max_len.unwrap();
                let s = self.cache_consume(self.head, end);
                self.head = end;
                return Ok(s);
            }
            if self.eof || self.mark_pins_buffer() {
                let s = self.cache_consume(self.head, self.buf.len());
                self.head = self.buf.len();
                return Ok(s);
            }
            self.refill()?;
        }
    }

    /// Consumes everything up to EOF verbatim — used for legacy `<plaintext>` and raw
    /// data runs.
    pub fn consume_to_end(&mut self) -> Result<String, Failure> {
        loop {
            if self.eof {
                let s = self.cache_consume(self.head, self.buf.len());
                self.head = self.buf.len();
                return Ok(s);
            }
            self.refill()?;
        }
    }

    /// Consumes an attribute value delimited by a quote character: stops at (without
    /// consuming) the matching quote.
    pub fn consume_attribute_quoted(&mut self, single: bool) -> Result<String, Failure> {
        self.consume_to(if single { '\'' } else { '"' })
    }

    /// Consumes a tag name: ASCII alphanumerics plus `-`, `_`, and `:`
    /// (namespace-prefixed XML names).
    pub fn consume_tag_name(&mut self) -> Result<String, Failure> {
        self.consume_matching(
            |c| c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_',
            None,
        )
    }

    /// Consumes a maximal run of ASCII hex digits.
    pub fn consume_hex_sequence(&mut self) -> Result<String, Failure> {
        self.consume_matching(|c| c.is_ascii_hexdigit(), None)
    }

    /// Consumes a maximal run of ASCII digits.
    pub fn consume_digit_sequence(&mut self) -> Result<String, Failure> {
        self.consume_matching(|c| c.is_ascii_digit(), None)
    }

    /// Consumes a maximal run of ASCII letters.
    pub fn consume_letter_sequence(&mut self) -> Result<String, Failure> {
        self.consume_matching(|c| c.is_ascii_alphabetic(), None)
    }

    /// Consumes a maximal run of letters, then digits (used by the named
    /// character-reference matcher).
    pub fn consume_letter_then_digit_sequence(&mut self) -> Result<String, Failure> {
        self.consume_matching(|c| c.is_ascii_alphanumeric(), None)
    }

    /// True if the head character equals `c` without consuming.
    pub fn matches_char(&mut self, c: char) -> Result<bool, Failure> {
        Ok(self.current()? == Some(c))
    }

    /// True if the upcoming characters equal `s` exactly, without consuming.
    pub fn matches_str(&mut self, s: &str) -> Result<bool, Failure> {
        let n = s.chars().count();
        self.ensure(n)?;
        if self.buf.len() - self.head < n {
            return Ok(false);
        }
        Ok(self.buf[self.head..self.head + n].iter().copied().eq(s.chars()))
    }

    /// Case-insensitive version of [`CharReader::matches_str`] (ASCII casing only, as
    /// HTML keyword matching requires).
    pub fn matches_str_ignore_case(&mut self, s: &str) -> Result<bool, Failure> {
        let n = s.chars().count();
        self.ensure(n)?;
        if self.buf.len() - self.head < n {
            return Ok(false);
        }
        Ok(self.buf[self.head..self.head + n]
            .iter()
            .zip(s.chars())
            .all(|(a, b)| a.eq_ignore_ascii_case(&b)))
    }

    /// True if the head is one of `chars`.
    pub fn matches_any(&mut self, chars: &[char]) -> Result<bool, Failure> {
        Ok(matches!(self.current()?, Some(c) if chars.contains(&c)))
    }

    /// True if the head is an ASCII alphabetic character.
    pub fn matches_ascii_alpha(&mut self) -> Result<bool, Failure> {
        Ok(matches!(self.current()?, Some(c) if c.is_ascii_alphabetic()))
    }

    /// True if the head is an ASCII digit.
    pub fn matches_digit(&mut self) -> Result<bool, Failure> {
        Ok(matches!(self.current()?, Some(c) if c.is_ascii_digit()))
    }

    /// If the head matches `c`, consumes it and returns true; otherwise a no-op.
    pub fn match_consume(&mut self, c: char) -> Result<bool, Failure> {
        if self.matches_char(c)? {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Case-insensitive version of [`CharReader::match_consume`] over a whole string.
    pub fn match_consume_ignore_case(&mut self, s: &str) -> Result<bool, Failure> {
        if self.matches_str_ignore_case(s)? {
            for _ in 0..s.chars().count() {
                self.advance()?;
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Scans the remaining buffered window for `seq` case-insensitively, caching the
    /// last `(seq, hit)` pair so repeated probes during misnesting recovery are O(1)
    /// amortized until the next refill.
    pub fn contains_ignore_case(&mut self, seq: &str) -> Result<bool, Failure> {
        loop {
            if let Some((cached_seq, hit)) = &self.last_contains_probe {
                if cached_seq.iter().collect::<String>().eq_ignore_ascii_case(seq) {
                    return Ok(hit.is_some());
                }
            }
            let target: Vec<char> = seq.chars().collect();
            let hit = find_subsequence_ignore_case(&self.buf[self.head..], &target);
            if hit.is_some() || self.eof {
                self.last_contains_probe = Some((target, hit));
                return Ok(hit.is_some());
            }
            self.refill()?;
        }
    }
}

fn find_subsequence(hay: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| &hay[i..i + needle.len()] == needle)
}

fn find_subsequence_ignore_case(hay: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| {
        hay[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

impl<S> fmt::Debug for CharReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharReader")
            .field("pos", &(self.buf_base + self.head))
            .field("buffered", &(self.buf.len() - self.head))
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(s: &str) -> CharReader<StringSource<'_>> {
        CharReader::new(StringSource::new(s))
    }

    #[test]
    fn basic_consume() {
        let mut r = reader("abc");
        assert_eq!(r.consume().unwrap(), Some('a'));
        assert_eq!(r.consume().unwrap(), Some('b'));
        assert_eq!(r.pos(), 2);
        assert_eq!(r.current().unwrap(), Some('c'));
    }

    #[test]
    fn unconsume_restores_head() {
        let mut r = reader("ab");
        r.consume().unwrap();
        r.unconsume();
        assert_eq!(r.pos(), 0);
        assert_eq!(r.consume().unwrap(), Some('a'));
    }

    #[test]
    fn mark_and_rewind() {
        let mut r = reader("hello world");
        r.consume().unwrap();
        r.mark();
        r.consume_to(' ').unwrap();
        r.rewind_to_mark();
        assert_eq!(r.pos(), 1);
        assert_eq!(r.current().unwrap(), Some('e'));
    }

    #[test]
    fn consume_to_delimiter() {
        let mut r = reader("foo,bar");
        assert_eq!(r.consume_to(',').unwrap(), "foo");
        assert_eq!(r.consume().unwrap(), Some(','));
        assert_eq!(r.consume_to(',').unwrap(), "bar");
    }

    #[test]
    fn consume_to_str_delimiter() {
        let mut r = reader("one</foo>two");
        assert_eq!(r.consume_to_str("</foo>").unwrap(), "one");
        assert!(r.match_consume_ignore_case("</foo>").unwrap());
        assert_eq!(r.consume_to_end().unwrap(), "two");
    }

    #[test]
    fn line_tracking() {
        let mut r = reader("ab\ncd\nef");
        r.track_lines();
        let s = r.consume_to_end().unwrap();
        assert_eq!(s, "ab\ncd\nef");
        assert_eq!(r.line_number(0), 1);
        assert_eq!(r.line_number(3), 2);
        assert_eq!(r.column_number(3), 1);
        assert_eq!(r.line_number(7), 3);
        assert_eq!(r.column_number(7), 2);
    }

    #[test]
    fn string_cache_transparent() {
        let mut r = reader("abcabcabc");
        let a = r
            .consume_matching(|c| c == 'a' || c == 'b' || c == 'c', Some(3))
            .unwrap();
        let b = r
            .consume_matching(|c| c == 'a' || c == 'b' || c == 'c', Some(3))
            .unwrap();
        assert_eq!(a, "abc");
        assert_eq!(a, b);
    }
}
