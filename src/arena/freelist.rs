//! Reclaimed spans waiting to be reused.

use getset::CopyGetters;

/// A reclaimed `[offset, offset + len)` range of an arena, in the arena's
/// units (bytes or elements).
#[derive(Clone, Copy, Debug, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Span {
  offset: usize,
  len: usize,
}

impl Span {
  pub(crate) fn new(offset: usize, len: usize) -> Self {
    Self { offset, len }
  }

  pub fn end(&self) -> usize {
    self.offset + self.len
  }

  fn overlaps(&self, other: &Span) -> bool {
    self.offset < other.end() && other.offset < self.end()
  }
}

/// Spans in the order they were freed. Adjacent spans are never merged.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
  spans: Vec<Span>,
}

impl FreeList {
  pub(crate) fn push(&mut self, span: Span) {
    debug_assert!(
      self.spans.iter().all(|s| !s.overlaps(&span)),
      "freed span {span:?} overlaps the free list"
    );
    self.spans.push(span);
  }

  pub(crate) fn spans(&self) -> &[Span] {
    &self.spans
  }

  /// Sum of all span lengths.
  pub(crate) fn total(&self) -> usize {
    self.spans.iter().map(Span::len).sum()
  }

  /// Takes `len` units from the first span that can hold them.
  pub(crate) fn take_first_fit(&mut self, len: usize) -> Option<usize> {
    let index = self.spans.iter().position(|s| s.len >= len)?;
    Some(self.consume(index, len))
  }

  /// Takes `len` units from the most recently freed span that can hold them.
  pub(crate) fn take_last_fit(&mut self, len: usize) -> Option<usize> {
    let index = self.spans.iter().rposition(|s| s.len >= len)?;
    Some(self.consume(index, len))
  }

  // Shrinks the span from the front, dropping it once empty.
  fn consume(&mut self, index: usize, len: usize) -> usize {
    let span = &mut self.spans[index];
    let offset = span.offset;
    span.offset += len;
    span.len -= len;
    if span.len == 0 {
      self.spans.remove(index);
    }
    offset
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn list(spans: &[(usize, usize)]) -> FreeList {
    let mut list = FreeList::default();
    for &(offset, len) in spans {
      list.push(Span::new(offset, len));
    }
    list
  }

  #[test]
  fn first_fit_skips_small_spans() {
    let mut free = list(&[(0, 4), (8, 16), (32, 16)]);
    assert_eq!(free.take_first_fit(8), Some(8));
    assert_eq!(free.spans(), &[Span::new(0, 4), Span::new(16, 8), Span::new(32, 16)]);
  }

  #[test]
  fn exact_fit_removes_span() {
    let mut free = list(&[(0, 4), (8, 4)]);
    assert_eq!(free.take_first_fit(4), Some(0));
    assert_eq!(free.spans(), &[Span::new(8, 4)]);
  }

  #[test]
  fn last_fit_prefers_recent_spans() {
    let mut free = list(&[(0, 8), (8, 8), (16, 2)]);
    assert_eq!(free.take_last_fit(4), Some(8));
    assert_eq!(free.spans(), &[Span::new(0, 8), Span::new(12, 4), Span::new(16, 2)]);
  }

  #[test]
  fn nothing_fits() {
    let mut free = list(&[(0, 2), (4, 3)]);
    assert_eq!(free.take_first_fit(4), None);
    assert_eq!(free.take_last_fit(4), None);
    assert_eq!(free.total(), 5);
  }
}
