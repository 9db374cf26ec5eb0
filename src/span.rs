use miette::SourceSpan;

/// Position relative to start of source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a source.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u16,
}

impl Span {
    pub fn new(start: Idx, len: u16) -> Self {
        Span { start, len }
    }

    pub fn from_range(range: std::ops::Range<usize>) -> Self {
        let len = (range.end - range.start).min(u16::MAX as usize) as u16;
        Span::new(Idx(range.start as u32), len)
    }

    pub fn offs(&self) -> usize {
        self.start.0 as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        let start = self.start.0 as usize;
        let end = start + self.len as usize;
        start..end
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_round_trips() {
        let span = Span::from_range(10..20);
        assert_eq!(span.as_range(), 10..20);
        assert_eq!(span.len(), 10);
        assert!(Span::from_range(4..4).is_empty());
    }
}
