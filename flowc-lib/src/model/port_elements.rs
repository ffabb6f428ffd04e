use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use super::model_impl::Model;
use super::port::OutputPort;
use super::types::{PortRef, PortType, PortValue};
use crate::error::{Error, Result};

/// A contiguous run of values from one output port.
///
/// A range built with [`PortRange::full`] tracks the whole port
/// (`is_fixed_size() == false`); its size is refreshed from the port when the
/// model resolves it, so it may be created before the port is sized.
#[derive(Copy, Clone, Debug)]
pub struct PortRange {
    port: PortRef,
    port_type: PortType,
    start: usize,
    len: usize,
    port_size: usize,
    fixed_size: bool,
}

impl PortRange {
    /// All values of `port`.
    pub fn full(port: &OutputPort) -> Self {
        let size = port.size().unwrap_or(0);
        Self {
            port: port.port_ref(),
            port_type: port.port_type(),
            start: 0,
            len: size,
            port_size: size,
            fixed_size: false,
        }
    }

    /// The single value at `index`.
    pub fn element(port: &OutputPort, index: usize) -> Result<Self> {
        Self::new(port, index, 1)
    }

    /// `count` values starting at `start`. Bounds are checked immediately.
    pub fn new(port: &OutputPort, start: usize, count: usize) -> Result<Self> {
        let size = port.size().ok_or_else(|| {
            Error::InvalidArgument(format!("cannot slice unsized port '{}'", port.name()))
        })?;
        match start.checked_add(count) {
            Some(end) if end <= size => Ok(Self {
                port: port.port_ref(),
                port_type: port.port_type(),
                start,
                len: count,
                port_size: size,
                fixed_size: true,
            }),
            _ => Err(Error::IndexOutOfRange(format!(
                "range [{}, {}+{}) exceeds port '{}' of size {}",
                start,
                start,
                count,
                port.name(),
                size
            ))),
        }
    }

    pub fn port(&self) -> PortRef {
        self.port
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size
    }

    /// True if the range spans its port's entire output. Ranges created with
    /// [`PortRange::full`] always report true.
    pub fn is_full_port_range(&self) -> bool {
        !self.fixed_size || (self.start == 0 && self.len == self.port_size)
    }

    /// True if `other`'s values immediately follow this range on the same port.
    ///
    /// Ranges that track their port's size are never adjacent to anything:
    /// their length may still change when the port is sized.
    pub fn is_adjacent(&self, other: &PortRange) -> bool {
        self.fixed_size
            && other.fixed_size
            && self.port == other.port
            && self.start + self.len == other.start
    }

    /// Extends this range by an adjacent `other`.
    pub fn append(&mut self, other: &PortRange) -> Result<()> {
        if !self.is_adjacent(other) {
            return Err(Error::InvalidArgument(
                "cannot append a range that is not adjacent".into(),
            ));
        }
        self.merge(other);
        Ok(())
    }

    fn merge(&mut self, other: &PortRange) {
        self.len += other.len;
    }

    /// Sub-range `[offset, offset+len)` relative to this range's start.
    fn sub_range(&self, offset: usize, len: usize) -> Self {
        Self {
            start: self.start + offset,
            len,
            fixed_size: true,
            ..*self
        }
    }

    /// This range with its size taken from a port that is now `port_size` long.
    pub(crate) fn refreshed(&self, port_size: usize) -> Self {
        let len = if self.fixed_size {
            self.len
        } else {
            port_size.saturating_sub(self.start)
        };
        Self {
            len,
            port_size,
            ..*self
        }
    }

    pub(crate) fn end(&self) -> usize {
        self.start + self.len
    }
}

impl PartialEq for PortRange {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.start == other.start && self.len == other.len
    }
}

impl Eq for PortRange {}

impl Hash for PortRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.port.hash(state);
        self.start.hash(state);
        self.len.hash(state);
    }
}

/// One value of one output port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortElement {
    port: PortRef,
    port_type: PortType,
    index: usize,
}

impl PortElement {
    pub fn port(&self) -> PortRef {
        self.port
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// An ordered list of port ranges, possibly spanning several ports, that
/// together form one virtual vector of a single element type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortElementsBase {
    ranges: Vec<PortRange>,
    size: usize,
}

impl PortElementsBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_port(port: &OutputPort) -> Self {
        Self::from_range(PortRange::full(port))
    }

    pub fn from_range(range: PortRange) -> Self {
        Self {
            size: range.size(),
            ranges: vec![range],
        }
    }

    /// Concatenates `ranges` in order. All ranges must share one element type.
    pub fn from_ranges(ranges: Vec<PortRange>) -> Result<Self> {
        let mut elements = Self::new();
        elements.reserve(ranges.len());
        for range in ranges {
            elements.check_type(range.port_type())?;
            elements.add_range(range);
        }
        Ok(elements)
    }

    pub fn element(port: &OutputPort, index: usize) -> Result<Self> {
        PortRange::element(port, index).map(Self::from_range)
    }

    pub fn range(port: &OutputPort, start: usize, count: usize) -> Result<Self> {
        PortRange::new(port, start, count).map(Self::from_range)
    }

    /// Gathers individual elements, merging runs of consecutive ones.
    pub fn from_elements(elements: &[PortElement]) -> Result<Self> {
        let mut result = Self::new();
        for element in elements {
            result.check_type(element.port_type)?;
            result.add_range(PortRange {
                port: element.port,
                port_type: element.port_type,
                start: element.index,
                len: 1,
                port_size: element.index + 1,
                fixed_size: true,
            });
        }
        result.consolidate();
        Ok(result)
    }

    pub fn concat(parts: &[PortElementsBase]) -> Result<Self> {
        let mut result = Self::new();
        for part in parts {
            result.append(part)?;
        }
        Ok(result)
    }

    /// Element type of the referenced values, or `None` when empty.
    pub fn port_type(&self) -> Option<PortType> {
        self.ranges.first().map(|range| range.port_type())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges
    }

    /// True if this is exactly one full port.
    pub fn is_full_port_output(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_full_port_range()
    }

    pub fn reserve(&mut self, num_ranges: usize) {
        self.ranges.reserve(num_ranges);
    }

    pub fn get_element(&self, index: usize) -> Result<PortElement> {
        let mut remaining = index;
        for range in &self.ranges {
            if remaining < range.size() {
                return Ok(PortElement {
                    port: range.port(),
                    port_type: range.port_type(),
                    index: range.start_index() + remaining,
                });
            }
            remaining -= range.size();
        }
        Err(Error::IndexOutOfRange(format!(
            "element {} of elements with size {}",
            index, self.size
        )))
    }

    /// The referenced elements in order.
    pub fn elements(&self) -> impl Iterator<Item = PortElement> + '_ {
        self.ranges.iter().flat_map(|range| {
            (range.start_index()..range.end()).map(move |index| PortElement {
                port: range.port(),
                port_type: range.port_type(),
                index,
            })
        })
    }

    /// Appends `other`'s ranges. On a type mismatch neither side changes.
    pub fn append(&mut self, other: &PortElementsBase) -> Result<()> {
        if let Some(port_type) = other.port_type() {
            self.check_type(port_type)?;
        }
        self.reserve(other.ranges.len());
        for range in &other.ranges {
            self.add_range(*range);
        }
        Ok(())
    }

    /// Merges every range with an adjacent predecessor. Idempotent.
    pub fn consolidate(&mut self) {
        let mut merged: Vec<PortRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.is_adjacent(&range) => last.merge(&range),
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    /// `count` elements starting at element `start`.
    pub fn slice(&self, start: usize, count: usize) -> Result<Self> {
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                Error::IndexOutOfRange(format!(
                    "slice [{}, {}+{}) of elements with size {}",
                    start, start, count, self.size
                ))
            })?;

        let mut result = Self::new();
        let mut offset = 0;
        for range in &self.ranges {
            let range_end = offset + range.size();
            let lo = start.max(offset);
            let hi = end.min(range_end);
            if lo < hi {
                result.add_range(range.sub_range(lo - offset, hi - lo));
            }
            offset = range_end;
            if offset >= end {
                break;
            }
        }
        Ok(result)
    }

    /// Index/value iterator over the current values of the referenced ports.
    ///
    /// Every reference is checked against `model` first; stale or out of range
    /// references fail here rather than during iteration.
    pub fn iter_values<'m>(&self, model: &'m Model) -> Result<IndexValueIter<'m>> {
        let resolved = model.resolve_elements(self)?;
        Ok(IndexValueIter::new(model, resolved.ranges))
    }

    fn check_type(&self, port_type: PortType) -> Result<()> {
        match self.port_type() {
            Some(existing) if existing != port_type => Err(Error::type_mismatch(existing, port_type)),
            _ => Ok(()),
        }
    }

    pub(crate) fn add_range(&mut self, range: PortRange) {
        self.size += range.size();
        self.ranges.push(range);
    }
}

impl From<PortRange> for PortElementsBase {
    fn from(range: PortRange) -> Self {
        Self::from_range(range)
    }
}

impl From<PortElement> for PortElementsBase {
    fn from(element: PortElement) -> Self {
        Self::from_range(PortRange {
            port: element.port,
            port_type: element.port_type,
            start: element.index,
            len: 1,
            port_size: element.index + 1,
            fixed_size: true,
        })
    }
}

/// [`PortElementsBase`] statically known to hold values of type `T`.
#[derive(Clone, Debug, PartialEq)]
pub struct PortElements<T: PortValue> {
    base: PortElementsBase,
    _marker: PhantomData<T>,
}

impl<T: PortValue> PortElements<T> {
    pub fn from_port(port: &OutputPort) -> Result<Self> {
        Self::try_from(PortElementsBase::from_port(port))
    }

    pub fn element(port: &OutputPort, index: usize) -> Result<Self> {
        Self::try_from(PortElementsBase::element(port, index)?)
    }

    pub fn range(port: &OutputPort, start: usize, count: usize) -> Result<Self> {
        Self::try_from(PortElementsBase::range(port, start, count)?)
    }

    pub fn concat(parts: &[PortElements<T>]) -> Self {
        let mut result = Self::new_unchecked(PortElementsBase::new());
        for part in parts {
            result.append(part);
        }
        result
    }

    pub fn append(&mut self, other: &PortElements<T>) {
        for range in other.base.ranges() {
            self.base.add_range(*range);
        }
    }

    pub fn slice(&self, start: usize, count: usize) -> Result<Self> {
        self.base.slice(start, count).map(Self::new_unchecked)
    }

    pub fn consolidate(&mut self) {
        self.base.consolidate();
    }

    pub fn as_base(&self) -> &PortElementsBase {
        &self.base
    }

    pub fn into_base(self) -> PortElementsBase {
        self.base
    }

    fn new_unchecked(base: PortElementsBase) -> Self {
        Self {
            base,
            _marker: PhantomData,
        }
    }
}

impl<T: PortValue> Deref for PortElements<T> {
    type Target = PortElementsBase;

    fn deref(&self) -> &PortElementsBase {
        &self.base
    }
}

impl<T: PortValue> TryFrom<PortElementsBase> for PortElements<T> {
    type Error = Error;

    fn try_from(base: PortElementsBase) -> Result<Self> {
        match base.port_type() {
            Some(port_type) if port_type != T::PORT_TYPE => {
                Err(Error::type_mismatch(T::PORT_TYPE, port_type))
            }
            _ => Ok(Self::new_unchecked(base)),
        }
    }
}

impl<T: PortValue> From<PortElements<T>> for PortElementsBase {
    fn from(elements: PortElements<T>) -> Self {
        elements.base
    }
}

impl<T: PortValue> From<&PortElements<T>> for PortElementsBase {
    fn from(elements: &PortElements<T>) -> Self {
        elements.base.clone()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IndexValue {
    pub index: usize,
    pub value: f64,
}

/// Single-pass iterator over `(index, value)` pairs of a [`PortElementsBase`].
///
/// Call [`PortElementsBase::iter_values`] again to restart.
pub struct IndexValueIter<'m> {
    model: &'m Model,
    ranges: VecDeque<PortRange>,
    offset: usize,
    index: usize,
}

impl<'m> IndexValueIter<'m> {
    fn new(model: &'m Model, ranges: Vec<PortRange>) -> Self {
        Self {
            model,
            ranges: ranges.into_iter().filter(|r| r.size() > 0).collect(),
            offset: 0,
            index: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// The current pair.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not valid, or if its ranges no longer match
    /// the model they were resolved against.
    pub fn get(&self) -> IndexValue {
        let range = self
            .ranges
            .front()
            .expect("IndexValueIter::get called on an exhausted iterator");
        // The model is borrowed for the iterator's lifetime and every range
        // was resolved against it, so both lookups hold.
        let port = self
            .model
            .port(range.port())
            .expect("IndexValueIter range refers to a port outside the model");
        let value = port
            .values()
            .get_f64(range.start_index() + self.offset)
            .expect("IndexValueIter range exceeds the port's values");
        IndexValue {
            index: self.index,
            value,
        }
    }

    fn advance(&mut self) {
        self.index += 1;
        self.offset += 1;
        if let Some(range) = self.ranges.front() {
            if self.offset >= range.size() {
                self.ranges.pop_front();
                self.offset = 0;
            }
        }
    }
}

impl Iterator for IndexValueIter<'_> {
    type Item = IndexValue;

    fn next(&mut self) -> Option<IndexValue> {
        if !self.is_valid() {
            return None;
        }
        let current = self.get();
        self.advance();
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ranges.iter().map(|r| r.size()).sum::<usize>() - self.offset;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::port::OutputPortSpec;
    use crate::model::types::NodeKey;
    use slotmap::SlotMap;

    fn ports() -> (OutputPort, OutputPort, OutputPort) {
        let mut keys: SlotMap<NodeKey, ()> = SlotMap::with_key();
        let a = OutputPort::new(
            OutputPortSpec::sized("out", PortType::Real, 10),
            PortRef::new(keys.insert(()), 0),
        );
        let b = OutputPort::new(
            OutputPortSpec::sized("out", PortType::Real, 4),
            PortRef::new(keys.insert(()), 0),
        );
        let c = OutputPort::new(
            OutputPortSpec::sized("out", PortType::Integer, 3),
            PortRef::new(keys.insert(()), 0),
        );
        (a, b, c)
    }

    #[test]
    fn test_range_size_and_full() {
        let (a, _, _) = ports();
        let r = PortRange::new(&a, 2, 3).unwrap();
        assert_eq!(r.size(), 3);
        assert!(!r.is_full_port_range());
        assert!(PortRange::new(&a, 0, 10).unwrap().is_full_port_range());
        assert!(PortRange::full(&a).is_full_port_range());
        assert_eq!(PortRange::element(&a, 9).unwrap().size(), 1);
    }

    #[test]
    fn test_range_bounds_are_checked_eagerly() {
        let (a, _, _) = ports();
        assert!(matches!(PortRange::new(&a, 8, 3), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(PortRange::element(&a, 10), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(
            PortRange::new(&a, usize::MAX, 2),
            Err(Error::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_deferred_port_full_range() {
        let mut keys: SlotMap<NodeKey, ()> = SlotMap::with_key();
        let port = OutputPort::new(
            OutputPortSpec::deferred("out", PortType::Integer),
            PortRef::new(keys.insert(()), 0),
        );
        let full = PortRange::full(&port);
        assert!(!full.is_fixed_size());
        assert!(full.is_full_port_range());
        assert!(matches!(PortRange::new(&port, 0, 1), Err(Error::InvalidArgument(_))));
        assert_eq!(full.refreshed(7).size(), 7);
    }

    #[test]
    #[should_panic(expected = "outside the model")]
    fn test_index_values_fail_loudly_on_foreign_ranges() {
        let (a, _, _) = ports();
        let model = Model::new();
        let iter = IndexValueIter::new(&model, vec![PortRange::new(&a, 0, 2).unwrap()]);
        assert!(iter.is_valid());
        iter.get();
    }

    #[test]
    fn test_adjacent_ranges_append() {
        let (a, b, _) = ports();
        let mut first = PortRange::new(&a, 0, 4).unwrap();
        let second = PortRange::new(&a, 4, 3).unwrap();
        assert!(first.is_adjacent(&second));
        assert!(!second.is_adjacent(&first));
        first.append(&second).unwrap();
        assert_eq!(first.size(), 7);
        assert_eq!(first, PortRange::new(&a, 0, 7).unwrap());

        let other_port = PortRange::new(&b, 0, 1).unwrap();
        assert!(!first.is_adjacent(&other_port));
        assert!(matches!(first.append(&other_port), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_range_equality_ignores_fixed_flag() {
        let (a, _, _) = ports();
        assert_eq!(PortRange::full(&a), PortRange::new(&a, 0, 10).unwrap());
        assert_ne!(PortRange::new(&a, 0, 2).unwrap(), PortRange::new(&a, 1, 2).unwrap());
    }

    #[test]
    fn test_consolidate_is_idempotent() {
        let (a, b, _) = ports();
        let mut elements = PortElementsBase::from_ranges(vec![
            PortRange::new(&a, 0, 2).unwrap(),
            PortRange::new(&a, 2, 2).unwrap(),
            PortRange::new(&b, 0, 1).unwrap(),
            PortRange::new(&a, 4, 1).unwrap(),
            PortRange::new(&a, 5, 5).unwrap(),
        ])
        .unwrap();
        let before: Vec<_> = elements.elements().collect();

        elements.consolidate();
        assert_eq!(elements.num_ranges(), 3);
        assert_eq!(elements.size(), 11);
        let once = elements.clone();

        elements.consolidate();
        assert_eq!(elements, once);
        assert_eq!(elements.elements().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_append_type_mismatch_leaves_operands() {
        let (a, _, c) = ports();
        let mut integers = PortElementsBase::from_port(&c);
        let reals = PortElementsBase::range(&a, 0, 2).unwrap();
        let integers_before = integers.clone();
        let reals_before = reals.clone();

        assert!(matches!(integers.append(&reals), Err(Error::TypeMismatch { .. })));
        assert_eq!(integers, integers_before);
        assert_eq!(reals, reals_before);
    }

    #[test]
    fn test_get_element_and_slice() {
        let (a, b, _) = ports();
        let elements = PortElementsBase::from_ranges(vec![
            PortRange::new(&a, 3, 2).unwrap(),
            PortRange::full(&b),
        ])
        .unwrap();
        assert_eq!(elements.size(), 6);

        let e = elements.get_element(2).unwrap();
        assert_eq!(e.port(), b.port_ref());
        assert_eq!(e.index(), 0);
        assert!(elements.get_element(6).is_err());

        let slice = elements.slice(1, 3).unwrap();
        assert_eq!(slice.num_ranges(), 2);
        assert_eq!(slice.ranges()[0], PortRange::new(&a, 4, 1).unwrap());
        assert_eq!(slice.ranges()[1], PortRange::new(&b, 0, 2).unwrap());
        assert!(elements.slice(5, 2).is_err());
    }

    #[test]
    fn test_from_elements_merges_runs() {
        let (a, _, _) = ports();
        let picked: Vec<_> = PortElementsBase::from_port(&a)
            .elements()
            .filter(|e| e.index() != 5)
            .collect();
        let elements = PortElementsBase::from_elements(&picked).unwrap();
        assert_eq!(elements.num_ranges(), 2);
        assert_eq!(elements.size(), 9);
    }

    #[test]
    fn test_typed_projection() {
        let (a, _, c) = ports();
        assert!(PortElements::<f64>::from_port(&a).is_ok());
        assert!(matches!(
            PortElements::<i32>::from_port(&a),
            Err(Error::TypeMismatch { .. })
        ));
        let mut ints = PortElements::<i32>::range(&c, 0, 1).unwrap();
        let rest = PortElements::<i32>::range(&c, 1, 2).unwrap();
        ints.append(&rest);
        assert_eq!(ints.size(), 3);
        ints.consolidate();
        assert!(ints.is_full_port_output());
    }
}
