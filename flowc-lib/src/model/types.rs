use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::new_key_type;

use crate::error::{Error, Result};

pub const MAX_NODE_PORTS: usize = 32;

/// Characters the port specification grammar reserves as delimiters.
pub const SPEC_DELIMITERS: &str = "{}[],.:";

new_key_type! { pub struct NodeKey; }

/// Element type of a port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortType {
    Boolean,
    Integer,
    Real,
}

impl PortType {
    pub const fn name(self) -> &'static str {
        match self {
            PortType::Boolean => "boolean",
            PortType::Integer => "integer",
            PortType::Real => "real",
        }
    }

    /// Size in bytes of one element in a native buffer.
    pub const fn element_size(self) -> usize {
        match self {
            PortType::Boolean => 1,
            PortType::Integer => 4,
            PortType::Real => 8,
        }
    }

    pub const fn is_numeric(self) -> bool {
        !matches!(self, PortType::Boolean)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
    impl Sealed for f64 {}
}

/// Rust element types that can flow through ports: `bool`, `i32` and `f64`.
///
/// The trait is sealed; it performs the checked projection from the tagged
/// [`PortData`] representation to a typed slice.
pub trait PortValue:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static + sealed::Sealed
{
    const PORT_TYPE: PortType;

    fn values(data: &PortData) -> Option<&[Self]>;
    fn values_mut(data: &mut PortData) -> Option<&mut Vec<Self>>;
    fn into_data(values: Vec<Self>) -> PortData;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
    fn write_le_bytes(self, out: &mut Vec<u8>);
}

impl PortValue for bool {
    const PORT_TYPE: PortType = PortType::Boolean;

    fn values(data: &PortData) -> Option<&[Self]> {
        match data {
            PortData::Boolean(values) => Some(values),
            _ => None,
        }
    }

    fn values_mut(data: &mut PortData) -> Option<&mut Vec<Self>> {
        match data {
            PortData::Boolean(values) => Some(values),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> PortData {
        PortData::Boolean(values)
    }

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
}

impl PortValue for i32 {
    const PORT_TYPE: PortType = PortType::Integer;

    fn values(data: &PortData) -> Option<&[Self]> {
        match data {
            PortData::Integer(values) => Some(values),
            _ => None,
        }
    }

    fn values_mut(data: &mut PortData) -> Option<&mut Vec<Self>> {
        match data {
            PortData::Integer(values) => Some(values),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> PortData {
        PortData::Integer(values)
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        // Saturating, truncating toward zero (NaN becomes 0).
        value as i32
    }

    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl PortValue for f64 {
    const PORT_TYPE: PortType = PortType::Real;

    fn values(data: &PortData) -> Option<&[Self]> {
        match data {
            PortData::Real(values) => Some(values),
            _ => None,
        }
    }

    fn values_mut(data: &mut PortData) -> Option<&mut Vec<Self>> {
        match data {
            PortData::Real(values) => Some(values),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> PortData {
        PortData::Real(values)
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn write_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// The values held by one port, tagged with their element type.
#[derive(Clone, Debug, PartialEq)]
pub enum PortData {
    Boolean(Vec<bool>),
    Integer(Vec<i32>),
    Real(Vec<f64>),
}

impl PortData {
    /// Zero-filled data of the given type and length.
    pub fn new(port_type: PortType, len: usize) -> Self {
        match port_type {
            PortType::Boolean => PortData::Boolean(vec![false; len]),
            PortType::Integer => PortData::Integer(vec![0; len]),
            PortType::Real => PortData::Real(vec![0.0; len]),
        }
    }

    pub fn from_values<T: PortValue>(values: Vec<T>) -> Self {
        T::into_data(values)
    }

    pub fn port_type(&self) -> PortType {
        match self {
            PortData::Boolean(_) => PortType::Boolean,
            PortData::Integer(_) => PortType::Integer,
            PortData::Real(_) => PortType::Real,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PortData::Boolean(values) => values.len(),
            PortData::Integer(values) => values.len(),
            PortData::Real(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resizes to `len` elements, zero-filling new ones.
    pub fn resize(&mut self, len: usize) {
        match self {
            PortData::Boolean(values) => values.resize(len, false),
            PortData::Integer(values) => values.resize(len, 0),
            PortData::Real(values) => values.resize(len, 0.0),
        }
    }

    /// Value at `index` widened to `f64`.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            PortData::Boolean(values) => values.get(index).map(|v| v.to_f64()),
            PortData::Integer(values) => values.get(index).map(|v| v.to_f64()),
            PortData::Real(values) => values.get(index).copied(),
        }
    }

    pub fn values<T: PortValue>(&self) -> Result<&[T]> {
        T::values(self).ok_or_else(|| Error::type_mismatch(T::PORT_TYPE, self.port_type()))
    }

    pub fn values_mut<T: PortValue>(&mut self) -> Result<&mut Vec<T>> {
        let found = self.port_type();
        T::values_mut(self).ok_or_else(|| Error::type_mismatch(T::PORT_TYPE, found))
    }

    /// Appends `len` values of `source` starting at `start`.
    pub fn extend_from(&mut self, source: &PortData, start: usize, len: usize) -> Result<()> {
        let end = start
            .checked_add(len)
            .filter(|&end| end <= source.len())
            .ok_or_else(|| {
                Error::IndexOutOfRange(format!(
                    "values [{}, {}+{}) of a port holding {}",
                    start,
                    start,
                    len,
                    source.len()
                ))
            })?;
        match (self, source) {
            (PortData::Boolean(dst), PortData::Boolean(src)) => dst.extend_from_slice(&src[start..end]),
            (PortData::Integer(dst), PortData::Integer(src)) => dst.extend_from_slice(&src[start..end]),
            (PortData::Real(dst), PortData::Real(src)) => dst.extend_from_slice(&src[start..end]),
            (dst, src) => return Err(Error::type_mismatch(dst.port_type(), src.port_type())),
        }
        Ok(())
    }
}

/// Process-unique node identifier, used by the port specification grammar.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1000);

impl NodeId {
    /// Creates an identifier from an explicit token.
    ///
    /// The token must be non-empty and free of whitespace and grammar
    /// delimiters so that it can round-trip through the text grammar.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty()
            || token
                .chars()
                .any(|c| c.is_whitespace() || SPEC_DELIMITERS.contains(c))
        {
            return Err(Error::InvalidArgument(format!(
                "'{}' is not a valid node identifier",
                token
            )));
        }
        Ok(Self(token))
    }

    /// Next auto-assigned identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-owning reference to one output port: the owning node's arena key and
/// the port's index on that node.
///
/// `NodeKey` carries a generation, so a reference to a removed node never
/// resolves to whatever node later reuses the slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: NodeKey,
    pub index: usize,
}

impl PortRef {
    pub fn new(node: NodeKey, index: usize) -> Self {
        Self { node, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_rejects_delimiters() {
        assert!(NodeId::new("A").is_ok());
        assert!(NodeId::new("a.b").is_err());
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("x y").is_err());
    }

    #[test]
    fn test_auto_ids_are_unique() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_port_data_projection() {
        let data = PortData::from_values(vec![1.0, 2.0]);
        assert_eq!(data.values::<f64>().unwrap(), &[1.0, 2.0]);
        assert!(matches!(
            data.values::<i32>(),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_extend_from_checks_bounds_and_type() {
        let source = PortData::from_values(vec![1, 2, 3, 4]);
        let mut dst = PortData::new(PortType::Integer, 0);
        dst.extend_from(&source, 1, 2).unwrap();
        assert_eq!(dst.values::<i32>().unwrap(), &[2, 3]);

        assert!(matches!(
            dst.extend_from(&source, 3, 2),
            Err(Error::IndexOutOfRange(_))
        ));
        let mut reals = PortData::new(PortType::Real, 0);
        assert!(matches!(
            reals.extend_from(&source, 0, 1),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
