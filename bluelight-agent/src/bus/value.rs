/*!
 * Typed D-Bus Values
 * Self-describing wire data decoded once into a recursive enum
 */

/// One decoded D-Bus argument.
///
/// Replies are walked exactly once by the transport and turned into this
/// tree; everything above the transport works with the accessors below
/// instead of inspecting type codes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Signature(String),
    Array(Vec<Value>),
    Struct(Vec<Value>),
    Entry(Box<Value>, Box<Value>),
    Variant(Box<Value>),
    /// Unix fds and anything else we never need to look inside
    Opaque,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn object_path(s: impl Into<String>) -> Self {
        Value::ObjectPath(s.into())
    }

    pub fn variant(inner: Value) -> Self {
        Value::Variant(Box::new(inner))
    }

    pub fn entry(key: Value, value: Value) -> Self {
        Value::Entry(Box::new(key), Box::new(value))
    }

    /// Strip any number of variant wrappers.
    pub fn peel(&self) -> &Value {
        let mut value = self;
        while let Value::Variant(inner) = value {
            value = inner;
        }
        value
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.peel() {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Object paths, also accepting plain strings.
    pub fn as_object_path(&self) -> Option<&str> {
        match self.peel() {
            Value::ObjectPath(s) | Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.peel() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self.peel() {
            Value::Int16(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self.peel() {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Key/value pairs of a dictionary (an array of dict entries).
    /// Non-entry items are skipped.
    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(|item| match item {
                Value::Entry(key, value) => Some((key.as_ref(), value.as_ref())),
                _ => None,
            })
    }

    /// Human readable type name, used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Int16(_) => "int16",
            Value::UInt16(_) => "uint16",
            Value::Int32(_) => "int32",
            Value::UInt32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::ObjectPath(_) => "object path",
            Value::Signature(_) => "signature",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Entry(..) => "dict entry",
            Value::Variant(_) => "variant",
            Value::Opaque => "opaque",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int16(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
