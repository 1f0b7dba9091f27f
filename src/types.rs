//! Values exchanged between channels, conversions and callers.

/// A decoded channel sample or a physical value produced by a conversion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Unsigned integer (up to 64 bits)
    UnsignedInteger(u64),
    /// Signed integer (up to 64 bits)
    SignedInteger(i64),
    /// Floating point value (32 or 64 bit)
    Float(f64),
    /// Text, decoded from Latin-1, UTF-8 or UTF-16
    String(String),
    /// Raw bytes: byte arrays, MIME samples, CANopen date/time
    ByteArray(Vec<u8>),
}

impl Value {
    /// Returns true if this is an integer value (signed or unsigned).
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::UnsignedInteger(_) | Value::SignedInteger(_))
    }

    /// Returns true for integers and floats.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::UnsignedInteger(_) | Value::SignedInteger(_) | Value::Float(_)
        )
    }

    /// Returns true if this is a string value.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Attempts to convert to f64, useful for numeric operations.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UnsignedInteger(v) => Some(*v as f64),
            Value::SignedInteger(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            Value::ByteArray(_) => None,
        }
    }

    /// Integer view; floats are truncated toward zero.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UnsignedInteger(v) => Some(*v),
            Value::SignedInteger(v) => u64::try_from(*v).ok(),
            Value::Float(v) if *v >= 0.0 && v.is_finite() => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UnsignedInteger(v) => i64::try_from(*v).ok(),
            Value::SignedInteger(v) => Some(*v),
            Value::Float(v) if v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteArray(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::UnsignedInteger(v) => write!(f, "{v}"),
            Value::SignedInteger(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::ByteArray(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! value_from {
    ($variant:ident, $target:ty, $($src:ty),+) => {
        $(impl From<$src> for Value {
            fn from(v: $src) -> Self {
                Value::$variant(v as $target)
            }
        })+
    };
}

value_from!(UnsignedInteger, u64, u8, u16, u32, u64, usize);
value_from!(SignedInteger, i64, i8, i16, i32, i64);
value_from!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::UnsignedInteger(u64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::ByteArray(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::ByteArray(v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(Value::from(12u32).as_f64(), Some(12.0));
        assert_eq!(Value::from(-3i16).as_u64(), None);
        assert_eq!(Value::from(2.9f64).as_i64(), Some(2));
        assert_eq!(Value::from(" 1.5 ").as_f64(), Some(1.5));
        assert!(Value::from(true).is_integer());
    }

    #[test]
    fn byte_arrays_display_as_hex() {
        let v = Value::ByteArray(vec![0x01, 0xAB]);
        assert_eq!(v.to_string(), "01 AB");
    }
}
