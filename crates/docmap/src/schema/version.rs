//! Version counter arithmetic.

use bson::Bson;

use crate::error::PatchError;

/// Declared integer width of a version field.
///
/// `Int` is the platform-width integer (`isize`). It is stored as a 64-bit
/// value, like `I64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionWidth {
    /// `i32`
    I32,
    /// `isize`
    Int,
    /// `i64`
    I64,
}

impl VersionWidth {
    /// The version a freshly inserted record carries.
    pub fn initial(self) -> Bson {
        match self {
            VersionWidth::I32 => Bson::Int32(1),
            VersionWidth::Int | VersionWidth::I64 => Bson::Int64(1),
        }
    }

    /// The successor of `current`, in the declared width.
    ///
    /// A missing (`Null`) version counts as zero, so a record that was
    /// written before it had a version moves to 1.
    pub fn next(self, field: &str, current: &Bson) -> Result<Bson, PatchError> {
        let value = match current {
            Bson::Null => 0,
            other => read_version(field, other)?,
        };
        Ok(match self {
            VersionWidth::I32 => Bson::Int32((value as i32).wrapping_add(1)),
            VersionWidth::Int | VersionWidth::I64 => Bson::Int64(value.wrapping_add(1)),
        })
    }
}

/// Reads an integer version out of a loosely typed value.
pub fn read_version(field: &str, value: &Bson) -> Result<i64, PatchError> {
    match value {
        Bson::Int32(v) => Ok(i64::from(*v)),
        Bson::Int64(v) => Ok(*v),
        other => Err(PatchError::UnsupportedVersionType {
            field: field.to_string(),
            found: format!("{:?}", other.element_type()),
        }),
    }
}

/// Increments a dynamically typed version, keeping its BSON kind.
pub fn next_dynamic(field: &str, current: &Bson) -> Result<Bson, PatchError> {
    match current {
        Bson::Int32(v) => Ok(Bson::Int32(v.wrapping_add(1))),
        other => read_version(field, other).map(|v| Bson::Int64(v.wrapping_add(1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_version_per_width() {
        assert_eq!(VersionWidth::I32.initial(), Bson::Int32(1));
        assert_eq!(VersionWidth::Int.initial(), Bson::Int64(1));
        assert_eq!(VersionWidth::I64.initial(), Bson::Int64(1));
    }

    #[test]
    fn test_next_preserves_width() {
        assert_eq!(
            VersionWidth::I32.next("v", &Bson::Int32(4)).unwrap(),
            Bson::Int32(5)
        );
        // Stores may widen an i32 counter; the declared width wins.
        assert_eq!(
            VersionWidth::I32.next("v", &Bson::Int64(4)).unwrap(),
            Bson::Int32(5)
        );
        assert_eq!(
            VersionWidth::I64.next("v", &Bson::Int32(9)).unwrap(),
            Bson::Int64(10)
        );
        assert_eq!(VersionWidth::Int.next("v", &Bson::Null).unwrap(), Bson::Int64(1));
    }

    #[test]
    fn test_unsupported_version_type() {
        let err = VersionWidth::I64
            .next("version", &Bson::String("3".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            PatchError::UnsupportedVersionType { ref field, .. } if field == "version"
        ));

        assert!(next_dynamic("version", &Bson::Double(1.0)).is_err());
        assert_eq!(next_dynamic("version", &Bson::Int32(1)).unwrap(), Bson::Int32(2));
    }
}
