//! Source-level type names, as written in a `cast(x as type)` expression or
//! a parameter declaration (`p::number`). Distinct from
//! `model::AtomicFieldType` because source text can also name the sentinel
//! `unsupported` type explicitly.

use crate::model::AtomicFieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    String,
    Number,
    Boolean,
    Date,
    Timestamp,
    Unsupported,
}

impl TypeName {
    pub fn to_atomic(self) -> AtomicFieldType {
        match self {
            TypeName::String => AtomicFieldType::String,
            TypeName::Number => AtomicFieldType::Number,
            TypeName::Boolean => AtomicFieldType::Boolean,
            TypeName::Date => AtomicFieldType::Date,
            TypeName::Timestamp => AtomicFieldType::Timestamp,
            TypeName::Unsupported => AtomicFieldType::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_name_maps_to_atomic() {
        assert_eq!(TypeName::Number.to_atomic(), AtomicFieldType::Number);
        assert_eq!(TypeName::Unsupported.to_atomic(), AtomicFieldType::Unsupported);
    }
}
