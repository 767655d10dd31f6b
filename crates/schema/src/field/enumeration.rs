//! Integer-backed enumerations.

use std::fmt;

/// A named set of members, each backed by a distinct `i64`.
///
/// Members are stored by their integer value, so renaming a member keeps
/// existing records readable while changing its value does not.
///
/// ```
/// use quill_schema::EnumType;
///
/// let color = EnumType::new("Color", [("red", 1), ("green", 2), ("blue", -3)])?;
/// assert_eq!(color.value_of("blue"), Some(-3));
/// assert_eq!(color.member_of(2), Some("green"));
/// # Ok::<(), quill_schema::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    members: Vec<(String, i64)>,
}

impl EnumType {
    /// Creates an enumeration from `(member, value)` pairs in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`](crate::Error::Schema) if there are no
    /// members, or if a member name or value is repeated.
    pub fn new<I, S>(name: impl Into<String>, members: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let name = name.into();
        let members: Vec<(String, i64)> = members.into_iter().map(|(m, v)| (m.into(), v)).collect();
        let invalid = |reason: String| crate::Error::Schema { schema: name.clone(), reason };

        if members.is_empty() {
            return Err(invalid("enumeration has no members".to_string()));
        }
        for (i, (member, value)) in members.iter().enumerate() {
            for (other, other_value) in &members[..i] {
                if other == member {
                    return Err(invalid(format!("member '{member}' declared twice")));
                }
                if other_value == value {
                    return Err(invalid(format!("members '{other}' and '{member}' share value {value}")));
                }
            }
        }

        Ok(Self { name, members })
    }

    /// Enumeration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in declaration order.
    pub fn members(&self) -> impl Iterator<Item = (&str, i64)> {
        self.members.iter().map(|(m, v)| (m.as_str(), *v))
    }

    /// First declared member, used as the default.
    pub fn first(&self) -> &str {
        // Construction guarantees at least one member
        self.members.first().map(|(m, _)| m.as_str()).unwrap_or_default()
    }

    /// Integer value of a member.
    pub fn value_of(&self, member: &str) -> Option<i64> {
        self.members.iter().find(|(m, _)| m == member).map(|(_, v)| *v)
    }

    /// Member backed by an integer value.
    pub fn member_of(&self, value: i64) -> Option<&str> {
        self.members.iter().find(|(_, v)| *v == value).map(|(m, _)| m.as_str())
    }
}

impl fmt::Display for EnumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enum({})", self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(EnumType::new("E", Vec::<(&str, i64)>::new()).is_err());
        assert!(EnumType::new("E", [("a", 1), ("a", 2)]).is_err());
        assert!(EnumType::new("E", [("a", 1), ("b", 1)]).is_err());
    }

    #[test]
    fn test_lookup_both_ways() {
        let e = EnumType::new("Level", [("low", -10), ("high", 10)]).unwrap();
        assert_eq!(e.first(), "low");
        assert_eq!(e.value_of("high"), Some(10));
        assert_eq!(e.member_of(-10), Some("low"));
        assert_eq!(e.member_of(0), None);
        assert_eq!(e.to_string(), "enum(Level)");
    }
}
