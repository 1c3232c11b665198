//! The unit that flows through the machine.

use std::fmt;
use std::sync::Arc;

/// An immutable item carrying a destination tag.
///
/// Cloning is cheap: the tag is shared.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Item {
    id: u64,
    tag: Arc<str>,
}

impl Item {
    pub fn new(id: u64, tag: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            tag: tag.into(),
        }
    }

    /// Diagnostic identifier, unique within one machine.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Destination tag used to look up the target sink.
    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item(#{} {:?})", self.id, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_accessors() {
        let item = Item::new(4, "0-3");
        assert_eq!(item.id(), 4);
        assert_eq!(item.tag(), "0-3");
        assert_eq!(format!("{:?}", item), "Item(#4 \"0-3\")");
    }

    #[test]
    fn test_clone_shares_tag() {
        let item = Item::new(1, "4-6");
        let copy = item.clone();
        assert_eq!(item, copy);
        assert!(std::ptr::eq(item.tag(), copy.tag()));
    }
}
