use std::fmt;

use uuid::Uuid;

/// Identifier of one conversation turn.
///
/// UUIDv7 carries a millisecond timestamp plus random bits, so ids minted in
/// the same millisecond stay distinct and sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_and_ordered() {
        let ids = (0..256).map(|_| TurnId::new_v7()).collect::<Vec<_>>();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn display_is_hyphenated_uuid() {
        let text = TurnId::new_v7().to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
    }
}
