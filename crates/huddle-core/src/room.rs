//! Room identifiers.
//!
//! A room is not stored on its own: it is the set of clients that share a
//! room id, and it exists only while that set is non-empty.

/// Maximum room id length.
pub const MAX_ROOM_ID_LENGTH: usize = 256;

/// A room identifier. Empty means "no room".
pub type RoomId = String;

/// Validate a room id supplied by a client.
///
/// Any non-empty text up to [`MAX_ROOM_ID_LENGTH`] bytes without control
/// characters is accepted.
///
/// # Errors
///
/// Returns an error message if the room id is invalid.
pub fn validate_room_id(room: &str) -> Result<(), &'static str> {
    if room.is_empty() {
        return Err("Room id cannot be empty");
    }
    if room.len() > MAX_ROOM_ID_LENGTH {
        return Err("Room id too long");
    }
    if room.chars().any(char::is_control) {
        return Err("Room id contains control characters");
    }
    Ok(())
}

/// Canonical room id for a one-to-one conversation between two users.
///
/// Both participants derive the same id regardless of argument order.
#[must_use]
pub fn direct_room(a: &str, b: &str) -> RoomId {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_validation() {
        assert!(validate_room_id("lobby").is_ok());
        assert!(validate_room_id("team:ops").is_ok());
        assert!(validate_room_id("공지사항").is_ok());
        assert!(validate_room_id("$ops").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("tab\there").is_err());
        assert!(validate_room_id("bell\u{7}").is_err());
        assert!(validate_room_id("next\u{85}line").is_err());

        let long = "r".repeat(MAX_ROOM_ID_LENGTH + 1);
        assert!(validate_room_id(&long).is_err());
    }

    #[test]
    fn test_direct_room_is_symmetric() {
        assert_eq!(direct_room("bob", "alice"), "alice:bob");
        assert_eq!(direct_room("alice", "bob"), "alice:bob");
        assert!(validate_room_id(&direct_room("u1", "u2")).is_ok());

        let room = direct_room("지훈", "민수");
        assert_eq!(room, direct_room("민수", "지훈"));
        assert!(validate_room_id(&room).is_ok());
    }
}
